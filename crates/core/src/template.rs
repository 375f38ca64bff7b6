//! Message template structure, validation, and rendering.
//!
//! Templates carry positional `{{1}}..{{n}}` placeholders in their body. The
//! template's `variables` list names the personalization key feeding each
//! position, so `variables[0]` fills `{{1}}`.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::audience::VariableMap;
use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const MAX_TEMPLATE_NAME_LENGTH: usize = 512;

/// Cloud API limit for a template body.
pub const MAX_BODY_LENGTH: usize = 1024;

pub const MAX_BUTTONS: usize = 10;

/// Accepted template categories (upper-case, as the Cloud API spells them).
pub const VALID_CATEGORIES: &[&str] = &["MARKETING", "UTILITY", "AUTHENTICATION"];

/// Approval statuses that allow a template to be used by a campaign.
pub const APPROVED_STATUSES: &[&str] = &["APPROVED", "APPROVED_BY_META"];

/// Status assigned to newly created templates.
pub const DEFAULT_TEMPLATE_STATUS: &str = "PENDING";

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*(\d+)\s*\}\}").expect("valid regex"));

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateButton {
    #[serde(rename = "type")]
    pub button_type: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Header/body/footer/buttons layout of a template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateStructure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    #[serde(default)]
    pub buttons: Vec<TemplateButton>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Whether an opaque approval status counts as approved.
pub fn is_approved(status: &str) -> bool {
    APPROVED_STATUSES
        .iter()
        .any(|s| s.eq_ignore_ascii_case(status.trim()))
}

/// Fail unless the template is approved for use in a new campaign.
pub fn ensure_approved(name: &str, status: &str) -> Result<(), CoreError> {
    if is_approved(status) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Template '{name}' is not approved (status {status})"
        )))
    }
}

/// Distinct placeholder positions referenced in `text`.
pub fn placeholder_indices(text: &str) -> BTreeSet<usize> {
    PLACEHOLDER_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .collect()
}

pub fn validate_template_name(name: &str) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::Validation(
            "Template name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_TEMPLATE_NAME_LENGTH {
        return Err(CoreError::Validation(format!(
            "Template name exceeds maximum length of {MAX_TEMPLATE_NAME_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Normalize a category to upper case, rejecting unknown ones.
pub fn normalize_category(category: &str) -> Result<String, CoreError> {
    let upper = category.trim().to_ascii_uppercase();
    if VALID_CATEGORIES.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(CoreError::Validation(format!(
            "Invalid template category '{category}'. Must be one of: {}",
            VALID_CATEGORIES.join(", ")
        )))
    }
}

pub fn validate_language(language: &str) -> Result<(), CoreError> {
    let ok = !language.is_empty()
        && language.len() <= 15
        && language
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid template language code '{language}'"
        )))
    }
}

/// Validate a structure against its ordered variable list.
///
/// Every `{{n}}` in the body must satisfy `1 <= n <= variables.len()`.
pub fn validate_structure(
    structure: &TemplateStructure,
    variables: &[String],
) -> Result<(), CoreError> {
    if structure.body.trim().is_empty() {
        return Err(CoreError::Validation(
            "Template body must not be empty".to_string(),
        ));
    }
    if structure.body.chars().count() > MAX_BODY_LENGTH {
        return Err(CoreError::Validation(format!(
            "Template body exceeds maximum length of {MAX_BODY_LENGTH} characters"
        )));
    }
    if structure.buttons.len() > MAX_BUTTONS {
        return Err(CoreError::Validation(format!(
            "Template has more than {MAX_BUTTONS} buttons"
        )));
    }

    let mut seen = HashSet::new();
    for v in variables {
        if v.trim().is_empty() {
            return Err(CoreError::Validation(
                "Template variable names must not be empty".to_string(),
            ));
        }
        if !seen.insert(v.as_str()) {
            return Err(CoreError::Validation(format!(
                "Duplicate template variable '{v}'"
            )));
        }
    }

    for idx in placeholder_indices(&structure.body) {
        if idx == 0 || idx > variables.len() {
            return Err(CoreError::Validation(format!(
                "Template body references {{{{{idx}}}}} but only {} variable(s) are declared",
                variables.len()
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Positional body parameters for one recipient. Missing values become "".
pub fn body_parameters(variables: &[String], vars: Option<&VariableMap>) -> Vec<String> {
    variables
        .iter()
        .map(|name| {
            vars.and_then(|m| m.get(name))
                .cloned()
                .unwrap_or_default()
        })
        .collect()
}

/// Substitute `{{n}}` placeholders with `params[n - 1]`; unknown positions become "".
pub fn render(text: &str, params: &[String]) -> String {
    PLACEHOLDER_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| params.get(i))
                .cloned()
                .unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structure(body: &str) -> TemplateStructure {
        TemplateStructure {
            body: body.to_string(),
            ..Default::default()
        }
    }

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn approval_statuses() {
        assert!(is_approved("APPROVED"));
        assert!(is_approved("approved_by_meta"));
        assert!(!is_approved("PENDING"));
        assert!(!is_approved("REJECTED"));
        assert!(ensure_approved("t", "PENDING").is_err());
    }

    #[test]
    fn extracts_placeholders() {
        let idx = placeholder_indices("Hi {{1}}, your code is {{ 2 }}. Bye {{1}}");
        assert_eq!(idx.into_iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn structure_placeholders_must_be_declared() {
        let s = structure("Hi {{1}}, order {{2}}");
        assert!(validate_structure(&s, &vars(&["name", "order"])).is_ok());
        assert!(validate_structure(&s, &vars(&["name"])).is_err());
        assert!(validate_structure(&structure("Hi {{0}}"), &vars(&["a"])).is_err());
    }

    #[test]
    fn structure_rejects_empty_body_and_duplicate_vars() {
        assert!(validate_structure(&structure("  "), &[]).is_err());
        assert!(validate_structure(&structure("x"), &vars(&["a", "a"])).is_err());
        assert!(validate_structure(&structure("x"), &vars(&[""])).is_err());
    }

    #[test]
    fn category_normalization() {
        assert_eq!(normalize_category("marketing").unwrap(), "MARKETING");
        assert!(normalize_category("spam").is_err());
    }

    #[test]
    fn language_codes() {
        assert!(validate_language("en_US").is_ok());
        assert!(validate_language("pt-BR").is_ok());
        assert!(validate_language("").is_err());
        assert!(validate_language("en US").is_err());
    }

    #[test]
    fn missing_variables_become_empty() {
        let mut m = VariableMap::new();
        m.insert("name".into(), "Ada".into());
        let params = body_parameters(&vars(&["name", "order"]), Some(&m));
        assert_eq!(params, vec!["Ada".to_string(), String::new()]);

        let none = body_parameters(&vars(&["name"]), None);
        assert_eq!(none, vec![String::new()]);
    }

    #[test]
    fn render_substitutes_positions() {
        let out = render(
            "Hi {{1}}, order {{2}} ships {{3}}",
            &["Ada".into(), "#42".into()],
        );
        assert_eq!(out, "Hi Ada, order #42 ships ");
    }

    #[test]
    fn structure_serde_shape() {
        let json = serde_json::json!({
            "body": "Hello {{1}}",
            "buttons": [{"type": "URL", "text": "Open", "url": "https://x.test"}]
        });
        let s: TemplateStructure = serde_json::from_value(json).unwrap();
        assert_eq!(s.buttons[0].button_type, "URL");
        assert!(s.header.is_none());
    }
}
