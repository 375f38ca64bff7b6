//! Campaign lifecycle state machine and input validation.
//!
//! ```text
//! DRAFT ──► SCHEDULED ──► PENDING_SEND ──► SENDING ──► COMPLETED
//!   │  ◄──────┘  │              │             ├──► FAILED
//!   └────────────┴──────────────┴─────────────┴──► CANCELLED
//! ```
//!
//! DRAFT and SCHEDULED may also jump straight to SENDING when the scheduler
//! claims them. COMPLETED, FAILED and CANCELLED are terminal.

use crate::define_status_enum;
use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum length of a campaign name in characters.
pub const MAX_CAMPAIGN_NAME_LENGTH: usize = 200;

/// Failure reason recorded when no messaging credentials are configured.
pub const REASON_MISSING_CREDENTIALS: &str = "messaging credentials are not configured";

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

define_status_enum! {
    /// Campaign lifecycle status, seeded into `campaign_statuses`.
    CampaignStatus {
        Draft = 1 => "DRAFT",
        Scheduled = 2 => "SCHEDULED",
        PendingSend = 3 => "PENDING_SEND",
        Sending = 4 => "SENDING",
        Completed = 5 => "COMPLETED",
        Failed = 6 => "FAILED",
        Cancelled = 7 => "CANCELLED",
    }
}

impl CampaignStatus {
    /// Statuses this status may move to.
    pub fn allowed_transitions(self) -> &'static [CampaignStatus] {
        use CampaignStatus::*;
        match self {
            Draft => &[Scheduled, PendingSend, Sending, Cancelled],
            Scheduled => &[Draft, PendingSend, Sending, Cancelled],
            PendingSend => &[Sending, Cancelled],
            Sending => &[Completed, Failed, Cancelled],
            Completed | Failed | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, to: CampaignStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CampaignStatus::Completed | CampaignStatus::Failed | CampaignStatus::Cancelled
        )
    }

    /// Content (name, template, audience, schedule) may only change before dispatch is requested.
    pub fn is_editable(self) -> bool {
        matches!(self, CampaignStatus::Draft | CampaignStatus::Scheduled)
    }

    /// Deletion is blocked while a dispatch is queued or running.
    pub fn is_deletable(self) -> bool {
        !matches!(self, CampaignStatus::Sending | CampaignStatus::PendingSend)
    }

    pub fn is_sendable(self) -> bool {
        matches!(
            self,
            CampaignStatus::Draft | CampaignStatus::Scheduled | CampaignStatus::PendingSend
        )
    }

    pub fn is_cancellable(self) -> bool {
        self.can_transition_to(CampaignStatus::Cancelled)
    }

    /// Every status from which `to` is reachable in one step.
    pub fn sources_of(to: CampaignStatus) -> Vec<CampaignStatus> {
        CampaignStatus::ALL
            .iter()
            .copied()
            .filter(|from| from.can_transition_to(to))
            .collect()
    }
}

/// Fail with a validation error unless `from -> to` is a legal transition.
pub fn validate_transition(from: CampaignStatus, to: CampaignStatus) -> Result<(), CoreError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Cannot transition campaign from {from} to {to}"
        )))
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a campaign name: non-blank and within the length limit.
pub fn validate_campaign_name(name: &str) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::Validation(
            "campaign_name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_CAMPAIGN_NAME_LENGTH {
        return Err(CoreError::Validation(format!(
            "campaign_name exceeds maximum length of {MAX_CAMPAIGN_NAME_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Status a new campaign starts in.
pub fn initial_status(scheduled_at: Option<Timestamp>, now: Timestamp) -> CampaignStatus {
    match scheduled_at {
        Some(at) if at > now => CampaignStatus::Scheduled,
        _ => CampaignStatus::Draft,
    }
}

/// Status an editable campaign ends up in after an update.
///
/// `requested` is an explicit status from the payload and must be a legal
/// transition. Otherwise, when the schedule was touched, the status is
/// re-derived from the effective `scheduled_at` (future means SCHEDULED).
pub fn status_after_update(
    current: CampaignStatus,
    requested: Option<CampaignStatus>,
    effective_scheduled_at: Option<Timestamp>,
    schedule_touched: bool,
    now: Timestamp,
) -> Result<CampaignStatus, CoreError> {
    if !current.is_editable() {
        return Err(CoreError::Validation(format!(
            "Campaign in status {current} cannot be updated"
        )));
    }

    match requested {
        Some(target) if target != current => {
            match target {
                CampaignStatus::PendingSend | CampaignStatus::Sending => {
                    return Err(CoreError::Validation(
                        "Use the send operation to dispatch a campaign".to_string(),
                    ));
                }
                CampaignStatus::Scheduled
                    if !effective_scheduled_at.is_some_and(|at| at > now) =>
                {
                    return Err(CoreError::Validation(
                        "A SCHEDULED campaign needs a scheduled_at in the future".to_string(),
                    ));
                }
                _ => {}
            }
            validate_transition(current, target)?;
            Ok(target)
        }
        _ if schedule_touched => Ok(initial_status(effective_scheduled_at, now)),
        _ => Ok(current),
    }
}

/// Check that a campaign may be queued for dispatch.
pub fn validate_sendable(status: CampaignStatus, audience_len: usize) -> Result<(), CoreError> {
    if !status.is_sendable() {
        return Err(CoreError::Validation(format!(
            "Campaign in status {status} cannot be sent"
        )));
    }
    if audience_len == 0 {
        return Err(CoreError::Validation(
            "Campaign audience is empty".to_string(),
        ));
    }
    Ok(())
}

/// Check that a campaign may be deleted.
pub fn validate_deletable(status: CampaignStatus) -> Result<(), CoreError> {
    if status.is_deletable() {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Campaign in status {status} cannot be deleted; cancel it first"
        )))
    }
}

/// A dispatch is complete once every recipient has a resolved message.
pub fn is_dispatch_complete(total_recipients: i32, resolved: i32) -> bool {
    resolved >= total_recipients
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};

    #[test]
    fn terminal_states_have_no_exits() {
        for s in [
            CampaignStatus::Completed,
            CampaignStatus::Failed,
            CampaignStatus::Cancelled,
        ] {
            assert!(s.is_terminal());
            assert!(s.allowed_transitions().is_empty());
        }
    }

    #[test]
    fn sending_only_finishes_or_cancels() {
        let s = CampaignStatus::Sending;
        assert!(s.can_transition_to(CampaignStatus::Completed));
        assert!(s.can_transition_to(CampaignStatus::Failed));
        assert!(s.can_transition_to(CampaignStatus::Cancelled));
        assert!(!s.can_transition_to(CampaignStatus::Draft));
        assert!(!s.can_transition_to(CampaignStatus::Scheduled));
    }

    #[test]
    fn validate_transition_rejects_backward_moves() {
        assert_matches!(
            validate_transition(CampaignStatus::Completed, CampaignStatus::Sending),
            Err(CoreError::Validation(_))
        );
        assert!(validate_transition(CampaignStatus::Draft, CampaignStatus::PendingSend).is_ok());
    }

    #[test]
    fn sources_of_sending() {
        let sources = CampaignStatus::sources_of(CampaignStatus::Sending);
        assert_eq!(
            sources,
            vec![
                CampaignStatus::Draft,
                CampaignStatus::Scheduled,
                CampaignStatus::PendingSend
            ]
        );
    }

    #[test]
    fn delete_blocked_while_sending() {
        assert_matches!(
            validate_deletable(CampaignStatus::Sending),
            Err(CoreError::Validation(_))
        );
        assert!(validate_deletable(CampaignStatus::PendingSend).is_err());
        assert!(validate_deletable(CampaignStatus::Draft).is_ok());
        assert!(validate_deletable(CampaignStatus::Completed).is_ok());
        assert!(validate_deletable(CampaignStatus::Cancelled).is_ok());
    }

    #[test]
    fn initial_status_depends_on_schedule() {
        let now = Utc::now();
        assert_eq!(initial_status(None, now), CampaignStatus::Draft);
        assert_eq!(
            initial_status(Some(now + Duration::hours(1)), now),
            CampaignStatus::Scheduled
        );
        assert_eq!(
            initial_status(Some(now - Duration::hours(1)), now),
            CampaignStatus::Draft
        );
    }

    #[test]
    fn update_derives_status_from_schedule() {
        let now = Utc::now();
        let later = now + Duration::hours(2);
        assert_eq!(
            status_after_update(CampaignStatus::Draft, None, Some(later), true, now).unwrap(),
            CampaignStatus::Scheduled
        );
        assert_eq!(
            status_after_update(CampaignStatus::Scheduled, None, None, true, now).unwrap(),
            CampaignStatus::Draft
        );
        assert_eq!(
            status_after_update(CampaignStatus::Scheduled, None, Some(later), false, now).unwrap(),
            CampaignStatus::Scheduled
        );
    }

    #[test]
    fn update_honors_only_legal_requested_status() {
        let now = Utc::now();
        assert_eq!(
            status_after_update(
                CampaignStatus::Scheduled,
                Some(CampaignStatus::Draft),
                None,
                false,
                now
            )
            .unwrap(),
            CampaignStatus::Draft
        );
        assert_eq!(
            status_after_update(
                CampaignStatus::Draft,
                Some(CampaignStatus::Cancelled),
                None,
                false,
                now
            )
            .unwrap(),
            CampaignStatus::Cancelled
        );
        assert!(status_after_update(
            CampaignStatus::Draft,
            Some(CampaignStatus::Completed),
            None,
            false,
            now
        )
        .is_err());
        assert!(status_after_update(
            CampaignStatus::Draft,
            Some(CampaignStatus::Sending),
            None,
            false,
            now
        )
        .is_err());
        assert!(status_after_update(
            CampaignStatus::Draft,
            Some(CampaignStatus::Scheduled),
            None,
            false,
            now
        )
        .is_err());
    }

    #[test]
    fn update_rejected_outside_editable_states() {
        let now = Utc::now();
        for s in [
            CampaignStatus::PendingSend,
            CampaignStatus::Sending,
            CampaignStatus::Completed,
        ] {
            assert_matches!(
                status_after_update(s, None, None, false, now),
                Err(CoreError::Validation(_))
            );
        }
    }

    #[test]
    fn send_requires_audience_and_sendable_status() {
        assert!(validate_sendable(CampaignStatus::Draft, 2).is_ok());
        assert!(validate_sendable(CampaignStatus::Draft, 0).is_err());
        assert!(validate_sendable(CampaignStatus::Sending, 2).is_err());
        assert!(validate_sendable(CampaignStatus::Completed, 2).is_err());
    }

    #[test]
    fn campaign_name_rules() {
        assert!(validate_campaign_name("Spring promo").is_ok());
        assert!(validate_campaign_name("   ").is_err());
        assert!(validate_campaign_name(&"x".repeat(MAX_CAMPAIGN_NAME_LENGTH + 1)).is_err());
    }

    #[test]
    fn completion_check() {
        assert!(is_dispatch_complete(2, 2));
        assert!(!is_dispatch_complete(2, 1));
        assert!(is_dispatch_complete(0, 0));
    }
}
