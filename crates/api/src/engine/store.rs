//! Persistence seam for the dispatcher.
//!
//! [`DispatchStore`] names exactly the reads and writes a dispatch performs so
//! the dispatcher can run against PostgreSQL ([`PgDispatchStore`]) or an
//! in-memory fake in tests.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use oneclick_core::audience::{parse_audience, parse_personalization, Personalization};
use oneclick_core::campaign::{CampaignStatus, REASON_MISSING_CREDENTIALS};
use oneclick_core::crypto::CredentialCipher;
use oneclick_core::phone::PhoneNumber;
use oneclick_core::pricing::PricingDefaults;
use oneclick_core::template::is_approved;
use oneclick_core::types::{DbId, Money};
use oneclick_db::models::message::CreateOutgoingMessage;
use oneclick_db::models::wallet::DebitOutcome;
use oneclick_db::repositories::{
    CampaignRepo, CredentialsRepo, MessageRepo, PricingRepo, TemplateRepo, WalletRepo,
};
use oneclick_db::DbPool;
use oneclick_whatsapp::SenderCredentials;

/// Everything needed to send one campaign, resolved once before the first recipient.
#[derive(Debug, Clone)]
pub struct DispatchPlan {
    pub campaign_id: DbId,
    pub client_id: DbId,
    pub template_name: String,
    pub language: String,
    /// Personalization keys feeding `{{1}}..{{n}}`.
    pub variables: Vec<String>,
    pub body_text: String,
    /// Audience in submission order.
    pub recipients: Vec<PhoneNumber>,
    pub personalization: Personalization,
    pub price: Money,
    pub credentials: SenderCredentials,
    /// Recorded as `from_phone` on outgoing messages.
    pub from_phone: String,
}

#[derive(Debug, Clone)]
pub enum Preparation {
    Ready(Box<DispatchPlan>),
    /// The campaign left SENDING before the dispatch started (e.g. cancelled).
    NotSending(Option<CampaignStatus>),
    /// The campaign cannot be sent at all; it is failed with this reason.
    Abort(String),
}

/// Outcome of a debit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Funding {
    Debited,
    Insufficient { balance: Money },
}

/// A message left in `queued` by an earlier, interrupted dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub id: DbId,
    pub client_id: DbId,
    /// Set when the message was debited.
    pub cost: Option<Money>,
}

#[async_trait]
pub trait DispatchStore: Send + Sync {
    async fn prepare(&self, campaign_id: DbId) -> Result<Preparation, sqlx::Error>;

    /// Canonical numbers that already have a message in this campaign.
    async fn existing_recipients(&self, campaign_id: DbId) -> Result<HashSet<String>, sqlx::Error>;

    async fn queued_messages(&self, campaign_id: DbId) -> Result<Vec<QueuedMessage>, sqlx::Error>;

    /// Insert a queued message; `None` if the recipient already has one.
    async fn queue_message(
        &self,
        plan: &DispatchPlan,
        to: &PhoneNumber,
        content: &str,
    ) -> Result<Option<DbId>, sqlx::Error>;

    async fn debit(
        &self,
        client_id: DbId,
        message_id: DbId,
        amount: Money,
    ) -> Result<Funding, sqlx::Error>;

    async fn mark_sent(
        &self,
        message_id: DbId,
        external_id: &str,
        attempts: u32,
    ) -> Result<(), sqlx::Error>;

    async fn mark_failed(
        &self,
        message_id: DbId,
        reason: &str,
        attempts: u32,
    ) -> Result<(), sqlx::Error>;

    async fn refund(&self, client_id: DbId, message_id: DbId, amount: Money)
        -> Result<(), sqlx::Error>;

    /// SENDING -> COMPLETED. Returns `false` if the campaign was no longer SENDING.
    async fn complete(&self, campaign_id: DbId) -> Result<bool, sqlx::Error>;

    async fn fail_campaign(&self, campaign_id: DbId, reason: &str) -> Result<(), sqlx::Error>;
}

// ---------------------------------------------------------------------------
// PostgreSQL implementation
// ---------------------------------------------------------------------------

pub struct PgDispatchStore {
    pool: DbPool,
    cipher: Arc<CredentialCipher>,
    pricing: PricingDefaults,
}

impl PgDispatchStore {
    pub fn new(pool: DbPool, cipher: Arc<CredentialCipher>, pricing: PricingDefaults) -> Self {
        Self {
            pool,
            cipher,
            pricing,
        }
    }
}

fn attempts_i32(attempts: u32) -> i32 {
    i32::try_from(attempts).unwrap_or(i32::MAX)
}

#[async_trait]
impl DispatchStore for PgDispatchStore {
    async fn prepare(&self, campaign_id: DbId) -> Result<Preparation, sqlx::Error> {
        let Some(campaign) = CampaignRepo::find_by_id(&self.pool, campaign_id).await? else {
            return Ok(Preparation::NotSending(None));
        };
        if campaign.status() != Some(CampaignStatus::Sending) {
            return Ok(Preparation::NotSending(campaign.status()));
        }

        let Some(template) = TemplateRepo::find_by_id(&self.pool, campaign.template_id).await?
        else {
            return Ok(Preparation::Abort("template not found".into()));
        };
        if !is_approved(&template.status) {
            return Ok(Preparation::Abort(format!(
                "template '{}' is not approved (status {})",
                template.name, template.status
            )));
        }

        let Some(creds) = CredentialsRepo::find_for_client(&self.pool, campaign.client_id).await?
        else {
            return Ok(Preparation::Abort(REASON_MISSING_CREDENTIALS.into()));
        };
        let access_token = match self.cipher.decrypt(&creds.access_token_encrypted) {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(campaign_id, error = %e, "Stored access token is unreadable");
                return Ok(Preparation::Abort(
                    "messaging credentials could not be decrypted".into(),
                ));
            }
        };

        let recipients = match parse_audience(&campaign.audience) {
            Ok(r) if r.is_empty() => {
                return Ok(Preparation::Abort("campaign audience is empty".into()))
            }
            Ok(r) => r,
            Err(e) => return Ok(Preparation::Abort(e.to_string())),
        };
        let personalization = match parse_personalization(&campaign.personalization) {
            Ok(p) => p,
            Err(e) => return Ok(Preparation::Abort(e.to_string())),
        };

        let price = PricingRepo::resolve(&self.pool, campaign.client_id, &self.pricing).await?;

        Ok(Preparation::Ready(Box::new(DispatchPlan {
            campaign_id,
            client_id: campaign.client_id,
            template_name: template.name.clone(),
            language: template.language.clone(),
            variables: template.variables.0.clone(),
            body_text: template.structure.0.body.clone(),
            recipients,
            personalization,
            price: price.price_per_message,
            from_phone: creds
                .display_phone_number
                .clone()
                .unwrap_or_else(|| creds.phone_number_id.clone()),
            credentials: SenderCredentials {
                access_token,
                phone_number_id: creds.phone_number_id,
            },
        })))
    }

    async fn existing_recipients(&self, campaign_id: DbId) -> Result<HashSet<String>, sqlx::Error> {
        let phones = MessageRepo::recipients_with_messages(&self.pool, campaign_id).await?;
        Ok(phones.into_iter().collect())
    }

    async fn queued_messages(&self, campaign_id: DbId) -> Result<Vec<QueuedMessage>, sqlx::Error> {
        let rows = MessageRepo::list_queued_for_campaign(&self.pool, campaign_id).await?;
        Ok(rows
            .into_iter()
            .map(|m| QueuedMessage {
                id: m.id,
                client_id: m.client_id,
                cost: m.cost,
            })
            .collect())
    }

    async fn queue_message(
        &self,
        plan: &DispatchPlan,
        to: &PhoneNumber,
        content: &str,
    ) -> Result<Option<DbId>, sqlx::Error> {
        let input = CreateOutgoingMessage {
            client_id: plan.client_id,
            campaign_id: Some(plan.campaign_id),
            from_phone: plan.from_phone.clone(),
            to_phone: to.as_str().to_string(),
            content: content.to_string(),
        };
        let created = MessageRepo::create_outgoing(&self.pool, &input).await?;
        Ok(created.map(|m| m.id))
    }

    async fn debit(
        &self,
        client_id: DbId,
        message_id: DbId,
        amount: Money,
    ) -> Result<Funding, sqlx::Error> {
        let outcome = WalletRepo::debit(
            &self.pool,
            client_id,
            amount,
            Some(message_id),
            Some("Campaign message"),
        )
        .await?;
        Ok(match outcome {
            DebitOutcome::Applied(_) => Funding::Debited,
            DebitOutcome::InsufficientFunds { balance } => Funding::Insufficient { balance },
        })
    }

    async fn mark_sent(
        &self,
        message_id: DbId,
        external_id: &str,
        attempts: u32,
    ) -> Result<(), sqlx::Error> {
        MessageRepo::mark_sent(&self.pool, message_id, external_id, attempts_i32(attempts)).await?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        message_id: DbId,
        reason: &str,
        attempts: u32,
    ) -> Result<(), sqlx::Error> {
        MessageRepo::mark_failed(&self.pool, message_id, reason, attempts_i32(attempts)).await?;
        Ok(())
    }

    async fn refund(
        &self,
        client_id: DbId,
        message_id: DbId,
        amount: Money,
    ) -> Result<(), sqlx::Error> {
        WalletRepo::refund(
            &self.pool,
            client_id,
            message_id,
            amount,
            Some("Refund for undelivered message"),
        )
        .await?;
        Ok(())
    }

    async fn complete(&self, campaign_id: DbId) -> Result<bool, sqlx::Error> {
        let updated =
            CampaignRepo::transition(&self.pool, campaign_id, CampaignStatus::Completed).await?;
        Ok(updated.is_some())
    }

    async fn fail_campaign(&self, campaign_id: DbId, reason: &str) -> Result<(), sqlx::Error> {
        CampaignRepo::mark_failed(&self.pool, campaign_id, reason).await?;
        Ok(())
    }
}
