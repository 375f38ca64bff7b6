//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` (or a transaction) as the first argument.

pub mod campaign_repo;
pub mod credentials_repo;
pub mod message_repo;
pub mod pricing_repo;
pub mod report_repo;
pub mod template_repo;
pub mod wallet_repo;

pub use campaign_repo::CampaignRepo;
pub use credentials_repo::CredentialsRepo;
pub use message_repo::MessageRepo;
pub use pricing_repo::PricingRepo;
pub use report_repo::ReportRepo;
pub use template_repo::TemplateRepo;
pub use wallet_repo::WalletRepo;
