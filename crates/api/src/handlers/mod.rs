pub mod campaigns;
pub mod messages;
pub mod meta;
pub mod pricing;
pub mod reports;
pub mod templates;
pub mod wallet;
