//! Integration tests for per-client pricing overrides.

use rust_decimal_macros::dec;
use sqlx::PgPool;

use oneclick_core::pricing::{PricingDefaults, SYSTEM_DEFAULT_PRICE_PER_MESSAGE};
use oneclick_db::models::pricing::UpsertClientPricing;
use oneclick_db::repositories::PricingRepo;

fn override_of(price: rust_decimal::Decimal) -> UpsertClientPricing {
    UpsertClientPricing {
        price_per_message: price,
        currency: "USD".to_string(),
        notes: Some("negotiated".to_string()),
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn test_resolve_falls_back_to_default(pool: PgPool) {
    let resolved = PricingRepo::resolve(&pool, 1, &PricingDefaults::default())
        .await
        .unwrap();
    assert!(resolved.is_default);
    assert_eq!(resolved.price_per_message, SYSTEM_DEFAULT_PRICE_PER_MESSAGE);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_override_then_remove_reverts(pool: PgPool) {
    let defaults = PricingDefaults::default();
    PricingRepo::upsert(&pool, 1, &override_of(dec!(0.02))).await.unwrap();

    let resolved = PricingRepo::resolve(&pool, 1, &defaults).await.unwrap();
    assert!(!resolved.is_default);
    assert_eq!(resolved.price_per_message, dec!(0.02));

    // Other clients are unaffected.
    let other = PricingRepo::resolve(&pool, 2, &defaults).await.unwrap();
    assert!(other.is_default);

    assert!(PricingRepo::delete(&pool, 1).await.unwrap());
    assert!(!PricingRepo::delete(&pool, 1).await.unwrap());
    let reverted = PricingRepo::resolve(&pool, 1, &defaults).await.unwrap();
    assert!(reverted.is_default);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_upsert_replaces_and_update_requires_row(pool: PgPool) {
    assert!(PricingRepo::update(&pool, 3, &override_of(dec!(0.01)))
        .await
        .unwrap()
        .is_none());

    PricingRepo::upsert(&pool, 3, &override_of(dec!(0.01))).await.unwrap();
    let replaced = PricingRepo::upsert(&pool, 3, &override_of(dec!(0))).await.unwrap();
    assert_eq!(replaced.price_per_message, dec!(0));

    let all = PricingRepo::list(&pool, 10, 0).await.unwrap();
    assert_eq!(all.len(), 1);
}
