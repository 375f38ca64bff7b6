//! HTTP-level tests for the client reports.

mod common;

use axum::http::StatusCode;
use chrono::Utc;
use common::{body_json, client_token, get_auth};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use sqlx::PgPool;

use oneclick_core::campaign::CampaignStatus;
use oneclick_core::template::TemplateStructure;
use oneclick_db::models::campaign::CreateCampaign;
use oneclick_db::models::message::CreateOutgoingMessage;
use oneclick_db::models::pricing::UpsertClientPricing;
use oneclick_db::models::template::CreateTemplate;
use oneclick_db::models::wallet::DebitOutcome;
use oneclick_db::repositories::{CampaignRepo, MessageRepo, PricingRepo, TemplateRepo, WalletRepo};

const CLIENT: i64 = 7;
const BUSINESS: &str = "+15550009999";

fn money(value: &Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}

async fn seed_campaign(pool: &PgPool, recipients: usize) -> (i64, Vec<String>) {
    let template = TemplateRepo::create(
        pool,
        &CreateTemplate {
            client_id: CLIENT,
            name: "report_template".to_string(),
            category: "MARKETING".to_string(),
            language: "en_US".to_string(),
            structure: TemplateStructure {
                body: "Hello".to_string(),
                ..Default::default()
            },
            variables: Vec::new(),
            status: "APPROVED".to_string(),
            external_template_id: None,
        },
    )
    .await
    .unwrap();

    let phones: Vec<String> = (0..recipients).map(|i| format!("+1555123{i:04}")).collect();
    let campaign = CampaignRepo::create(
        pool,
        &CreateCampaign {
            client_id: CLIENT,
            name: "Black friday".to_string(),
            template_id: template.id,
            audience: json!(phones),
            total_recipients: recipients as i32,
            personalization: json!({}),
            status: CampaignStatus::Sending,
            scheduled_at: None,
        },
    )
    .await
    .unwrap();
    (campaign.id, phones)
}

async fn queue(pool: &PgPool, campaign_id: Option<i64>, to: &str) -> i64 {
    MessageRepo::create_outgoing(
        pool,
        &CreateOutgoingMessage {
            client_id: CLIENT,
            campaign_id,
            from_phone: BUSINESS.to_string(),
            to_phone: to.to_string(),
            content: "Hello".to_string(),
        },
    )
    .await
    .unwrap()
    .unwrap()
    .id
}

async fn debit(pool: &PgPool, message_id: i64, amount: Decimal) {
    let outcome = WalletRepo::debit(pool, CLIENT, amount, Some(message_id), Some("message"))
        .await
        .unwrap();
    assert!(matches!(outcome, DebitOutcome::Applied(_)));
}

// ---------------------------------------------------------------------------
// Financial summary
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn test_financial_summary_nets_refunds(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    WalletRepo::credit(&pool, CLIENT, dec!(10), Some("top-up")).await.unwrap();

    let delivered = queue(&pool, None, "+15551230001").await;
    debit(&pool, delivered, dec!(0.02)).await;
    MessageRepo::mark_sent(&pool, delivered, "wamid.R1", 1).await.unwrap().unwrap();

    let failed = queue(&pool, None, "+15551230002").await;
    debit(&pool, failed, dec!(0.02)).await;
    MessageRepo::mark_failed(&pool, failed, "rejected", 1).await.unwrap().unwrap();
    WalletRepo::refund(&pool, CLIENT, failed, dec!(0.02), Some("send failed"))
        .await
        .unwrap()
        .unwrap();

    let response = get_auth(app, "/api/v1/reports/financial-summary", &client_token(CLIENT)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let data = &body_json(response).await["data"];

    assert_eq!(money(&data["total_top_ups"]), dec!(10));
    assert_eq!(money(&data["total_deductions"]), dec!(0.02));
    assert_eq!(money(&data["total_refunds"]), dec!(0.02));
    assert_eq!(money(&data["net_change"]), dec!(9.98));
    assert_eq!(money(&data["current_balance"]), dec!(9.98));
    assert_eq!(data["total_messages_sent"], 1);
    assert_eq!(money(&data["avg_cost_per_message"]), dec!(0.02));
    assert_eq!(data["currency"], "USD");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_financial_summary_reports_the_client_currency(pool: PgPool) {
    PricingRepo::upsert(
        &pool,
        CLIENT,
        &UpsertClientPricing {
            price_per_message: dec!(0.05),
            currency: "EUR".to_string(),
            notes: None,
        },
    )
    .await
    .unwrap();

    let response = get_auth(
        common::build_test_app(pool),
        "/api/v1/reports/financial-summary",
        &client_token(CLIENT),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["currency"], "EUR");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_financial_summary_without_messages_has_zero_average(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    WalletRepo::credit(&pool, CLIENT, dec!(5), None).await.unwrap();

    let json = body_json(
        get_auth(app.clone(), "/api/v1/reports/financial-summary", &client_token(CLIENT)).await,
    )
    .await;
    assert_eq!(json["data"]["total_messages_sent"], 0);
    assert_eq!(money(&json["data"]["avg_cost_per_message"]), Decimal::ZERO);

    // A window entirely in the past sees nothing, but the balance is current.
    let json = body_json(
        get_auth(
            app.clone(),
            "/api/v1/reports/financial-summary?start_date=2020-01-01&end_date=2020-01-31",
            &client_token(CLIENT),
        )
        .await,
    )
    .await;
    assert_eq!(money(&json["data"]["total_top_ups"]), Decimal::ZERO);
    assert_eq!(money(&json["data"]["current_balance"]), dec!(5));

    let response = get_auth(
        app,
        "/api/v1/reports/financial-summary?start_date=2024-02-01&end_date=2024-01-01",
        &client_token(CLIENT),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Campaign performance
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn test_campaign_performance_rates(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let (campaign_id, phones) = seed_campaign(&pool, 10).await;

    for (i, phone) in phones.iter().enumerate() {
        let id = queue(&pool, Some(campaign_id), phone).await;
        if i < 7 {
            MessageRepo::mark_sent(&pool, id, &format!("wamid.{i}"), 1).await.unwrap().unwrap();
        } else {
            MessageRepo::mark_failed(&pool, id, "undeliverable", 3).await.unwrap().unwrap();
        }
    }

    let response = get_auth(
        app.clone(),
        &format!("/api/v1/reports/campaign-performance?campaign_id={campaign_id}"),
        &client_token(CLIENT),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let report = &json["data"][0];

    assert_eq!(report["campaign_name"], "Black friday");
    assert_eq!(report["status"], "SENDING");
    assert_eq!(report["total_recipients"], 10);
    assert_eq!(report["total_messages_attempted"], 10);
    assert_eq!(report["total_sent"], 7);
    assert_eq!(report["total_failed"], 3);
    assert_eq!(report["sent_rate_percentage"], 70.0);
    assert_eq!(report["failure_rate_percentage"], 30.0);
    assert_eq!(report["delivery_rate_percentage"], 0.0);

    // Another client cannot see it.
    let response = get_auth(
        app,
        &format!("/api/v1/reports/campaign-performance?campaign_id={campaign_id}"),
        &client_token(CLIENT + 1),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_campaign_without_messages_reports_zero_rates(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    seed_campaign(&pool, 3).await;

    let json = body_json(
        get_auth(app, "/api/v1/reports/campaign-performance", &client_token(CLIENT)).await,
    )
    .await;

    let reports = json["data"].as_array().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["total_messages_attempted"], 0);
    assert_eq!(reports[0]["sent_rate_percentage"], 0.0);
}

// ---------------------------------------------------------------------------
// Daily transactions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn test_daily_transactions_for_today_and_other_days(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let token = client_token(CLIENT);
    WalletRepo::credit(&pool, CLIENT, dec!(3), None).await.unwrap();
    let message = queue(&pool, None, "+15551230001").await;
    debit(&pool, message, dec!(0.5)).await;

    let json = body_json(get_auth(app.clone(), "/api/v1/reports/daily-transactions", &token).await).await;
    let data = &json["data"];
    assert_eq!(data["date"], Utc::now().date_naive().to_string());
    assert_eq!(money(&data["total_top_ups"]), dec!(3));
    assert_eq!(money(&data["total_deductions"]), dec!(0.5));
    assert_eq!(data["transaction_count"], 2);

    let json = body_json(
        get_auth(app.clone(), "/api/v1/reports/daily-transactions?date=2021-06-01", &token).await,
    )
    .await;
    assert_eq!(json["data"]["transaction_count"], 0);

    let response = get_auth(app, "/api/v1/reports/daily-transactions?date=June", &token).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
