//! Handlers for client reports.
//!
//! All figures are computed from the ledger and the message log at read
//! time; nothing is cached.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{Duration, Utc};
use oneclick_core::campaign::CampaignStatus;
use oneclick_core::error::CoreError;
use oneclick_core::reporting::{
    day_bounds, parse_day, resolve_range, CampaignPerformance, DailyTransactions,
    FinancialSummary, LedgerTotals,
};
use oneclick_core::types::DbId;
use oneclick_db::models::report::LedgerTotalsRow;
use oneclick_db::repositories::{PricingRepo, ReportRepo, WalletRepo};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAuth;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FinancialSummaryParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CampaignPerformanceParams {
    pub campaign_id: Option<DbId>,
}

#[derive(Debug, Deserialize)]
pub struct DailyTransactionsParams {
    /// `YYYY-MM-DD`; today (UTC) when absent.
    pub date: Option<String>,
}

fn ledger_totals(row: &LedgerTotalsRow) -> LedgerTotals {
    LedgerTotals {
        top_ups: row.top_ups,
        deductions: row.deductions,
        refunds: row.refunds,
    }
}

/// GET /api/v1/reports/financial-summary
///
/// Top-ups, net deductions and average cost per sent message over
/// `[start_date, end_date]` (default: the last 30 days).
pub async fn financial_summary(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
    Query(params): Query<FinancialSummaryParams>,
) -> AppResult<impl IntoResponse> {
    let range = resolve_range(
        params.start_date.as_deref(),
        params.end_date.as_deref(),
        Utc::now(),
    )?;

    let totals = ReportRepo::ledger_totals(&state.pool, caller.client_id, range.start, range.end).await?;
    let sent =
        ReportRepo::count_messages_sent(&state.pool, caller.client_id, range.start, range.end).await?;
    let balance = WalletRepo::balance(&state.pool, caller.client_id).await?;
    let pricing = PricingRepo::resolve(&state.pool, caller.client_id, &state.config.pricing).await?;

    let summary = FinancialSummary::compute(
        range,
        ledger_totals(&totals),
        sent,
        balance,
        pricing.currency,
    );
    Ok(Json(DataResponse { data: summary }))
}

/// GET /api/v1/reports/campaign-performance
///
/// Delivery funnel per campaign. With `?campaign_id=` only that campaign is
/// reported, and an unknown id is a 404.
pub async fn campaign_performance(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
    Query(params): Query<CampaignPerformanceParams>,
) -> AppResult<impl IntoResponse> {
    let rows = ReportRepo::campaign_counts(&state.pool, caller.client_id, params.campaign_id).await?;

    if let Some(id) = params.campaign_id {
        if rows.is_empty() {
            return Err(AppError::Core(CoreError::NotFound {
                entity: "Campaign",
                id,
            }));
        }
    }

    let report: Vec<CampaignPerformance> = rows
        .iter()
        .map(|row| {
            let status = CampaignStatus::from_id(row.status_id)
                .map(|s| s.name().to_string())
                .unwrap_or_else(|| row.status_id.to_string());
            CampaignPerformance::from_counts(
                row.campaign_id,
                row.campaign_name.clone(),
                status,
                row.counts(),
            )
        })
        .collect();

    Ok(Json(DataResponse { data: report }))
}

/// GET /api/v1/reports/daily-transactions
pub async fn daily_transactions(
    RequireAuth(caller): RequireAuth,
    State(state): State<AppState>,
    Query(params): Query<DailyTransactionsParams>,
) -> AppResult<impl IntoResponse> {
    let date = match params.date.as_deref() {
        Some(raw) if !raw.trim().is_empty() => parse_day(raw)?,
        _ => Utc::now().date_naive(),
    };
    let (start, next_day) = day_bounds(date);
    let end = next_day - Duration::microseconds(1);

    let totals = ReportRepo::ledger_totals(&state.pool, caller.client_id, start, end).await?;

    Ok(Json(DataResponse {
        data: DailyTransactions {
            date,
            total_top_ups: totals.top_ups,
            total_deductions: totals.deductions,
            total_refunds: totals.refunds,
            transaction_count: totals.transaction_count,
        },
    }))
}
