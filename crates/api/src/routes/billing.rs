//! Billing route handlers
//!
//! Thin orchestration: validate the request shape, forward to the billing
//! service, map the outcome. The billing platform is the source of truth;
//! nothing here persists subscription state.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use formforge_billing::{CancelOutcome, ChangeOutcome, ResumeOutcome, StatusView};
use formforge_shared::{BillingInterval, PlanTier};

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChangePlanRequest {
    pub plan: PlanTier,
    /// Optional: change the billing interval in the same request.
    pub interval: Option<BillingInterval>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeIntervalRequest {
    pub interval: BillingInterval,
}

/// Entitlement limits for the effective plan, surfaced with the status.
#[derive(Debug, Serialize)]
pub struct PlanLimits {
    pub max_forms: u32,
    pub monthly_submissions: u64,
    pub hipaa_available: bool,
}

impl From<PlanTier> for PlanLimits {
    fn from(plan: PlanTier) -> Self {
        Self {
            max_forms: plan.max_forms(),
            monthly_submissions: plan.monthly_submissions(),
            hipaa_available: plan.hipaa_available(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    #[serde(flatten)]
    pub status: StatusView,
    pub limits: PlanLimits,
}

/// GET /api/billing/subscription
pub async fn get_subscription(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<SubscriptionResponse>> {
    let status = state
        .billing
        .subscriptions
        .status(user.customer_id)
        .await?;
    let limits = PlanLimits::from(status.plan);

    Ok(Json(SubscriptionResponse { status, limits }))
}

/// POST /api/billing/subscription/plan
pub async fn change_plan(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<ChangePlanRequest>,
) -> ApiResult<Json<ChangeOutcome>> {
    tracing::info!(
        customer_id = %user.customer_id,
        plan = %request.plan,
        interval = ?request.interval,
        "Plan change requested"
    );

    let outcome = state
        .billing
        .subscriptions
        .change_plan(user.customer_id, Some(request.plan), request.interval)
        .await?;

    Ok(Json(outcome))
}

/// POST /api/billing/subscription/interval
pub async fn change_interval(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<ChangeIntervalRequest>,
) -> ApiResult<Json<ChangeOutcome>> {
    tracing::info!(
        customer_id = %user.customer_id,
        interval = %request.interval,
        "Interval change requested"
    );

    let outcome = state
        .billing
        .subscriptions
        .change_interval(user.customer_id, request.interval)
        .await?;

    Ok(Json(outcome))
}

/// POST /api/billing/subscription/cancel
pub async fn cancel_subscription(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<CancelOutcome>> {
    tracing::info!(customer_id = %user.customer_id, "Cancellation requested");
    let outcome = state.billing.cancellation.cancel(user.customer_id).await?;
    Ok(Json(outcome))
}

/// POST /api/billing/subscription/resume
pub async fn resume_subscription(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<ResumeOutcome>> {
    tracing::info!(customer_id = %user.customer_id, "Resume requested");
    let outcome = state.billing.cancellation.resume(user.customer_id).await?;
    Ok(Json(outcome))
}
