//! Billing error taxonomy

use thiserror::Error;

pub type BillingResult<T> = Result<T, BillingError>;

/// Errors produced by the billing crate.
///
/// The taxonomy distinguishes request problems (rejected before any billing
/// platform call), user-correctable states, and platform failures. Platform
/// failures split into `ProviderRejected` (the platform refused the specific
/// operation; scheduling paths recover from this) and `ProviderUnavailable`
/// (transport-level failure; retryable, caller must assume nothing mutated).
#[derive(Debug, Error)]
pub enum BillingError {
    /// Plan/interval pair has no configured price.
    #[error("unknown plan or interval: {0}")]
    UnknownPlanOrInterval(String),

    /// The request matches the subscription's current state and nothing is pending.
    #[error("no change requested: subscription already matches the requested plan")]
    NoChangeRequested,

    /// The customer has no subscription on the billing platform to modify.
    #[error("no active subscription for customer {0}")]
    NoActiveSubscription(String),

    /// Resume was requested but the subscription is not pending cancellation.
    #[error("subscription is not pending cancellation")]
    NotPendingCancellation,

    /// No customer record (or no billing reference) in the directory.
    #[error("customer not found: {0}")]
    CustomerNotFound(String),

    /// The billing platform rejected the operation.
    #[error("billing platform rejected the request: {0}")]
    ProviderRejected(String),

    /// The billing platform could not be reached; safe to retry.
    #[error("billing platform unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BillingError {
    /// Whether the caller may retry the exact request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::ProviderUnavailable(_))
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        match &err {
            // Transport-level failures: the request may never have reached Stripe.
            stripe::StripeError::ClientError(_) | stripe::StripeError::Timeout => {
                BillingError::ProviderUnavailable(err.to_string())
            }
            _ => BillingError::ProviderRejected(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            BillingError::ProviderUnavailable(err.to_string())
        } else {
            BillingError::ProviderRejected(err.to_string())
        }
    }
}
