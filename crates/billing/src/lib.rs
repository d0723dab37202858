// Billing crate clippy configuration
#![allow(clippy::too_many_arguments)] // Some Stripe operations require many parameters
#![allow(clippy::field_reassign_with_default)] // Used for conditional struct field setting
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! FormForge Billing Module
//!
//! Subscription lifecycle management on top of Stripe.
//!
//! ## Features
//!
//! - **Effective-state resolution**: what plan/interval the product should
//!   grant right now, reconciling trial status and pending scheduled changes
//! - **Change classification**: trial-time, immediate upgrade, deferred
//!   downgrade, or cancel-pending-change
//! - **Deferred changes**: two-phase subscription schedules that keep the
//!   current price until period end, with a metadata-only degraded fallback
//! - **Cancellation/resume**: at-period-end cancellation coordinated with
//!   schedule release, trial boundaries preserved throughout

pub mod cancellation;
pub mod catalog;
pub mod classifier;
pub mod client;
pub mod customer;
pub mod error;
pub mod lifecycle;
pub mod provider;
pub mod resolver;
pub mod scheduler;
pub mod stripe_gateway;

#[cfg(test)]
mod testing;

// Cancellation
pub use cancellation::{CancelOutcome, CancellationHandler, ResumeOutcome};

// Catalog
pub use catalog::PlanCatalog;

// Classifier
pub use classifier::{classify, direction, ChangeDirection, ChangeKind};

// Client
pub use client::{PriceIds, StripeClient, StripeConfig};

// Customer
pub use customer::{CustomerDirectory, PgCustomerDirectory};

// Error
pub use error::{BillingError, BillingResult};

// Lifecycle
pub use lifecycle::{ChangeOutcome, StatusView, SubscriptionLifecycle};

// Provider
pub use provider::{
    BillingProvider, ProrationMode, SchedulePhases, ScheduleState, SubscriptionState,
    SubscriptionStatus, SubscriptionUpdate,
};

// Resolver
pub use resolver::{resolve, EffectiveState, PendingChange};

// Scheduler
pub use scheduler::DeferredChangeScheduler;

// Stripe gateway
pub use stripe_gateway::StripeGateway;

use std::sync::Arc;

use sqlx::PgPool;

/// Main billing service combining the lifecycle executor and the
/// cancellation handler over a shared provider and customer directory.
pub struct BillingService {
    pub subscriptions: SubscriptionLifecycle,
    pub cancellation: CancellationHandler,
}

impl BillingService {
    /// Create a billing service from environment variables.
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let stripe = StripeClient::from_env()?;
        Self::new(stripe, pool)
    }

    /// Create a billing service with an explicit Stripe client.
    pub fn new(stripe: StripeClient, pool: PgPool) -> BillingResult<Self> {
        let catalog = PlanCatalog::new(&stripe.config().price_ids)?;
        let provider: Arc<dyn BillingProvider> = Arc::new(StripeGateway::new(stripe));
        let directory: Arc<dyn CustomerDirectory> = Arc::new(PgCustomerDirectory::new(pool));
        Ok(Self::with_components(provider, directory, catalog))
    }

    /// Assemble over custom provider/directory implementations.
    pub fn with_components(
        provider: Arc<dyn BillingProvider>,
        directory: Arc<dyn CustomerDirectory>,
        catalog: PlanCatalog,
    ) -> Self {
        Self {
            subscriptions: SubscriptionLifecycle::new(
                provider.clone(),
                directory.clone(),
                catalog.clone(),
            ),
            cancellation: CancellationHandler::new(provider, directory, catalog),
        }
    }
}
