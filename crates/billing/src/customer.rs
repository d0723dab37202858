//! Customer directory
//!
//! The document store's only billing responsibility: the pointer from a
//! product customer to their billing-platform customer. Subscription state
//! itself is never cached here — the billing platform is the source of truth.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    /// The billing-platform customer id for a product customer, if one has
    /// been provisioned.
    async fn billing_ref(&self, customer_id: Uuid) -> BillingResult<Option<String>>;

    /// Record the billing-platform customer id after first checkout.
    async fn set_billing_ref(&self, customer_id: Uuid, billing_ref: &str) -> BillingResult<()>;
}

/// Postgres-backed directory over the `users` table.
pub struct PgCustomerDirectory {
    pool: PgPool,
}

impl PgCustomerDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustomerDirectory for PgCustomerDirectory {
    async fn billing_ref(&self, customer_id: Uuid) -> BillingResult<Option<String>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT stripe_customer_id FROM users WHERE id = $1")
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((billing_ref,)) => Ok(billing_ref),
            None => Err(BillingError::CustomerNotFound(customer_id.to_string())),
        }
    }

    async fn set_billing_ref(&self, customer_id: Uuid, billing_ref: &str) -> BillingResult<()> {
        let rows = sqlx::query(
            "UPDATE users SET stripe_customer_id = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(billing_ref)
        .bind(customer_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(BillingError::CustomerNotFound(customer_id.to_string()));
        }

        tracing::info!(
            customer_id = %customer_id,
            billing_ref = %billing_ref,
            "Recorded billing customer reference"
        );
        Ok(())
    }
}
