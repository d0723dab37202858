//! Stripe-backed implementation of the billing provider boundary.
//!
//! Subscription reads and flag-only updates go through the typed async-stripe
//! client. The subscription-schedule endpoints and combined item/trial/metadata
//! updates are not usable through the 0.39 generated surface, so those calls
//! use Stripe's form-encoded wire format directly (same approach the invoice
//! preview endpoint requires).

use async_trait::async_trait;
use stripe::{
    CustomerId, ListSubscriptions, Subscription, SubscriptionId,
    SubscriptionStatus as StripeSubStatus, UpdateSubscription,
};
use time::OffsetDateTime;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::provider::{
    BillingProvider, ProrationMode, SchedulePhases, ScheduleState, SubscriptionState,
    SubscriptionStatus, SubscriptionUpdate,
};

pub struct StripeGateway {
    stripe: StripeClient,
}

impl StripeGateway {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }

    async fn retrieve_schedule(&self, schedule_id: &str) -> BillingResult<ScheduleState> {
        let value = self
            .stripe
            .get_json(&format!("subscription_schedules/{}", schedule_id), &[])
            .await?;
        schedule_from_json(&value)
    }
}

#[async_trait]
impl BillingProvider for StripeGateway {
    async fn find_subscription(
        &self,
        customer_ref: &str,
    ) -> BillingResult<Option<SubscriptionState>> {
        let customer_id = customer_ref.parse::<CustomerId>().map_err(|e| {
            BillingError::ProviderRejected(format!("Invalid customer ID: {}", e))
        })?;

        let params = ListSubscriptions {
            customer: Some(customer_id),
            ..Default::default()
        };

        let subscriptions = Subscription::list(self.stripe.inner(), &params).await?;
        subscriptions
            .data
            .into_iter()
            .find(|s| s.status != StripeSubStatus::Canceled)
            .map(map_subscription)
            .transpose()
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> BillingResult<SubscriptionState> {
        let sub_id = parse_subscription_id(subscription_id)?;
        let subscription = Subscription::retrieve(self.stripe.inner(), &sub_id, &[]).await?;
        map_subscription(subscription)
    }

    async fn update_subscription(
        &self,
        subscription_id: &str,
        update: SubscriptionUpdate,
    ) -> BillingResult<SubscriptionState> {
        // Flag-only updates stay on the typed client.
        if update.price_id.is_none()
            && update.proration.is_none()
            && update.trial_end.is_none()
            && update.metadata.is_none()
        {
            if let Some(flag) = update.cancel_at_period_end {
                let sub_id = parse_subscription_id(subscription_id)?;
                let params = UpdateSubscription {
                    cancel_at_period_end: Some(flag),
                    ..Default::default()
                };
                let subscription =
                    Subscription::update(self.stripe.inner(), &sub_id, params).await?;
                return map_subscription(subscription);
            }
        }

        let mut params: Vec<(String, String)> = Vec::new();

        if let Some(price_id) = &update.price_id {
            // Replacing the price needs the live item id; re-read rather than
            // trusting whatever the caller previously saw.
            let current = self.retrieve_subscription(subscription_id).await?;
            params.push(("items[0][id]".to_string(), current.item_id));
            params.push(("items[0][price]".to_string(), price_id.clone()));
        }
        if let Some(proration) = update.proration {
            params.push((
                "proration_behavior".to_string(),
                proration_wire_value(proration).to_string(),
            ));
        }
        if let Some(trial_end) = update.trial_end {
            params.push(("trial_end".to_string(), trial_end.unix_timestamp().to_string()));
        }
        if let Some(flag) = update.cancel_at_period_end {
            params.push(("cancel_at_period_end".to_string(), flag.to_string()));
        }
        if let Some(metadata) = &update.metadata {
            for (key, value) in metadata {
                params.push((format!("metadata[{}]", key), value.clone()));
            }
        }

        self.stripe
            .post_form(&format!("subscriptions/{}", subscription_id), &params)
            .await?;

        // Re-read through the typed client so every caller sees one mapping.
        self.retrieve_subscription(subscription_id).await
    }

    async fn find_schedule(&self, subscription_id: &str) -> BillingResult<Option<ScheduleState>> {
        let subscription = self.retrieve_subscription(subscription_id).await?;
        match subscription.schedule_ref {
            Some(schedule_id) => self.retrieve_schedule(&schedule_id).await.map(Some),
            None => Ok(None),
        }
    }

    async fn create_schedule(&self, subscription_id: &str) -> BillingResult<ScheduleState> {
        // Phases cannot be assigned at creation in this flow; the schedule is
        // created from the live subscription and phased in a follow-up update.
        let params = vec![(
            "from_subscription".to_string(),
            subscription_id.to_string(),
        )];
        let value = self.stripe.post_form("subscription_schedules", &params).await?;
        schedule_from_json(&value)
    }

    async fn update_schedule(
        &self,
        schedule_id: &str,
        phases: SchedulePhases,
    ) -> BillingResult<ScheduleState> {
        let mut params: Vec<(String, String)> = vec![
            (
                "phases[0][items][0][price]".to_string(),
                phases.current_price.clone(),
            ),
            ("phases[0][items][0][quantity]".to_string(), "1".to_string()),
            (
                "phases[0][start_date]".to_string(),
                phases.start.unix_timestamp().to_string(),
            ),
            (
                "phases[0][end_date]".to_string(),
                phases.pivot.unix_timestamp().to_string(),
            ),
            (
                "phases[1][items][0][price]".to_string(),
                phases.target_price.clone(),
            ),
            ("phases[1][items][0][quantity]".to_string(), "1".to_string()),
        ];
        if let Some(trial_end) = phases.trial_end {
            params.push((
                "phases[0][trial_end]".to_string(),
                trial_end.unix_timestamp().to_string(),
            ));
        }

        let value = self
            .stripe
            .post_form(&format!("subscription_schedules/{}", schedule_id), &params)
            .await?;
        schedule_from_json(&value)
    }

    async fn release_schedule(&self, schedule_id: &str) -> BillingResult<()> {
        self.stripe
            .post_form(&format!("subscription_schedules/{}/release", schedule_id), &[])
            .await?;
        Ok(())
    }
}

fn parse_subscription_id(subscription_id: &str) -> BillingResult<SubscriptionId> {
    subscription_id.parse::<SubscriptionId>().map_err(|e| {
        BillingError::ProviderRejected(format!("Invalid subscription ID: {}", e))
    })
}

fn proration_wire_value(mode: ProrationMode) -> &'static str {
    match mode {
        ProrationMode::NoCharge => "none",
        ProrationMode::InvoiceNow => "always_invoice",
    }
}

fn map_status(status: StripeSubStatus) -> SubscriptionStatus {
    match status {
        StripeSubStatus::Trialing => SubscriptionStatus::Trialing,
        StripeSubStatus::Active => SubscriptionStatus::Active,
        StripeSubStatus::Canceled | StripeSubStatus::IncompleteExpired => {
            SubscriptionStatus::Canceled
        }
        // Incomplete, past_due, unpaid: payment attention needed but the
        // subscription still exists.
        _ => SubscriptionStatus::PastDue,
    }
}

fn map_subscription(subscription: Subscription) -> BillingResult<SubscriptionState> {
    let item = subscription.items.data.first().ok_or_else(|| {
        BillingError::Internal(format!(
            "subscription {} has no items",
            subscription.id
        ))
    })?;
    let price_id = item
        .price
        .as_ref()
        .map(|p| p.id.to_string())
        .ok_or_else(|| {
            BillingError::Internal(format!(
                "subscription {} item has no price",
                subscription.id
            ))
        })?;

    let customer_ref = match &subscription.customer {
        stripe::Expandable::Id(id) => id.to_string(),
        stripe::Expandable::Object(customer) => customer.id.to_string(),
    };
    let schedule_ref = subscription.schedule.as_ref().map(|s| match s {
        stripe::Expandable::Id(id) => id.to_string(),
        stripe::Expandable::Object(schedule) => schedule.id.to_string(),
    });

    Ok(SubscriptionState {
        id: subscription.id.to_string(),
        customer_ref,
        status: map_status(subscription.status),
        item_id: item.id.to_string(),
        price_id,
        trial_end: subscription
            .trial_end
            .map(timestamp_to_datetime)
            .transpose()?,
        current_period_start: timestamp_to_datetime(subscription.current_period_start)?,
        current_period_end: timestamp_to_datetime(subscription.current_period_end)?,
        cancel_at_period_end: subscription.cancel_at_period_end,
        schedule_ref,
        metadata: subscription.metadata.clone().into_iter().collect(),
    })
}

fn timestamp_to_datetime(unix: i64) -> BillingResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(unix)
        .map_err(|e| BillingError::Internal(format!("invalid timestamp {}: {}", unix, e)))
}

fn schedule_from_json(value: &serde_json::Value) -> BillingResult<ScheduleState> {
    let id = json_str(value, "id")?;
    let subscription_id = value["subscription"]
        .as_str()
        .map(str::to_string)
        .or_else(|| value["subscription"]["id"].as_str().map(str::to_string))
        .unwrap_or_default();

    // A schedule created with from_subscription carries a single mirror phase
    // until the two-phase definition is assigned; only the assigned form maps
    // to a deferred change.
    let phases = match value["phases"].as_array() {
        Some(raw_phases) if raw_phases.len() == 2 => {
            let phase1 = &raw_phases[0];
            let phase2 = &raw_phases[1];
            Some(SchedulePhases {
                current_price: phase_price(phase1)?,
                target_price: phase_price(phase2)?,
                start: json_timestamp(phase1, "start_date")?,
                pivot: json_timestamp(phase1, "end_date")?,
                trial_end: match phase1["trial_end"].as_i64() {
                    Some(ts) => Some(timestamp_to_datetime(ts)?),
                    None => None,
                },
            })
        }
        _ => None,
    };

    Ok(ScheduleState {
        id,
        subscription_id,
        phases,
    })
}

fn phase_price(phase: &serde_json::Value) -> BillingResult<String> {
    let price = &phase["items"][0]["price"];
    price
        .as_str()
        .map(str::to_string)
        .or_else(|| price["id"].as_str().map(str::to_string))
        .ok_or_else(|| {
            BillingError::ProviderRejected("schedule phase has no price".to_string())
        })
}

fn json_str(value: &serde_json::Value, key: &str) -> BillingResult<String> {
    value[key]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            BillingError::ProviderRejected(format!("missing field `{}` in Stripe response", key))
        })
}

fn json_timestamp(value: &serde_json::Value, key: &str) -> BillingResult<OffsetDateTime> {
    let ts = value[key].as_i64().ok_or_else(|| {
        BillingError::ProviderRejected(format!("missing field `{}` in Stripe response", key))
    })?;
    timestamp_to_datetime(ts)
}
