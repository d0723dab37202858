//! Domain model of the billing platform surface
//!
//! The billing platform owns subscription state; this module is the typed
//! boundary the rest of the crate works against. `BillingProvider` is the
//! trait seam: production code talks to Stripe through
//! [`crate::stripe_gateway::StripeGateway`], tests talk to an in-memory
//! implementation with the same semantics.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use time::OffsetDateTime;

use formforge_shared::{BillingInterval, PlanTier};

use crate::error::BillingResult;

/// Metadata keys the system writes on subscriptions. This annotation layer is
/// the only state the system fully controls; the billing platform does not
/// interpret it.
pub const META_PLAN: &str = "plan_id";
pub const META_INTERVAL: &str = "interval";
pub const META_SCHEDULED_PLAN: &str = "scheduled_plan_id";
pub const META_SCHEDULED_INTERVAL: &str = "scheduled_interval";
pub const META_SCHEDULED_CHANGE_DATE: &str = "scheduled_change_date";

/// Billing platform subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
        }
    }
}

/// Snapshot of a subscription as read from the billing platform.
///
/// Never cached across requests: the platform can change state asynchronously
/// (webhooks, dunning, dashboard actions), so every decision re-reads.
#[derive(Debug, Clone)]
pub struct SubscriptionState {
    pub id: String,
    pub customer_ref: String,
    pub status: SubscriptionStatus,
    /// The single price item's id (this product sells one price per subscription).
    pub item_id: String,
    /// The active price on that item.
    pub price_id: String,
    pub trial_end: Option<OffsetDateTime>,
    pub current_period_start: OffsetDateTime,
    pub current_period_end: OffsetDateTime,
    pub cancel_at_period_end: bool,
    /// Reference to an attached deferred-change schedule, if any.
    pub schedule_ref: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl SubscriptionState {
    /// The plan/interval the annotation layer says the customer has.
    pub fn plan_annotation(&self) -> Option<(PlanTier, BillingInterval)> {
        let plan = PlanTier::from_str(self.metadata.get(META_PLAN)?).ok()?;
        let interval = BillingInterval::from_str(self.metadata.get(META_INTERVAL)?).ok()?;
        Some((plan, interval))
    }

    /// A pending scheduled change recorded in the annotation layer.
    pub fn scheduled_annotation(&self) -> Option<ScheduledAnnotation> {
        let plan = PlanTier::from_str(self.metadata.get(META_SCHEDULED_PLAN)?).ok()?;
        let interval =
            BillingInterval::from_str(self.metadata.get(META_SCHEDULED_INTERVAL)?).ok()?;
        let change_date = self
            .metadata
            .get(META_SCHEDULED_CHANGE_DATE)
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok());
        Some(ScheduledAnnotation {
            plan,
            interval,
            change_date,
        })
    }
}

/// Parsed `scheduled_*` metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledAnnotation {
    pub plan: PlanTier,
    pub interval: BillingInterval,
    pub change_date: Option<OffsetDateTime>,
}

/// Proration behavior for a price-item change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProrationMode {
    /// No charge, no credit. Required for every change while a trial is active.
    NoCharge,
    /// Charge the prorated difference immediately.
    InvoiceNow,
}

/// Mutation request for a subscription. Unset fields are left untouched.
///
/// Metadata entries merge into the platform's bag; an empty string value
/// removes the key (Stripe metadata semantics — the test double matches).
#[derive(Debug, Clone, Default)]
pub struct SubscriptionUpdate {
    pub price_id: Option<String>,
    pub proration: Option<ProrationMode>,
    pub trial_end: Option<OffsetDateTime>,
    pub cancel_at_period_end: Option<bool>,
    pub metadata: Option<HashMap<String, String>>,
}

/// The two-phase deferred-change schedule, modeled as a tagged record rather
/// than a phase list: exactly one transition, which keeps the
/// one-schedule-per-subscription invariant easy to enforce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulePhases {
    /// Phase 1 price: what the customer keeps until the pivot.
    pub current_price: String,
    /// Phase 2 price: what the schedule switches to at the pivot, open-ended.
    pub target_price: String,
    /// Phase 1 start, normally the current period start.
    pub start: OffsetDateTime,
    /// Phase boundary: phase 1 ends and phase 2 begins here.
    pub pivot: OffsetDateTime,
    /// Trial boundary carried on phase 1 when the schedule was created during
    /// a trial. The platform may clear the subscription's own `trial_end`
    /// once a schedule is attached; this field stays authoritative.
    pub trial_end: Option<OffsetDateTime>,
}

/// A deferred-change schedule as read from the billing platform.
#[derive(Debug, Clone)]
pub struct ScheduleState {
    pub id: String,
    pub subscription_id: String,
    /// None right after creation: the platform forbids assigning phases in
    /// the creation call, so a fresh schedule mirrors the subscription until
    /// the follow-up update lands.
    pub phases: Option<SchedulePhases>,
}

/// Async boundary to the billing platform.
///
/// Writes use last-write-wins semantics on the platform side; the release-
/// before-mutate discipline in the scheduler and executor is what prevents
/// two schedules from coexisting.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Most recent non-canceled subscription for a platform customer.
    async fn find_subscription(
        &self,
        customer_ref: &str,
    ) -> BillingResult<Option<SubscriptionState>>;

    /// Re-read a subscription by id.
    async fn retrieve_subscription(&self, subscription_id: &str)
        -> BillingResult<SubscriptionState>;

    /// Apply a mutation and return the fresh state.
    async fn update_subscription(
        &self,
        subscription_id: &str,
        update: SubscriptionUpdate,
    ) -> BillingResult<SubscriptionState>;

    /// Active schedule attached to a subscription, if any.
    async fn find_schedule(&self, subscription_id: &str) -> BillingResult<Option<ScheduleState>>;

    /// Create a schedule from the subscription's current state. Phases cannot
    /// be assigned here; callers follow up with [`update_schedule`].
    ///
    /// [`update_schedule`]: BillingProvider::update_schedule
    async fn create_schedule(&self, subscription_id: &str) -> BillingResult<ScheduleState>;

    /// Replace a schedule's phase definition.
    async fn update_schedule(
        &self,
        schedule_id: &str,
        phases: SchedulePhases,
    ) -> BillingResult<ScheduleState>;

    /// Detach a schedule without canceling the underlying subscription.
    async fn release_schedule(&self, schedule_id: &str) -> BillingResult<()>;
}

/// Metadata write: the customer's believed plan becomes `plan`/`interval`,
/// and any pending scheduled change is cleared with it.
pub fn plan_metadata(plan: PlanTier, interval: BillingInterval) -> HashMap<String, String> {
    let mut metadata = cleared_scheduled_metadata();
    metadata.insert(META_PLAN.to_string(), plan.to_string());
    metadata.insert(META_INTERVAL.to_string(), interval.to_string());
    metadata
}

/// Metadata write recording a pending deferred change.
pub fn scheduled_metadata(
    plan: PlanTier,
    interval: BillingInterval,
    change_date: OffsetDateTime,
) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert(META_SCHEDULED_PLAN.to_string(), plan.to_string());
    metadata.insert(META_SCHEDULED_INTERVAL.to_string(), interval.to_string());
    metadata.insert(
        META_SCHEDULED_CHANGE_DATE.to_string(),
        change_date.unix_timestamp().to_string(),
    );
    metadata
}

/// Metadata write removing all scheduled-change keys. The keys are cleared
/// together: a half-cleared pending change must never be observable.
pub fn cleared_scheduled_metadata() -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert(META_SCHEDULED_PLAN.to_string(), String::new());
    metadata.insert(META_SCHEDULED_INTERVAL.to_string(), String::new());
    metadata.insert(META_SCHEDULED_CHANGE_DATE.to_string(), String::new());
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_subscription() -> SubscriptionState {
        SubscriptionState {
            id: "sub_1".to_string(),
            customer_ref: "cus_1".to_string(),
            status: SubscriptionStatus::Active,
            item_id: "si_1".to_string(),
            price_id: "price_pro_m".to_string(),
            trial_end: None,
            current_period_start: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
            current_period_end: OffsetDateTime::from_unix_timestamp(1_702_592_000).unwrap(),
            cancel_at_period_end: false,
            schedule_ref: None,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_plan_annotation_parses_both_keys_or_nothing() {
        let mut sub = base_subscription();
        assert_eq!(sub.plan_annotation(), None);

        sub.metadata.insert(META_PLAN.to_string(), "pro".to_string());
        assert_eq!(sub.plan_annotation(), None);

        sub.metadata
            .insert(META_INTERVAL.to_string(), "monthly".to_string());
        assert_eq!(
            sub.plan_annotation(),
            Some((PlanTier::Pro, BillingInterval::Monthly))
        );
    }

    #[test]
    fn test_scheduled_annotation_round_trips_through_metadata_writes() {
        let pivot = OffsetDateTime::from_unix_timestamp(1_702_592_000).unwrap();
        let mut sub = base_subscription();
        sub.metadata
            .extend(scheduled_metadata(PlanTier::Basic, BillingInterval::Monthly, pivot));

        let scheduled = sub.scheduled_annotation().unwrap();
        assert_eq!(scheduled.plan, PlanTier::Basic);
        assert_eq!(scheduled.interval, BillingInterval::Monthly);
        assert_eq!(scheduled.change_date, Some(pivot));
    }

    #[test]
    fn test_plan_metadata_clears_scheduled_keys() {
        let metadata = plan_metadata(PlanTier::Enterprise, BillingInterval::Annual);
        assert_eq!(metadata.get(META_PLAN).map(String::as_str), Some("enterprise"));
        assert_eq!(metadata.get(META_SCHEDULED_PLAN).map(String::as_str), Some(""));
        assert_eq!(metadata.get(META_SCHEDULED_INTERVAL).map(String::as_str), Some(""));
        assert_eq!(
            metadata.get(META_SCHEDULED_CHANGE_DATE).map(String::as_str),
            Some("")
        );
    }
}
