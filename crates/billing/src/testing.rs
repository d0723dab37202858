//! In-memory doubles for the billing platform and the customer directory.
//!
//! `InMemoryProvider` mirrors the platform semantics the production gateway
//! relies on: metadata merge with empty-string removal, at most one schedule
//! per subscription, phases assigned only after creation, and an optional
//! trial-end drift on release. Every call is recorded for assertions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use formforge_shared::{BillingInterval, PlanTier};

use crate::catalog::{test_price_ids, PlanCatalog};
use crate::customer::CustomerDirectory;
use crate::error::{BillingError, BillingResult};
use crate::provider::{
    BillingProvider, ProrationMode, SchedulePhases, ScheduleState, SubscriptionState,
    SubscriptionStatus, SubscriptionUpdate, META_INTERVAL, META_PLAN,
};

const PERIOD_START: i64 = 1_700_000_000;
const TRIAL_DAYS: i64 = 14;
const PERIOD_DAYS: i64 = 30;

pub fn test_catalog() -> PlanCatalog {
    PlanCatalog::new(&test_price_ids()).unwrap()
}

fn datetime(unix: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(unix).unwrap()
}

#[derive(Default)]
pub struct InMemoryProvider {
    subscriptions: Mutex<HashMap<String, SubscriptionState>>,
    schedules: Mutex<HashMap<String, ScheduleState>>,
    calls: Mutex<Vec<String>>,
    updates: Mutex<Vec<(String, SubscriptionUpdate)>>,
    counter: AtomicU64,
    fail_schedule_writes: AtomicBool,
    schedule_writes_unavailable: AtomicBool,
    unavailable: AtomicBool,
    clear_trial_end_on_release: AtomicBool,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a subscription on the given plan. Trialing subscriptions get a
    /// 14-day trial whose end coincides with the current period end, the way
    /// the platform reports a trial period.
    pub fn seed_subscription(
        &self,
        plan: PlanTier,
        interval: BillingInterval,
        trialing: bool,
    ) -> SubscriptionState {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let start = datetime(PERIOD_START);
        let (status, trial_end, period_end) = if trialing {
            let end = start + Duration::days(TRIAL_DAYS);
            (SubscriptionStatus::Trialing, Some(end), end)
        } else {
            (
                SubscriptionStatus::Active,
                None,
                start + Duration::days(PERIOD_DAYS),
            )
        };

        let catalog = test_catalog();
        let price_id = catalog.price_id(plan, interval).unwrap().to_string();

        let mut metadata = HashMap::new();
        metadata.insert(META_PLAN.to_string(), plan.to_string());
        metadata.insert(META_INTERVAL.to_string(), interval.to_string());

        let subscription = SubscriptionState {
            id: format!("sub_{}", n),
            customer_ref: format!("cus_{}", n),
            status,
            item_id: format!("si_{}", n),
            price_id,
            trial_end,
            current_period_start: start,
            current_period_end: period_end,
            cancel_at_period_end: false,
            schedule_ref: None,
            metadata,
        };

        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id.clone(), subscription.clone());
        subscription
    }

    pub fn set_fail_schedule_writes(&self, fail: bool) {
        self.fail_schedule_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Schedule create/update fail with a transport error while everything
    /// else keeps working.
    pub fn set_schedule_writes_unavailable(&self, unavailable: bool) {
        self.schedule_writes_unavailable
            .store(unavailable, Ordering::SeqCst);
    }

    pub fn set_clear_trial_end_on_release(&self, clear: bool) {
        self.clear_trial_end_on_release.store(clear, Ordering::SeqCst);
    }

    pub fn schedule_count(&self) -> usize {
        self.schedules.lock().unwrap().len()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == name)
            .count()
    }

    /// All recorded provider calls, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Every recorded subscription update, in order.
    pub fn recorded_updates(&self) -> Vec<(String, SubscriptionUpdate)> {
        self.updates.lock().unwrap().clone()
    }

    /// Proration modes used across all updates, in order.
    pub fn proration_modes_used(&self) -> Vec<ProrationMode> {
        self.recorded_updates()
            .into_iter()
            .filter_map(|(_, u)| u.proration)
            .collect()
    }

    /// Direct peek at current platform-side state.
    pub fn subscription(&self, id: &str) -> SubscriptionState {
        self.subscriptions.lock().unwrap().get(id).cloned().unwrap()
    }

    pub fn schedule_for(&self, subscription_id: &str) -> Option<ScheduleState> {
        self.schedules
            .lock()
            .unwrap()
            .values()
            .find(|s| s.subscription_id == subscription_id)
            .cloned()
    }

    fn record(&self, name: &str) -> BillingResult<()> {
        self.calls.lock().unwrap().push(name.to_string());
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BillingError::ProviderUnavailable(
                "connection refused".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl BillingProvider for InMemoryProvider {
    async fn find_subscription(
        &self,
        customer_ref: &str,
    ) -> BillingResult<Option<SubscriptionState>> {
        self.record("find_subscription")?;
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .find(|s| s.customer_ref == customer_ref && s.status != SubscriptionStatus::Canceled)
            .cloned())
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> BillingResult<SubscriptionState> {
        self.record("retrieve_subscription")?;
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| {
                BillingError::ProviderRejected(format!("no such subscription: {}", subscription_id))
            })
    }

    async fn update_subscription(
        &self,
        subscription_id: &str,
        update: SubscriptionUpdate,
    ) -> BillingResult<SubscriptionState> {
        self.record("update_subscription")?;
        self.updates
            .lock()
            .unwrap()
            .push((subscription_id.to_string(), update.clone()));

        let mut subscriptions = self.subscriptions.lock().unwrap();
        let subscription = subscriptions.get_mut(subscription_id).ok_or_else(|| {
            BillingError::ProviderRejected(format!("no such subscription: {}", subscription_id))
        })?;

        if let Some(price_id) = update.price_id {
            subscription.price_id = price_id;
        }
        if let Some(trial_end) = update.trial_end {
            subscription.trial_end = Some(trial_end);
        }
        if let Some(flag) = update.cancel_at_period_end {
            subscription.cancel_at_period_end = flag;
        }
        if let Some(metadata) = update.metadata {
            for (key, value) in metadata {
                if value.is_empty() {
                    subscription.metadata.remove(&key);
                } else {
                    subscription.metadata.insert(key, value);
                }
            }
        }

        Ok(subscription.clone())
    }

    async fn find_schedule(&self, subscription_id: &str) -> BillingResult<Option<ScheduleState>> {
        self.record("find_schedule")?;
        Ok(self.schedule_for(subscription_id))
    }

    async fn create_schedule(&self, subscription_id: &str) -> BillingResult<ScheduleState> {
        self.record("create_schedule")?;
        if self.schedule_writes_unavailable.load(Ordering::SeqCst) {
            return Err(BillingError::ProviderUnavailable(
                "connection reset".to_string(),
            ));
        }
        if self.fail_schedule_writes.load(Ordering::SeqCst) {
            return Err(BillingError::ProviderRejected(
                "schedule creation refused".to_string(),
            ));
        }
        if self.schedule_for(subscription_id).is_some() {
            return Err(BillingError::ProviderRejected(format!(
                "subscription {} already has an active schedule",
                subscription_id
            )));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let schedule = ScheduleState {
            id: format!("sched_{}", n),
            subscription_id: subscription_id.to_string(),
            phases: None,
        };

        self.schedules
            .lock()
            .unwrap()
            .insert(schedule.id.clone(), schedule.clone());
        if let Some(subscription) = self.subscriptions.lock().unwrap().get_mut(subscription_id) {
            subscription.schedule_ref = Some(schedule.id.clone());
        }

        Ok(schedule)
    }

    async fn update_schedule(
        &self,
        schedule_id: &str,
        phases: SchedulePhases,
    ) -> BillingResult<ScheduleState> {
        self.record("update_schedule")?;
        if self.schedule_writes_unavailable.load(Ordering::SeqCst) {
            return Err(BillingError::ProviderUnavailable(
                "connection reset".to_string(),
            ));
        }
        if self.fail_schedule_writes.load(Ordering::SeqCst) {
            return Err(BillingError::ProviderRejected(
                "schedule update refused".to_string(),
            ));
        }

        let mut schedules = self.schedules.lock().unwrap();
        let schedule = schedules.get_mut(schedule_id).ok_or_else(|| {
            BillingError::ProviderRejected(format!("no such schedule: {}", schedule_id))
        })?;
        schedule.phases = Some(phases);
        Ok(schedule.clone())
    }

    async fn release_schedule(&self, schedule_id: &str) -> BillingResult<()> {
        self.record("release_schedule")?;
        let removed = self.schedules.lock().unwrap().remove(schedule_id);
        let Some(schedule) = removed else {
            return Err(BillingError::ProviderRejected(format!(
                "no such schedule: {}",
                schedule_id
            )));
        };

        if let Some(subscription) = self
            .subscriptions
            .lock()
            .unwrap()
            .get_mut(&schedule.subscription_id)
        {
            subscription.schedule_ref = None;
            if self.clear_trial_end_on_release.load(Ordering::SeqCst) {
                subscription.trial_end = None;
            }
        }

        Ok(())
    }
}

/// In-memory customer directory.
#[derive(Default)]
pub struct InMemoryDirectory {
    refs: Mutex<HashMap<Uuid, String>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a fresh product customer to a platform customer ref.
    pub fn bind(&self, billing_ref: &str) -> Uuid {
        let customer_id = Uuid::new_v4();
        self.refs
            .lock()
            .unwrap()
            .insert(customer_id, billing_ref.to_string());
        customer_id
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryDirectory {
    async fn billing_ref(&self, customer_id: Uuid) -> BillingResult<Option<String>> {
        Ok(self.refs.lock().unwrap().get(&customer_id).cloned())
    }

    async fn set_billing_ref(&self, customer_id: Uuid, billing_ref: &str) -> BillingResult<()> {
        self.refs
            .lock()
            .unwrap()
            .insert(customer_id, billing_ref.to_string());
        Ok(())
    }
}
