//! Plan/interval price catalog
//!
//! Static, ordered enumeration of plan tiers and billing intervals with the
//! price-identifier lookup table. Reverse lookup backs the price-mismatch
//! fallback in the resolver, so construction rejects duplicate price ids —
//! two plan/interval pairs sharing a price would make reverse inference
//! ambiguous.

use std::collections::HashMap;

use formforge_shared::{BillingInterval, PlanTier};

use crate::client::PriceIds;
use crate::error::{BillingError, BillingResult};

/// Immutable lookup table between plan/interval pairs and price identifiers.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    prices: HashMap<(PlanTier, BillingInterval), String>,
    by_price: HashMap<String, (PlanTier, BillingInterval)>,
}

impl PlanCatalog {
    pub fn new(price_ids: &PriceIds) -> BillingResult<Self> {
        let entries = [
            (PlanTier::Basic, BillingInterval::Monthly, &price_ids.basic_monthly),
            (PlanTier::Basic, BillingInterval::Annual, &price_ids.basic_annual),
            (PlanTier::Pro, BillingInterval::Monthly, &price_ids.pro_monthly),
            (PlanTier::Pro, BillingInterval::Annual, &price_ids.pro_annual),
            (
                PlanTier::Enterprise,
                BillingInterval::Monthly,
                &price_ids.enterprise_monthly,
            ),
            (
                PlanTier::Enterprise,
                BillingInterval::Annual,
                &price_ids.enterprise_annual,
            ),
        ];

        let mut prices = HashMap::new();
        let mut by_price = HashMap::new();
        for (plan, interval, price_id) in entries {
            if price_id.is_empty() {
                return Err(BillingError::Config(format!(
                    "missing price id for {}/{}",
                    plan, interval
                )));
            }
            if let Some((other_plan, other_interval)) =
                by_price.insert(price_id.clone(), (plan, interval))
            {
                return Err(BillingError::Config(format!(
                    "price id {} configured for both {}/{} and {}/{}",
                    price_id, other_plan, other_interval, plan, interval
                )));
            }
            prices.insert((plan, interval), price_id.clone());
        }

        Ok(Self { prices, by_price })
    }

    /// Price identifier for a plan/interval pair.
    pub fn price_id(&self, plan: PlanTier, interval: BillingInterval) -> BillingResult<&str> {
        self.prices
            .get(&(plan, interval))
            .map(String::as_str)
            .ok_or_else(|| BillingError::UnknownPlanOrInterval(format!("{}/{}", plan, interval)))
    }

    /// Reverse lookup: which plan/interval a live price identifier represents.
    pub fn lookup(&self, price_id: &str) -> Option<(PlanTier, BillingInterval)> {
        self.by_price.get(price_id).copied()
    }
}

#[cfg(test)]
pub(crate) fn test_price_ids() -> PriceIds {
    PriceIds {
        basic_monthly: "price_basic_m".to_string(),
        basic_annual: "price_basic_a".to_string(),
        pro_monthly: "price_pro_m".to_string(),
        pro_annual: "price_pro_a".to_string(),
        enterprise_monthly: "price_ent_m".to_string(),
        enterprise_annual: "price_ent_a".to_string(),
    }
}
