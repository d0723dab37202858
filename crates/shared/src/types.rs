//! Core subscription types shared across crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when parsing a plan tier or billing interval fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized value: {0}")]
pub struct ParseTierError(pub String);

/// Subscription plan tier.
///
/// Tiers form a strict upgrade/downgrade order: `basic < pro < enterprise`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Basic,
    Pro,
    Enterprise,
}

impl PlanTier {
    /// Position in the upgrade order. Higher rank = higher tier.
    pub fn rank(&self) -> u8 {
        match self {
            PlanTier::Basic => 0,
            PlanTier::Pro => 1,
            PlanTier::Enterprise => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Basic => "basic",
            PlanTier::Pro => "pro",
            PlanTier::Enterprise => "enterprise",
        }
    }

    /// All tiers in ascending order.
    pub fn all() -> [PlanTier; 3] {
        [PlanTier::Basic, PlanTier::Pro, PlanTier::Enterprise]
    }

    /// Maximum number of forms the tier may create.
    pub fn max_forms(&self) -> u32 {
        match self {
            PlanTier::Basic => 20,
            PlanTier::Pro => 100,
            PlanTier::Enterprise => u32::MAX,
        }
    }

    /// Submission captures included per month.
    pub fn monthly_submissions(&self) -> u64 {
        match self {
            PlanTier::Basic => 1_000,
            PlanTier::Pro => 25_000,
            PlanTier::Enterprise => u64::MAX,
        }
    }

    /// Whether HIPAA-flagged forms (envelope-encrypted payloads) are available.
    pub fn hipaa_available(&self) -> bool {
        matches!(self, PlanTier::Enterprise)
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = ParseTierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(PlanTier::Basic),
            "pro" => Ok(PlanTier::Pro),
            "enterprise" => Ok(PlanTier::Enterprise),
            other => Err(ParseTierError(other.to_string())),
        }
    }
}

/// Billing cadence for a subscription.
///
/// The value order is fixed and independent of plan tier: annual commitment
/// always outranks monthly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Monthly,
    Annual,
}

impl BillingInterval {
    /// Position in the value order. Higher rank = more commitment.
    pub fn rank(&self) -> u8 {
        match self {
            BillingInterval::Monthly => 0,
            BillingInterval::Annual => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Monthly => "monthly",
            BillingInterval::Annual => "annual",
        }
    }

    pub fn all() -> [BillingInterval; 2] {
        [BillingInterval::Monthly, BillingInterval::Annual]
    }
}

impl fmt::Display for BillingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BillingInterval {
    type Err = ParseTierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "monthly" | "month" => Ok(BillingInterval::Monthly),
            "annual" | "year" | "yearly" => Ok(BillingInterval::Annual),
            other => Err(ParseTierError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_order_is_strict() {
        assert!(PlanTier::Basic.rank() < PlanTier::Pro.rank());
        assert!(PlanTier::Pro.rank() < PlanTier::Enterprise.rank());
    }

    #[test]
    fn test_interval_order_annual_outranks_monthly() {
        assert!(BillingInterval::Monthly.rank() < BillingInterval::Annual.rank());
    }

    #[test]
    fn test_tier_round_trips_through_str() {
        for tier in PlanTier::all() {
            assert_eq!(tier.as_str().parse::<PlanTier>().unwrap(), tier);
        }
        assert!("platinum".parse::<PlanTier>().is_err());
    }

    #[test]
    fn test_interval_accepts_stripe_style_aliases() {
        assert_eq!("month".parse::<BillingInterval>().unwrap(), BillingInterval::Monthly);
        assert_eq!("year".parse::<BillingInterval>().unwrap(), BillingInterval::Annual);
        assert!("weekly".parse::<BillingInterval>().is_err());
    }

    #[test]
    fn test_hipaa_is_enterprise_only() {
        assert!(!PlanTier::Basic.hipaa_available());
        assert!(!PlanTier::Pro.hipaa_available());
        assert!(PlanTier::Enterprise.hipaa_available());
    }

    #[test]
    fn test_entitlement_limits_grow_with_tier() {
        assert!(PlanTier::Basic.max_forms() < PlanTier::Pro.max_forms());
        assert!(PlanTier::Basic.monthly_submissions() < PlanTier::Pro.monthly_submissions());
        assert_eq!(PlanTier::Enterprise.max_forms(), u32::MAX);
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&PlanTier::Pro).unwrap(), "\"pro\"");
        assert_eq!(
            serde_json::from_str::<BillingInterval>("\"annual\"").unwrap(),
            BillingInterval::Annual
        );
    }
}
