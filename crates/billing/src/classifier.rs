//! Change classification
//!
//! Given the resolved effective state and a requested target, pick the
//! lifecycle branch. Trial status overrides direction: every real change
//! during trial is immediate-but-unbilled.

use formforge_shared::{BillingInterval, PlanTier};

use crate::resolver::EffectiveState;

/// Value direction of a plan/interval change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeDirection {
    Upgrade,
    Downgrade,
    Unchanged,
}

/// Compare two plan/interval pairs.
///
/// Precedence: when the plan tier changes, the tier comparison decides the
/// direction. The fixed interval order (monthly < annual) applies only when
/// the plan is unchanged — annual commitment outranks monthly at every tier.
pub fn direction(
    from: (PlanTier, BillingInterval),
    to: (PlanTier, BillingInterval),
) -> ChangeDirection {
    if to.0 != from.0 {
        if to.0.rank() > from.0.rank() {
            ChangeDirection::Upgrade
        } else {
            ChangeDirection::Downgrade
        }
    } else if to.1 != from.1 {
        if to.1.rank() > from.1.rank() {
            ChangeDirection::Upgrade
        } else {
            ChangeDirection::Downgrade
        }
    } else {
        ChangeDirection::Unchanged
    }
}

/// Lifecycle branch for a change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Trial is active: apply immediately, bill nothing.
    TrialChange,
    /// Apply immediately, invoice the prorated difference now.
    ImmediateUpgrade,
    /// Keep the current price until period end, then switch.
    DeferredDowngrade,
    /// Target equals the current effective state but a change is pending:
    /// drop the pending change.
    CancelPendingChange,
    /// Nothing to do.
    NoOp,
}

/// Classify a change request against the resolved state.
///
/// Absent target fields mean "unchanged".
pub fn classify(
    state: &EffectiveState,
    target_plan: Option<PlanTier>,
    target_interval: Option<BillingInterval>,
) -> ChangeKind {
    let target = (
        target_plan.unwrap_or(state.plan),
        target_interval.unwrap_or(state.interval),
    );

    match direction((state.plan, state.interval), target) {
        ChangeDirection::Unchanged => {
            if state.pending.is_some() {
                ChangeKind::CancelPendingChange
            } else {
                ChangeKind::NoOp
            }
        }
        _ if state.is_trial => ChangeKind::TrialChange,
        ChangeDirection::Upgrade => ChangeKind::ImmediateUpgrade,
        ChangeDirection::Downgrade => ChangeKind::DeferredDowngrade,
    }
}
