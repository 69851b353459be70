use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscription plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanName {
    Starter,
    Professional,
    Enterprise,
}

impl PlanName {
    /// The column value for this plan.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanName::Starter => "starter",
            PlanName::Professional => "professional",
            PlanName::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for PlanName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starter" => Ok(PlanName::Starter),
            "professional" => Ok(PlanName::Professional),
            "enterprise" => Ok(PlanName::Enterprise),
            other => Err(format!("unknown plan: {}", other)),
        }
    }
}

/// Billing status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
}

impl SubscriptionStatus {
    /// The column value for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "canceled" | "cancelled" => Ok(SubscriptionStatus::Canceled),
            other => Err(format!("unknown subscription status: {}", other)),
        }
    }
}

/// A store's subscription record.
#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    /// The store this subscription meters.
    pub store_id: Uuid,
    /// The plan currently in effect.
    pub plan_name: PlanName,
    /// Messages allowed in the current period.
    pub message_limit: i64,
    /// Messages consumed in the current period. Only grows until rollover.
    pub messages_used: i64,
    /// Admitted requests that have not committed or released yet.
    pub messages_reserved: i64,
    /// Billing status.
    pub status: SubscriptionStatus,
    /// End of the trial window, if any.
    pub trial_ends_at: Option<DateTime<Utc>>,
    /// End of the current billing period.
    pub current_period_end: DateTime<Utc>,
}

impl Subscription {
    /// `status == active OR trialEndsAt > now`.
    pub fn is_active_or_in_trial(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active
            || self.trial_ends_at.is_some_and(|trial_ends_at| trial_ends_at > now)
    }

    /// Messages still available, counting in-flight reservations as spent.
    pub fn remaining(&self) -> i64 {
        self.message_limit - self.messages_used - self.messages_reserved
    }
}

/// Outcome of an attempt to reserve one message slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// The store has no subscription row yet.
    Missing,
    /// Not admitted. `remaining` is the value seen at check time.
    Rejected { remaining: i64 },
    /// Admitted. `remaining` is the value seen before this reservation.
    Reserved { remaining: i64 },
}
