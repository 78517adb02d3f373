// src/fulfillment.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::month::Month;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Pending,
    Sent,
    Failed,
}

/// A gift card owed to a member for a qualified month.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Fulfillment {
    pub id: Uuid,
    pub qualification_id: Uuid,
    pub certificate_id: Uuid,
    pub member_id: Uuid,
    pub month: Month,
    pub amount_cents: i64,
    pub status: FulfillmentStatus,
    pub gift_card_code: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Reward for the next qualified month, capped by what is left of the face value.
pub fn reward_amount(denomination_cents: i64, already_scheduled_cents: i64, monthly_reward_cents: i64) -> i64 {
    (denomination_cents - already_scheduled_cents)
        .min(monthly_reward_cents)
        .max(0)
}
