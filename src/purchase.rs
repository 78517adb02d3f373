// src/purchase.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Face values a certificate can carry, in cents.
pub const DENOMINATIONS: [i64; 5] = [2_500, 5_000, 10_000, 25_000, 50_000];

pub const MAX_PURCHASE_QUANTITY: i64 = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Pending,
    Paid,
    Cancelled,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Purchase {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub denomination_cents: i64,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_cents: i64,
    pub status: PurchaseStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

pub fn validate_denomination(cents: i64) -> Result<i64> {
    if DENOMINATIONS.contains(&cents) {
        Ok(cents)
    } else {
        Err(Error::invalid(format!(
            "unsupported denomination {} (allowed: {:?})",
            cents, DENOMINATIONS
        )))
    }
}

impl Purchase {
    pub fn quote(
        merchant_id: Uuid,
        denomination_cents: i64,
        quantity: i64,
        price_bps: i64,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        validate_denomination(denomination_cents)?;
        if !(1..=MAX_PURCHASE_QUANTITY).contains(&quantity) {
            return Err(Error::invalid(format!(
                "quantity must be between 1 and {}",
                MAX_PURCHASE_QUANTITY
            )));
        }

        let unit_price_cents = denomination_cents * price_bps / 10_000;

        Ok(Self {
            id: Uuid::new_v4(),
            merchant_id,
            denomination_cents,
            quantity,
            unit_price_cents,
            total_cents: unit_price_cents * quantity,
            status: PurchaseStatus::Pending,
            created_at: now,
            paid_at: None,
        })
    }
}
