// src/certificate.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::Result,
    lifecycle::{transition, CertificateEvent, CertificateStatus},
    month::Month,
};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Certificate {
    pub id: Uuid,
    pub code: String,
    pub merchant_id: Uuid,
    pub purchase_id: Uuid,
    pub denomination_cents: i64,
    pub status: CertificateStatus,
    // set on issue
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    // set on claim / register
    pub member_id: Option<Uuid>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub grocery_store_id: Option<Uuid>,
    pub registered_at: Option<DateTime<Utc>>,
    pub registered_month: Option<Month>,
    // redemption progress
    pub qualified_months: i64,
    pub rewarded_cents: i64,
    pub completed_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Certificate {
    pub fn new(merchant_id: Uuid, purchase_id: Uuid, denomination_cents: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: generate_code(),
            merchant_id,
            purchase_id,
            denomination_cents,
            status: CertificateStatus::Available,
            customer_name: None,
            customer_email: None,
            issued_at: None,
            member_id: None,
            claimed_at: None,
            grocery_store_id: None,
            registered_at: None,
            registered_month: None,
            qualified_months: 0,
            rewarded_cents: 0,
            completed_at: None,
            expired_at: None,
            created_at: now,
        }
    }

    pub fn apply(&mut self, event: CertificateEvent) -> Result<()> {
        self.status = transition(self.status, event)?;
        Ok(())
    }

    /// Number of monthly rewards it takes to pay out the face value.
    pub fn months_total(&self, monthly_reward_cents: i64) -> i64 {
        if monthly_reward_cents <= 0 {
            return 0;
        }
        (self.denomination_cents + monthly_reward_cents - 1) / monthly_reward_cents
    }

    pub fn is_fully_qualified(&self, monthly_reward_cents: i64) -> bool {
        self.qualified_months >= self.months_total(monthly_reward_cents)
    }

    pub fn is_owned_by(&self, member_id: Uuid) -> bool {
        self.member_id == Some(member_id)
    }
}

/// Claim codes look like `GRC-1A2B-3C4D-5E6F`.
pub fn generate_code() -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("GRC-{}-{}-{}", &hex[0..4], &hex[4..8], &hex[8..12])
}

pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// What anyone holding a claim code may see.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CertificateLookup {
    pub code: String,
    pub status: CertificateStatus,
    pub denomination_cents: i64,
    pub merchant_name: String,
    pub merchant_slug: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_shape() {
        let code = generate_code();
        assert_eq!(code.len(), 18);
        assert!(code.starts_with("GRC-"));
        assert_eq!(normalize_code(&code.to_lowercase()), code);
    }

    #[test]
    fn test_months_total_rounds_up() {
        let mut cert = Certificate::new(Uuid::new_v4(), Uuid::new_v4(), 10_000, Utc::now());
        assert_eq!(cert.months_total(2_500), 4);
        cert.denomination_cents = 5_000;
        assert_eq!(cert.months_total(3_000), 2);
        assert_eq!(cert.months_total(0), 0);
    }

    #[test]
    fn test_apply_rejects_invalid_event() {
        let mut cert = Certificate::new(Uuid::new_v4(), Uuid::new_v4(), 2_500, Utc::now());
        assert!(cert.apply(CertificateEvent::Claim).is_err());
        assert_eq!(cert.status, CertificateStatus::Available);
        cert.apply(CertificateEvent::Issue).unwrap();
        assert_eq!(cert.status, CertificateStatus::Issued);
    }
}
