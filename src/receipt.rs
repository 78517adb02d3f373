// src/receipt.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{month::Month, ocr::OcrResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Receipt {
    pub id: Uuid,
    pub certificate_id: Uuid,
    pub member_id: Uuid,
    pub store_name: Option<String>,
    pub total_cents: i64,
    pub receipt_date: NaiveDate,
    pub month: Month,
    pub image_url: Option<String>,
    pub status: ReceiptStatus,
    pub rejection_reason: Option<String>,
    pub ocr: Option<OcrResult>,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewReceipt {
    pub certificate_id: Uuid,
    pub receipt_date: NaiveDate,
    pub total_cents: Option<i64>,
    pub store_name: Option<String>,
    pub image_url: Option<String>,
}

impl Receipt {
    /// Same certificate, date and total as a receipt that still counts.
    pub fn duplicates(&self, certificate_id: Uuid, date: NaiveDate, total_cents: i64) -> bool {
        self.certificate_id == certificate_id
            && self.receipt_date == date
            && self.total_cents == total_cents
            && self.status != ReceiptStatus::Rejected
    }
}
