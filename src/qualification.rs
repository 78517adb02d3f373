// src/qualification.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    month::Month,
    receipt::{Receipt, ReceiptStatus},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualificationStatus {
    InProgress,
    ReceiptsComplete,
    Qualified,
    Missed,
}

impl QualificationStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, QualificationStatus::Qualified | QualificationStatus::Missed)
    }
}

/// Progress of one certificate toward its reward for one month.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MonthlyQualification {
    pub id: Uuid,
    pub certificate_id: Uuid,
    pub member_id: Uuid,
    pub month: Month,
    pub approved_total_cents: i64,
    pub approved_receipts: i64,
    pub survey_completed: bool,
    pub status: QualificationStatus,
    pub qualified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MonthlyQualification {
    pub fn open(certificate_id: Uuid, member_id: Uuid, month: Month, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            certificate_id,
            member_id,
            month,
            approved_total_cents: 0,
            approved_receipts: 0,
            survey_completed: false,
            status: QualificationStatus::InProgress,
            qualified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces the running totals with the approved receipts of this month.
    /// Returns true when this call moved the record into `Qualified`.
    pub fn tally(&mut self, receipts: &[Receipt], threshold_cents: i64, now: DateTime<Utc>) -> bool {
        let approved = receipts.iter().filter(|r| {
            r.certificate_id == self.certificate_id
                && r.month == self.month
                && r.status == ReceiptStatus::Approved
        });

        let (count, total) = approved.fold((0, 0), |(n, sum), r| (n + 1, sum + r.total_cents));
        self.approved_receipts = count;
        self.approved_total_cents = total;

        self.evaluate(threshold_cents, now)
    }

    pub fn complete_survey(&mut self, threshold_cents: i64, now: DateTime<Utc>) -> bool {
        self.survey_completed = true;
        self.evaluate(threshold_cents, now)
    }

    pub fn miss(&mut self, now: DateTime<Utc>) -> bool {
        if self.status.is_final() {
            return false;
        }
        self.status = QualificationStatus::Missed;
        self.updated_at = now;
        true
    }

    fn evaluate(&mut self, threshold_cents: i64, now: DateTime<Utc>) -> bool {
        self.updated_at = now;

        if self.status.is_final() {
            return false;
        }

        let receipts_done = self.approved_total_cents >= threshold_cents;
        self.status = match (receipts_done, self.survey_completed) {
            (true, true) => QualificationStatus::Qualified,
            (true, false) => QualificationStatus::ReceiptsComplete,
            _ => QualificationStatus::InProgress,
        };

        if self.status == QualificationStatus::Qualified {
            self.qualified_at = Some(now);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const THRESHOLD: i64 = 10_000;

    fn receipt(q: &MonthlyQualification, total: i64, status: ReceiptStatus) -> Receipt {
        let date = NaiveDate::from_ymd_opt(q.month.year(), q.month.month(), 10).unwrap();
        Receipt {
            id: Uuid::new_v4(),
            certificate_id: q.certificate_id,
            member_id: q.member_id,
            store_name: None,
            total_cents: total,
            receipt_date: date,
            month: q.month,
            image_url: None,
            status,
            rejection_reason: None,
            ocr: None,
            submitted_at: Utc::now(),
            reviewed_at: None,
            reviewed_by: None,
        }
    }

    fn open() -> MonthlyQualification {
        MonthlyQualification::open(Uuid::new_v4(), Uuid::new_v4(), "2026-05".parse().unwrap(), Utc::now())
    }

    #[test]
    fn test_receipts_then_survey() {
        let mut q = open();
        let receipts = vec![
            receipt(&q, 6_000, ReceiptStatus::Approved),
            receipt(&q, 4_000, ReceiptStatus::Approved),
        ];

        assert!(!q.tally(&receipts, THRESHOLD, Utc::now()));
        assert_eq!(q.status, QualificationStatus::ReceiptsComplete);
        assert_eq!(q.approved_receipts, 2);
        assert_eq!(q.approved_total_cents, 10_000);

        assert!(q.complete_survey(THRESHOLD, Utc::now()));
        assert_eq!(q.status, QualificationStatus::Qualified);
        assert!(q.qualified_at.is_some());
    }

    #[test]
    fn test_survey_then_receipts() {
        let mut q = open();
        assert!(!q.complete_survey(THRESHOLD, Utc::now()));
        assert_eq!(q.status, QualificationStatus::InProgress);

        let receipts = vec![receipt(&q, 12_000, ReceiptStatus::Approved)];
        assert!(q.tally(&receipts, THRESHOLD, Utc::now()));
        assert_eq!(q.status, QualificationStatus::Qualified);
    }

    #[test]
    fn test_only_approved_receipts_of_this_month_count() {
        let mut q = open();
        let mut other_month = receipt(&q, 50_000, ReceiptStatus::Approved);
        other_month.month = q.month.next();
        let mut other_cert = receipt(&q, 50_000, ReceiptStatus::Approved);
        other_cert.certificate_id = Uuid::new_v4();

        let receipts = vec![
            receipt(&q, 9_000, ReceiptStatus::Approved),
            receipt(&q, 9_000, ReceiptStatus::Pending),
            receipt(&q, 9_000, ReceiptStatus::Rejected),
            other_month,
            other_cert,
        ];

        q.tally(&receipts, THRESHOLD, Utc::now());
        assert_eq!(q.approved_total_cents, 9_000);
        assert_eq!(q.status, QualificationStatus::InProgress);
    }

    #[test]
    fn test_qualified_fires_once() {
        let mut q = open();
        q.complete_survey(THRESHOLD, Utc::now());
        let receipts = vec![receipt(&q, 10_000, ReceiptStatus::Approved)];
        assert!(q.tally(&receipts, THRESHOLD, Utc::now()));
        assert!(!q.tally(&receipts, THRESHOLD, Utc::now()));
        assert!(!q.complete_survey(THRESHOLD, Utc::now()));
    }

    #[test]
    fn test_missed_is_final() {
        let mut q = open();
        assert!(q.miss(Utc::now()));
        assert!(!q.miss(Utc::now()));
        q.complete_survey(THRESHOLD, Utc::now());
        let receipts = vec![receipt(&q, 20_000, ReceiptStatus::Approved)];
        assert!(!q.tally(&receipts, THRESHOLD, Utc::now()));
        assert_eq!(q.status, QualificationStatus::Missed);
    }
}
