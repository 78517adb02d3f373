// src/services/moderation.rs

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use super::{format_cents, Platform};
use crate::{
    error::{Error, Result},
    fulfillment::{Fulfillment, FulfillmentStatus},
    lifecycle::{CertificateEvent, CertificateStatus},
    mailer::OutgoingEmail,
    month::Month,
    purchase::PurchaseStatus,
    qualification::MonthlyQualification,
    receipt::{Receipt, ReceiptStatus},
    store::{CertificateFilter, QualificationFilter, ReceiptFilter},
    survey::{validate_questions, Survey, SurveyQuestion},
};

#[derive(Clone, Debug, Serialize)]
pub struct AdminDashboard {
    pub pending_receipts: usize,
    pub pending_purchases: usize,
    pub pending_fulfillments: usize,
    pub certificates: BTreeMap<CertificateStatus, usize>,
}

impl Platform {
    pub async fn list_receipts(&self, status: Option<ReceiptStatus>) -> Result<Vec<Receipt>> {
        self.store()
            .list_receipts(&ReceiptFilter {
                status,
                ..Default::default()
            })
            .await
    }

    async fn pending_receipt(&self, id: Uuid) -> Result<Receipt> {
        let receipt = self
            .store()
            .get_receipt(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("receipt {}", id)))?;

        if receipt.status != ReceiptStatus::Pending {
            return Err(Error::conflict("receipt has already been reviewed"));
        }
        Ok(receipt)
    }

    /// Approves a receipt and re-tallies its month.
    pub async fn approve_receipt(&self, receipt_id: Uuid, admin_id: Uuid) -> Result<MonthlyQualification> {
        let mut receipt = self.pending_receipt(receipt_id).await?;

        receipt.status = ReceiptStatus::Approved;
        receipt.reviewed_at = Some(self.now());
        receipt.reviewed_by = Some(admin_id);
        self.store().save_receipt(&receipt).await?;

        tracing::info!(receipt_id = %receipt.id, admin_id = %admin_id, "receipt approved");

        self.refresh_qualification(receipt.certificate_id, receipt.month).await
    }

    pub async fn reject_receipt(&self, receipt_id: Uuid, admin_id: Uuid, reason: &str) -> Result<Receipt> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(Error::invalid("a rejection reason is required"));
        }

        let mut receipt = self.pending_receipt(receipt_id).await?;
        receipt.status = ReceiptStatus::Rejected;
        receipt.rejection_reason = Some(reason.to_string());
        receipt.reviewed_at = Some(self.now());
        receipt.reviewed_by = Some(admin_id);
        self.store().save_receipt(&receipt).await?;

        tracing::info!(receipt_id = %receipt.id, admin_id = %admin_id, reason, "receipt rejected");

        if let Some(email) = self.member_email(receipt.member_id).await? {
            self.notify(OutgoingEmail::new(
                email,
                "Your receipt was not accepted",
                format!(
                    "Your {} receipt from {} was rejected: {}\n\nYou can submit a corrected receipt any time this month.\n",
                    format_cents(receipt.total_cents),
                    receipt.receipt_date,
                    reason
                ),
            ))
            .await;
        }

        Ok(receipt)
    }

    pub async fn upsert_survey(&self, month: Month, title: &str, questions: Vec<SurveyQuestion>) -> Result<Survey> {
        validate_questions(title, &questions)?;

        let now = self.now();
        let existing = self.store().find_survey(month).await?;
        let survey = Survey {
            id: existing.as_ref().map(|s| s.id).unwrap_or_else(Uuid::new_v4),
            month,
            title: title.trim().to_string(),
            questions,
            created_at: existing.as_ref().map(|s| s.created_at).unwrap_or(now),
            updated_at: now,
        };
        self.store().save_survey(&survey).await?;

        tracing::info!(survey_id = %survey.id, month = %month, "survey saved");
        Ok(survey)
    }

    pub async fn list_fulfillments(&self, status: Option<FulfillmentStatus>) -> Result<Vec<Fulfillment>> {
        self.store().list_fulfillments(status, None).await
    }

    async fn fulfillment(&self, id: Uuid) -> Result<Fulfillment> {
        self.store()
            .get_fulfillment(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("fulfillment {}", id)))
    }

    /// Records a delivered gift card and completes the certificate once fully paid out.
    pub async fn send_fulfillment(&self, fulfillment_id: Uuid, gift_card_code: &str) -> Result<Fulfillment> {
        let gift_card_code = gift_card_code.trim();
        if gift_card_code.is_empty() {
            return Err(Error::invalid("gift card code is required"));
        }

        let mut fulfillment = self.fulfillment(fulfillment_id).await?;
        if fulfillment.status == FulfillmentStatus::Sent {
            return Err(Error::conflict("gift card was already sent"));
        }

        let now = self.now();
        fulfillment.status = FulfillmentStatus::Sent;
        fulfillment.gift_card_code = Some(gift_card_code.to_string());
        fulfillment.sent_at = Some(now);
        self.store().save_fulfillment(&fulfillment).await?;

        let mut certificate = self.certificate(fulfillment.certificate_id).await?;
        certificate.rewarded_cents += fulfillment.amount_cents;
        if certificate.rewarded_cents >= certificate.denomination_cents
            && certificate.status == CertificateStatus::Registered
        {
            certificate.apply(CertificateEvent::Complete)?;
            certificate.completed_at = Some(now);
            tracing::info!(certificate_id = %certificate.id, "certificate completed");
        }
        self.store().save_certificate(&certificate).await?;

        tracing::info!(
            fulfillment_id = %fulfillment.id,
            certificate_id = %certificate.id,
            amount_cents = fulfillment.amount_cents,
            "gift card sent"
        );

        if let Some(email) = self.member_email(fulfillment.member_id).await? {
            let mut body = format!(
                "Your {} gift card for {} is ready.\n\nCode: {}\n",
                format_cents(fulfillment.amount_cents),
                fulfillment.month,
                gift_card_code
            );
            if certificate.status == CertificateStatus::Completed {
                body.push_str("\nThat was the final reward on this certificate. Thank you!\n");
            }
            self.notify(OutgoingEmail::new(email, "Your grocery rebate gift card", body))
                .await;
        }

        Ok(fulfillment)
    }

    pub async fn fail_fulfillment(&self, fulfillment_id: Uuid, note: &str) -> Result<Fulfillment> {
        let mut fulfillment = self.fulfillment(fulfillment_id).await?;
        if fulfillment.status != FulfillmentStatus::Pending {
            return Err(Error::conflict("only pending fulfillments can fail"));
        }

        fulfillment.status = FulfillmentStatus::Failed;
        fulfillment.note = Some(note.trim().to_string()).filter(|n| !n.is_empty());
        self.store().save_fulfillment(&fulfillment).await?;

        tracing::warn!(fulfillment_id = %fulfillment.id, note, "fulfillment failed");
        Ok(fulfillment)
    }

    /// Marks every unqualified record of a past month as missed.
    pub async fn close_month(&self, month: Month) -> Result<usize> {
        if month >= Month::of(self.now()) {
            return Err(Error::invalid(format!("{} has not ended yet", month)));
        }

        let pending = self
            .store()
            .list_receipts(&ReceiptFilter {
                month: Some(month),
                status: Some(ReceiptStatus::Pending),
                ..Default::default()
            })
            .await?;
        if !pending.is_empty() {
            return Err(Error::conflict(format!(
                "{} receipts for {} still need review",
                pending.len(),
                month
            )));
        }

        let now = self.now();
        let mut missed = 0;
        for mut qualification in self
            .store()
            .list_qualifications(&QualificationFilter {
                month: Some(month),
                ..Default::default()
            })
            .await?
        {
            if qualification.miss(now) {
                self.store().save_qualification(&qualification).await?;
                missed += 1;
            }
        }

        tracing::info!(month = %month, missed, "month closed");
        Ok(missed)
    }

    pub async fn admin_dashboard(&self) -> Result<AdminDashboard> {
        let pending_receipts = self.list_receipts(Some(ReceiptStatus::Pending)).await?.len();
        let pending_purchases = self
            .store()
            .list_purchases(None, Some(PurchaseStatus::Pending))
            .await?
            .len();
        let pending_fulfillments = self
            .store()
            .list_fulfillments(Some(FulfillmentStatus::Pending), None)
            .await?
            .len();

        let mut certificates = BTreeMap::new();
        for c in self.store().list_certificates(&CertificateFilter::default()).await? {
            *certificates.entry(c.status).or_insert(0) += 1;
        }

        Ok(AdminDashboard {
            pending_receipts,
            pending_purchases,
            pending_fulfillments,
            certificates,
        })
    }
}
