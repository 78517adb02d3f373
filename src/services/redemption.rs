// src/services/redemption.rs
//
// Member side of the certificate: claim, register, submit receipts and
// answer the monthly survey. Also home to the qualification bookkeeping that
// moderation shares.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use super::{format_cents, Platform};
use crate::{
    certificate::{normalize_code, Certificate},
    error::{Error, Result},
    fulfillment::{reward_amount, Fulfillment, FulfillmentStatus},
    grocery::GroceryStore,
    lifecycle::{transition, CertificateEvent, CertificateStatus},
    mailer::OutgoingEmail,
    month::Month,
    ocr::OcrResult,
    qualification::{MonthlyQualification, QualificationStatus},
    receipt::{NewReceipt, Receipt, ReceiptStatus},
    store::{CertificateFilter, QualificationFilter, ReceiptFilter},
    survey::{Survey, SurveyResponse},
};

#[derive(Clone, Debug, Serialize)]
pub struct CurrentSurvey {
    pub month: Month,
    pub survey: Option<Survey>,
    pub answered: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct MemberCertificate {
    pub certificate: Certificate,
    pub grocery_store: Option<GroceryStore>,
    pub months_total: i64,
    pub qualifications: Vec<MonthlyQualification>,
    pub pending_receipts: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct MemberDashboard {
    pub certificates: Vec<MemberCertificate>,
}

impl Platform {
    /// Certificate owned by the member; anyone else's is reported missing.
    async fn member_certificate(&self, member_id: Uuid, certificate_id: Uuid) -> Result<Certificate> {
        let certificate = self.certificate(certificate_id).await?;
        if !certificate.is_owned_by(member_id) {
            return Err(Error::not_found(format!("certificate {}", certificate_id)));
        }
        Ok(certificate)
    }

    async fn registered_certificate(&self, member_id: Uuid, certificate_id: Uuid) -> Result<Certificate> {
        let certificate = self.member_certificate(member_id, certificate_id).await?;
        if certificate.status != CertificateStatus::Registered {
            return Err(Error::conflict(format!(
                "certificate is {}, not registered",
                certificate.status
            )));
        }
        Ok(certificate)
    }

    pub async fn claim_certificate(&self, member_id: Uuid, code: &str) -> Result<Certificate> {
        let code = normalize_code(code);
        let found = self
            .store()
            .find_certificate_by_code(&code)
            .await?
            .filter(|c| c.status != CertificateStatus::Available)
            .ok_or_else(|| Error::not_found(format!("certificate {}", code)))?;

        // expired or completed certificates report the lifecycle error
        if found.member_id.is_some() && !found.status.is_terminal() {
            return Err(Error::conflict("certificate has already been claimed"));
        }
        transition(found.status, CertificateEvent::Claim)?;

        let certificate = self
            .store()
            .claim_certificate(found.id, member_id, self.now())
            .await?
            .ok_or_else(|| Error::conflict("certificate has already been claimed"))?;

        tracing::info!(certificate_id = %certificate.id, member_id = %member_id, "certificate claimed");
        Ok(certificate)
    }

    pub async fn register_certificate(
        &self,
        member_id: Uuid,
        certificate_id: Uuid,
        grocery_store_id: Uuid,
    ) -> Result<Certificate> {
        let mut certificate = self.member_certificate(member_id, certificate_id).await?;
        let store = self
            .store()
            .get_grocery_store(grocery_store_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("grocery store {}", grocery_store_id)))?;

        certificate.apply(CertificateEvent::Register)?;

        let now = self.now();
        let month = Month::of(now);
        certificate.grocery_store_id = Some(store.id);
        certificate.registered_at = Some(now);
        certificate.registered_month = Some(month);
        self.store().save_certificate(&certificate).await?;

        self.open_qualification(&certificate, month).await?;

        tracing::info!(
            certificate_id = %certificate.id,
            member_id = %member_id,
            store = %store.name,
            month = %month,
            "certificate registered"
        );
        Ok(certificate)
    }

    pub(crate) async fn open_qualification(
        &self,
        certificate: &Certificate,
        month: Month,
    ) -> Result<MonthlyQualification> {
        if let Some(existing) = self.store().find_qualification(certificate.id, month).await? {
            return Ok(existing);
        }

        let member_id = certificate
            .member_id
            .ok_or_else(|| Error::conflict("certificate has no member"))?;
        let qualification = MonthlyQualification::open(certificate.id, member_id, month, self.now());
        self.store().save_qualification(&qualification).await?;

        tracing::debug!(certificate_id = %certificate.id, month = %month, "qualification opened");
        Ok(qualification)
    }

    /// Recounts approved receipts for the month and pays out if it just qualified.
    pub(crate) async fn refresh_qualification(&self, certificate_id: Uuid, month: Month) -> Result<MonthlyQualification> {
        let certificate = self.certificate(certificate_id).await?;
        let mut qualification = self.open_qualification(&certificate, month).await?;

        let receipts = self
            .store()
            .list_receipts(&ReceiptFilter {
                certificate_id: Some(certificate_id),
                month: Some(month),
                status: Some(ReceiptStatus::Approved),
                ..Default::default()
            })
            .await?;

        let now = self.now();
        let qualified = qualification.tally(&receipts, self.rules().monthly_threshold_cents, now);
        self.store().save_qualification(&qualification).await?;

        if qualified {
            self.on_qualified(certificate, &qualification).await?;
        }
        Ok(qualification)
    }

    async fn on_qualified(&self, mut certificate: Certificate, qualification: &MonthlyQualification) -> Result<()> {
        let rules = self.rules();

        let scheduled: i64 = self
            .store()
            .list_fulfillments(None, Some(certificate.id))
            .await?
            .iter()
            .map(|f| f.amount_cents)
            .sum();
        let amount = reward_amount(certificate.denomination_cents, scheduled, rules.monthly_reward_cents);

        certificate.qualified_months += 1;
        self.store().save_certificate(&certificate).await?;

        tracing::info!(
            certificate_id = %certificate.id,
            month = %qualification.month,
            qualified_months = certificate.qualified_months,
            "month qualified"
        );

        if amount == 0 {
            return Ok(());
        }

        let fulfillment = Fulfillment {
            id: Uuid::new_v4(),
            qualification_id: qualification.id,
            certificate_id: certificate.id,
            member_id: qualification.member_id,
            month: qualification.month,
            amount_cents: amount,
            status: FulfillmentStatus::Pending,
            gift_card_code: None,
            note: None,
            created_at: self.now(),
            sent_at: None,
        };
        self.store().save_fulfillment(&fulfillment).await?;

        if let Some(email) = self.member_email(qualification.member_id).await? {
            self.notify(OutgoingEmail::new(
                email,
                format!("You qualified for {}", qualification.month),
                format!(
                    "You met this month's requirements. A {} gift card is on its way.\n",
                    format_cents(amount)
                ),
            ))
            .await;
        }
        Ok(())
    }

    pub async fn submit_receipt(&self, member_id: Uuid, input: NewReceipt) -> Result<Receipt> {
        let certificate = self.registered_certificate(member_id, input.certificate_id).await?;
        let rules = self.rules();

        if certificate.is_fully_qualified(rules.monthly_reward_cents) {
            return Err(Error::conflict("certificate has already earned every monthly reward"));
        }

        let now = self.now();
        if input.receipt_date > now.date_naive() {
            return Err(Error::invalid("receipt date is in the future"));
        }
        let month = Month::from_date(input.receipt_date);
        if certificate.registered_month.is_some_and(|registered| month < registered) {
            return Err(Error::invalid("receipt predates the certificate registration"));
        }

        let ocr = self.scan_receipt(input.image_url.as_deref()).await;

        let total_cents = input
            .total_cents
            .or_else(|| ocr.as_ref().and_then(|o| o.total_cents))
            .ok_or_else(|| Error::invalid("receipt total is required"))?;
        if total_cents <= 0 {
            return Err(Error::invalid("receipt total must be positive"));
        }

        let qualification = self.open_qualification(&certificate, month).await?;
        if qualification.status.is_final() {
            return Err(Error::conflict(format!(
                "{} is already {}",
                month,
                match qualification.status {
                    QualificationStatus::Qualified => "qualified",
                    _ => "closed",
                }
            )));
        }

        let existing = self
            .store()
            .list_receipts(&ReceiptFilter {
                certificate_id: Some(certificate.id),
                ..Default::default()
            })
            .await?;
        if existing
            .iter()
            .any(|r| r.duplicates(certificate.id, input.receipt_date, total_cents))
        {
            return Err(Error::conflict("this receipt was already submitted"));
        }

        let store_name = match input.store_name.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
            Some(name) => Some(name),
            None => ocr.as_ref().and_then(|o| o.vendor.clone()),
        };

        let receipt = Receipt {
            id: Uuid::new_v4(),
            certificate_id: certificate.id,
            member_id,
            store_name,
            total_cents,
            receipt_date: input.receipt_date,
            month,
            image_url: input.image_url,
            status: ReceiptStatus::Pending,
            rejection_reason: None,
            ocr,
            submitted_at: now,
            reviewed_at: None,
            reviewed_by: None,
        };
        self.store().save_receipt(&receipt).await?;

        tracing::info!(
            receipt_id = %receipt.id,
            certificate_id = %certificate.id,
            month = %month,
            total_cents,
            "receipt submitted"
        );
        Ok(receipt)
    }

    async fn scan_receipt(&self, image_url: Option<&str>) -> Option<OcrResult> {
        let (scanner, url) = match (&self.scanner, image_url) {
            (Some(scanner), Some(url)) if !url.trim().is_empty() => (scanner, url),
            _ => return None,
        };

        match scanner.scan(url).await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!(error = %e, "receipt scan failed");
                None
            }
        }
    }

    pub async fn member_receipts(&self, member_id: Uuid) -> Result<Vec<Receipt>> {
        self.store()
            .list_receipts(&ReceiptFilter {
                member_id: Some(member_id),
                ..Default::default()
            })
            .await
    }

    pub async fn current_survey(&self, member_id: Uuid, certificate_id: Uuid) -> Result<CurrentSurvey> {
        let certificate = self.registered_certificate(member_id, certificate_id).await?;
        let month = Month::of(self.now());

        let survey = self.store().find_survey(month).await?;
        let answered = self
            .store()
            .find_survey_response(certificate.id, month)
            .await?
            .is_some();

        Ok(CurrentSurvey { month, survey, answered })
    }

    pub async fn submit_survey_response(
        &self,
        member_id: Uuid,
        certificate_id: Uuid,
        month: Month,
        answers: HashMap<String, String>,
    ) -> Result<MonthlyQualification> {
        let certificate = self.registered_certificate(member_id, certificate_id).await?;

        let now = self.now();
        if month > Month::of(now) {
            return Err(Error::invalid(format!("the {} survey is not open yet", month)));
        }
        if certificate.registered_month.is_some_and(|registered| month < registered) {
            return Err(Error::invalid("survey month predates the certificate registration"));
        }

        let survey = self
            .store()
            .find_survey(month)
            .await?
            .ok_or_else(|| Error::not_found(format!("survey for {}", month)))?;
        survey.check_answers(&answers)?;

        let mut qualification = self.open_qualification(&certificate, month).await?;
        if qualification.status == QualificationStatus::Missed {
            return Err(Error::conflict(format!("{} is already closed", month)));
        }

        let response = SurveyResponse {
            id: Uuid::new_v4(),
            survey_id: survey.id,
            certificate_id: certificate.id,
            member_id,
            month,
            answers,
            submitted_at: now,
        };
        self.store().insert_survey_response(&response).await?;

        let qualified = qualification.complete_survey(self.rules().monthly_threshold_cents, now);
        self.store().save_qualification(&qualification).await?;

        tracing::info!(certificate_id = %certificate.id, month = %month, "survey completed");

        if qualified {
            self.on_qualified(certificate, &qualification).await?;
        }
        Ok(qualification)
    }

    pub async fn member_dashboard(&self, member_id: Uuid) -> Result<MemberDashboard> {
        let certificates = self
            .store()
            .list_certificates(&CertificateFilter {
                member_id: Some(member_id),
                ..Default::default()
            })
            .await?;

        let reward = self.rules().monthly_reward_cents;
        let mut views = Vec::with_capacity(certificates.len());

        for certificate in certificates {
            let grocery_store = match certificate.grocery_store_id {
                Some(id) => self.store().get_grocery_store(id).await?,
                None => None,
            };
            let qualifications = self
                .store()
                .list_qualifications(&QualificationFilter {
                    certificate_id: Some(certificate.id),
                    ..Default::default()
                })
                .await?;
            let pending_receipts = self
                .store()
                .list_receipts(&ReceiptFilter {
                    certificate_id: Some(certificate.id),
                    status: Some(ReceiptStatus::Pending),
                    ..Default::default()
                })
                .await?
                .len();

            views.push(MemberCertificate {
                months_total: certificate.months_total(reward),
                certificate,
                grocery_store,
                qualifications,
                pending_receipts,
            });
        }

        Ok(MemberDashboard { certificates: views })
    }
}
