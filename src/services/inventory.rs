// src/services/inventory.rs

use chrono::Duration;
use uuid::Uuid;

use super::{format_cents, Platform};
use crate::{
    certificate::{normalize_code, Certificate, CertificateLookup},
    error::{Error, Result},
    lifecycle::{CertificateEvent, CertificateStatus},
    mailer::OutgoingEmail,
    purchase::{validate_denomination, Purchase, PurchaseStatus},
    store::CertificateFilter,
    user::normalize_email,
};

impl Platform {
    pub async fn create_purchase(&self, user_id: Uuid, denomination_cents: i64, quantity: i64) -> Result<Purchase> {
        let merchant = self.merchant_for_user(user_id).await?;
        let purchase = Purchase::quote(
            merchant.id,
            denomination_cents,
            quantity,
            self.rules().merchant_price_bps,
            self.now(),
        )?;

        self.store().save_purchase(&purchase).await?;
        tracing::info!(
            purchase_id = %purchase.id,
            merchant_id = %merchant.id,
            quantity,
            total_cents = purchase.total_cents,
            "purchase created"
        );

        Ok(purchase)
    }

    async fn purchase(&self, id: Uuid) -> Result<Purchase> {
        self.store()
            .get_purchase(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("purchase {}", id)))
    }

    /// Marks a purchase paid and mints its certificates.
    pub async fn confirm_purchase(&self, purchase_id: Uuid) -> Result<Purchase> {
        let mut purchase = self.purchase(purchase_id).await?;
        if purchase.status != PurchaseStatus::Pending {
            return Err(Error::conflict(format!("purchase is already {:?}", purchase.status).to_lowercase()));
        }

        let now = self.now();
        let certificates: Vec<Certificate> = (0..purchase.quantity)
            .map(|_| Certificate::new(purchase.merchant_id, purchase.id, purchase.denomination_cents, now))
            .collect();
        self.store().insert_certificates(&certificates).await?;

        purchase.status = PurchaseStatus::Paid;
        purchase.paid_at = Some(now);
        self.store().save_purchase(&purchase).await?;

        tracing::info!(purchase_id = %purchase.id, minted = certificates.len(), "purchase confirmed");
        Ok(purchase)
    }

    pub async fn cancel_purchase(&self, purchase_id: Uuid) -> Result<Purchase> {
        let mut purchase = self.purchase(purchase_id).await?;
        if purchase.status != PurchaseStatus::Pending {
            return Err(Error::conflict("only pending purchases can be cancelled"));
        }

        purchase.status = PurchaseStatus::Cancelled;
        self.store().save_purchase(&purchase).await?;
        tracing::info!(purchase_id = %purchase.id, "purchase cancelled");

        Ok(purchase)
    }

    pub async fn issue_certificate(
        &self,
        user_id: Uuid,
        denomination_cents: i64,
        customer_name: &str,
        customer_email: &str,
    ) -> Result<Certificate> {
        let merchant = self.merchant_for_user(user_id).await?;
        validate_denomination(denomination_cents)?;
        let customer_email = normalize_email(customer_email)?;
        let customer_name = customer_name.trim();
        if customer_name.is_empty() {
            return Err(Error::invalid("customer name is required"));
        }

        let now = self.now();
        let mut certificate = self
            .store()
            .reserve_certificate(merchant.id, denomination_cents, now)
            .await?
            .ok_or_else(|| {
                Error::conflict(format!(
                    "no available inventory for {}",
                    format_cents(denomination_cents)
                ))
            })?;

        certificate.customer_name = Some(customer_name.to_string());
        certificate.customer_email = Some(customer_email.clone());
        self.store().save_certificate(&certificate).await?;

        tracing::info!(
            certificate_id = %certificate.id,
            merchant_id = %merchant.id,
            code = %certificate.code,
            "certificate issued"
        );

        let body = format!(
            "Hi {},\n\n{} has sent you a {} Grocery Rebate Certificate.\n\n\
             Claim code: {}\n\nClaim it at {}/m/{}\n",
            customer_name,
            merchant.business_name,
            format_cents(denomination_cents),
            certificate.code,
            self.config().app_base_url,
            merchant.slug,
        );
        self.notify(OutgoingEmail::new(
            customer_email,
            format!("Your rebate certificate from {}", merchant.business_name),
            body,
        ))
        .await;

        Ok(certificate)
    }

    pub async fn merchant_certificates(
        &self,
        user_id: Uuid,
        status: Option<CertificateStatus>,
    ) -> Result<Vec<Certificate>> {
        let merchant = self.merchant_for_user(user_id).await?;
        self.store()
            .list_certificates(&CertificateFilter {
                merchant_id: Some(merchant.id),
                status,
                ..Default::default()
            })
            .await
    }

    pub async fn lookup_certificate(&self, code: &str) -> Result<CertificateLookup> {
        let code = normalize_code(code);
        let certificate = self
            .store()
            .find_certificate_by_code(&code)
            .await?
            .filter(|c| c.status != CertificateStatus::Available)
            .ok_or_else(|| Error::not_found(format!("certificate {}", code)))?;

        let merchant = self
            .store()
            .get_merchant(certificate.merchant_id)
            .await?
            .ok_or_else(|| Error::not_found("merchant"))?;

        Ok(CertificateLookup {
            code: certificate.code,
            status: certificate.status,
            denomination_cents: certificate.denomination_cents,
            merchant_name: merchant.business_name,
            merchant_slug: merchant.slug,
        })
    }

    /// Expires issued or claimed certificates left unregistered past the claim window.
    pub async fn expire_unclaimed(&self) -> Result<usize> {
        let now = self.now();
        let cutoff = now - Duration::days(self.rules().claim_window_days);
        let mut expired = 0;

        for status in [CertificateStatus::Issued, CertificateStatus::Claimed] {
            let stale = self
                .store()
                .list_certificates(&CertificateFilter {
                    status: Some(status),
                    ..Default::default()
                })
                .await?;

            for mut certificate in stale {
                if !certificate.issued_at.is_some_and(|at| at < cutoff) {
                    continue;
                }
                certificate.apply(CertificateEvent::Expire)?;
                certificate.expired_at = Some(now);
                self.store().save_certificate(&certificate).await?;
                tracing::info!(certificate_id = %certificate.id, was = %status, "certificate expired");
                expired += 1;
            }
        }

        Ok(expired)
    }
}
