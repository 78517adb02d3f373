// src/store.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    campaign::EmailCampaign,
    certificate::Certificate,
    error::{Error, Result},
    fulfillment::{Fulfillment, FulfillmentStatus},
    grocery::GroceryStore,
    lifecycle::{transition, CertificateEvent, CertificateStatus},
    merchant::Merchant,
    month::Month,
    purchase::{Purchase, PurchaseStatus},
    qualification::MonthlyQualification,
    receipt::{Receipt, ReceiptStatus},
    survey::{Survey, SurveyResponse},
    user::{MagicLink, Role, User},
};

#[derive(Clone, Debug, Default)]
pub struct CertificateFilter {
    pub merchant_id: Option<Uuid>,
    pub member_id: Option<Uuid>,
    pub status: Option<CertificateStatus>,
}

impl CertificateFilter {
    pub fn matches(&self, c: &Certificate) -> bool {
        self.merchant_id.map_or(true, |id| c.merchant_id == id)
            && self.member_id.map_or(true, |id| c.member_id == Some(id))
            && self.status.map_or(true, |s| c.status == s)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReceiptFilter {
    pub certificate_id: Option<Uuid>,
    pub member_id: Option<Uuid>,
    pub status: Option<ReceiptStatus>,
    pub month: Option<Month>,
}

impl ReceiptFilter {
    pub fn matches(&self, r: &Receipt) -> bool {
        self.certificate_id.map_or(true, |id| r.certificate_id == id)
            && self.member_id.map_or(true, |id| r.member_id == id)
            && self.status.map_or(true, |s| r.status == s)
            && self.month.map_or(true, |m| r.month == m)
    }
}

#[derive(Clone, Debug, Default)]
pub struct QualificationFilter {
    pub certificate_id: Option<Uuid>,
    pub member_id: Option<Uuid>,
    pub month: Option<Month>,
}

impl QualificationFilter {
    pub fn matches(&self, q: &MonthlyQualification) -> bool {
        self.certificate_id.map_or(true, |id| q.certificate_id == id)
            && self.member_id.map_or(true, |id| q.member_id == id)
            && self.month.map_or(true, |m| q.month == m)
    }
}

/// Persistence for every collection the platform keeps.
///
/// `save_*` methods insert or replace by id.
#[async_trait]
pub trait Store: Send + Sync {
    // users
    async fn insert_user(&self, user: &User) -> Result<()>;
    async fn save_user(&self, user: &User) -> Result<()>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>>;

    async fn insert_magic_link(&self, link: &MagicLink) -> Result<()>;
    /// Marks an unused link as used and returns it.
    async fn consume_magic_link(&self, token: &str, now: DateTime<Utc>) -> Result<Option<MagicLink>>;

    // merchants and stores
    async fn save_merchant(&self, merchant: &Merchant) -> Result<()>;
    async fn get_merchant(&self, id: Uuid) -> Result<Option<Merchant>>;
    async fn find_merchant_by_user(&self, user_id: Uuid) -> Result<Option<Merchant>>;
    async fn find_merchant_by_slug(&self, slug: &str) -> Result<Option<Merchant>>;

    async fn save_grocery_store(&self, store: &GroceryStore) -> Result<()>;
    async fn get_grocery_store(&self, id: Uuid) -> Result<Option<GroceryStore>>;

    // inventory
    async fn save_purchase(&self, purchase: &Purchase) -> Result<()>;
    async fn get_purchase(&self, id: Uuid) -> Result<Option<Purchase>>;
    async fn list_purchases(&self, merchant_id: Option<Uuid>, status: Option<PurchaseStatus>) -> Result<Vec<Purchase>>;

    async fn insert_certificates(&self, certificates: &[Certificate]) -> Result<()>;
    async fn save_certificate(&self, certificate: &Certificate) -> Result<()>;
    async fn get_certificate(&self, id: Uuid) -> Result<Option<Certificate>>;
    async fn find_certificate_by_code(&self, code: &str) -> Result<Option<Certificate>>;
    async fn list_certificates(&self, filter: &CertificateFilter) -> Result<Vec<Certificate>>;
    /// Flips one available certificate of the merchant to issued and returns it.
    async fn reserve_certificate(
        &self,
        merchant_id: Uuid,
        denomination_cents: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Certificate>>;
    /// Binds an issued, unowned certificate to the member. `None` when it is
    /// no longer claimable.
    async fn claim_certificate(&self, id: Uuid, member_id: Uuid, now: DateTime<Utc>) -> Result<Option<Certificate>>;

    // redemption
    async fn save_receipt(&self, receipt: &Receipt) -> Result<()>;
    async fn get_receipt(&self, id: Uuid) -> Result<Option<Receipt>>;
    async fn list_receipts(&self, filter: &ReceiptFilter) -> Result<Vec<Receipt>>;

    async fn save_qualification(&self, qualification: &MonthlyQualification) -> Result<()>;
    async fn find_qualification(&self, certificate_id: Uuid, month: Month) -> Result<Option<MonthlyQualification>>;
    async fn list_qualifications(&self, filter: &QualificationFilter) -> Result<Vec<MonthlyQualification>>;

    async fn save_survey(&self, survey: &Survey) -> Result<()>;
    async fn find_survey(&self, month: Month) -> Result<Option<Survey>>;
    async fn insert_survey_response(&self, response: &SurveyResponse) -> Result<()>;
    async fn find_survey_response(&self, certificate_id: Uuid, month: Month) -> Result<Option<SurveyResponse>>;

    async fn save_fulfillment(&self, fulfillment: &Fulfillment) -> Result<()>;
    async fn get_fulfillment(&self, id: Uuid) -> Result<Option<Fulfillment>>;
    async fn list_fulfillments(
        &self,
        status: Option<FulfillmentStatus>,
        certificate_id: Option<Uuid>,
    ) -> Result<Vec<Fulfillment>>;

    // email
    async fn save_campaign(&self, campaign: &EmailCampaign) -> Result<()>;
    async fn get_campaign(&self, id: Uuid) -> Result<Option<EmailCampaign>>;
    async fn list_campaigns(&self) -> Result<Vec<EmailCampaign>>;
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    magic_links: HashMap<String, MagicLink>,
    merchants: HashMap<Uuid, Merchant>,
    grocery_stores: HashMap<Uuid, GroceryStore>,
    purchases: HashMap<Uuid, Purchase>,
    certificates: HashMap<Uuid, Certificate>,
    receipts: HashMap<Uuid, Receipt>,
    qualifications: HashMap<Uuid, MonthlyQualification>,
    surveys: HashMap<Uuid, Survey>,
    survey_responses: HashMap<Uuid, SurveyResponse>,
    fulfillments: HashMap<Uuid, Fulfillment>,
    campaigns: HashMap<Uuid, EmailCampaign>,
}

/// In-process store for tests and `--memory` runs.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted<T: Clone, K: Ord>(items: impl Iterator<Item = T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut out: Vec<T> = items.collect();
    out.sort_by_key(|item| key(item));
    out
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut t = self.tables.lock().await;
        if t.users.values().any(|u| u.email == user.email) {
            return Err(Error::conflict(format!("user {} already exists", user.email)));
        }
        t.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn save_user(&self, user: &User) -> Result<()> {
        self.tables.lock().await.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>> {
        let t = self.tables.lock().await;
        let users = t
            .users
            .values()
            .filter(|u| role.map_or(true, |r| u.role == r))
            .cloned();
        Ok(sorted(users, |u| u.created_at))
    }

    async fn insert_magic_link(&self, link: &MagicLink) -> Result<()> {
        self.tables
            .lock()
            .await
            .magic_links
            .insert(link.token.clone(), link.clone());
        Ok(())
    }

    async fn consume_magic_link(&self, token: &str, now: DateTime<Utc>) -> Result<Option<MagicLink>> {
        let mut t = self.tables.lock().await;
        match t.magic_links.get_mut(token) {
            Some(link) if link.used_at.is_none() => {
                link.used_at = Some(now);
                Ok(Some(link.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn save_merchant(&self, merchant: &Merchant) -> Result<()> {
        self.tables
            .lock()
            .await
            .merchants
            .insert(merchant.id, merchant.clone());
        Ok(())
    }

    async fn get_merchant(&self, id: Uuid) -> Result<Option<Merchant>> {
        Ok(self.tables.lock().await.merchants.get(&id).cloned())
    }

    async fn find_merchant_by_user(&self, user_id: Uuid) -> Result<Option<Merchant>> {
        let t = self.tables.lock().await;
        Ok(t.merchants.values().find(|m| m.user_id == user_id).cloned())
    }

    async fn find_merchant_by_slug(&self, slug: &str) -> Result<Option<Merchant>> {
        let t = self.tables.lock().await;
        Ok(t.merchants.values().find(|m| m.slug == slug).cloned())
    }

    async fn save_grocery_store(&self, store: &GroceryStore) -> Result<()> {
        self.tables
            .lock()
            .await
            .grocery_stores
            .insert(store.id, store.clone());
        Ok(())
    }

    async fn get_grocery_store(&self, id: Uuid) -> Result<Option<GroceryStore>> {
        Ok(self.tables.lock().await.grocery_stores.get(&id).cloned())
    }

    async fn save_purchase(&self, purchase: &Purchase) -> Result<()> {
        self.tables
            .lock()
            .await
            .purchases
            .insert(purchase.id, purchase.clone());
        Ok(())
    }

    async fn get_purchase(&self, id: Uuid) -> Result<Option<Purchase>> {
        Ok(self.tables.lock().await.purchases.get(&id).cloned())
    }

    async fn list_purchases(&self, merchant_id: Option<Uuid>, status: Option<PurchaseStatus>) -> Result<Vec<Purchase>> {
        let t = self.tables.lock().await;
        let purchases = t
            .purchases
            .values()
            .filter(|p| merchant_id.map_or(true, |id| p.merchant_id == id))
            .filter(|p| status.map_or(true, |s| p.status == s))
            .cloned();
        Ok(sorted(purchases, |p| p.created_at))
    }

    async fn insert_certificates(&self, certificates: &[Certificate]) -> Result<()> {
        let mut t = self.tables.lock().await;
        for c in certificates {
            t.certificates.insert(c.id, c.clone());
        }
        Ok(())
    }

    async fn save_certificate(&self, certificate: &Certificate) -> Result<()> {
        self.tables
            .lock()
            .await
            .certificates
            .insert(certificate.id, certificate.clone());
        Ok(())
    }

    async fn get_certificate(&self, id: Uuid) -> Result<Option<Certificate>> {
        Ok(self.tables.lock().await.certificates.get(&id).cloned())
    }

    async fn find_certificate_by_code(&self, code: &str) -> Result<Option<Certificate>> {
        let t = self.tables.lock().await;
        Ok(t.certificates.values().find(|c| c.code == code).cloned())
    }

    async fn list_certificates(&self, filter: &CertificateFilter) -> Result<Vec<Certificate>> {
        let t = self.tables.lock().await;
        let certs = t.certificates.values().filter(|c| filter.matches(c)).cloned();
        Ok(sorted(certs, |c| (c.created_at, c.code.clone())))
    }

    async fn reserve_certificate(
        &self,
        merchant_id: Uuid,
        denomination_cents: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Certificate>> {
        let issued = transition(CertificateStatus::Available, CertificateEvent::Issue)?;
        let mut t = self.tables.lock().await;

        let next = t
            .certificates
            .values_mut()
            .filter(|c| {
                c.merchant_id == merchant_id
                    && c.denomination_cents == denomination_cents
                    && c.status == CertificateStatus::Available
            })
            .min_by_key(|c| (c.created_at, c.code.clone()));

        Ok(next.map(|c| {
            c.status = issued;
            c.issued_at = Some(now);
            c.clone()
        }))
    }

    async fn claim_certificate(&self, id: Uuid, member_id: Uuid, now: DateTime<Utc>) -> Result<Option<Certificate>> {
        let claimed = transition(CertificateStatus::Issued, CertificateEvent::Claim)?;
        let mut t = self.tables.lock().await;

        match t.certificates.get_mut(&id) {
            Some(c) if c.status == CertificateStatus::Issued && c.member_id.is_none() => {
                c.status = claimed;
                c.member_id = Some(member_id);
                c.claimed_at = Some(now);
                Ok(Some(c.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn save_receipt(&self, receipt: &Receipt) -> Result<()> {
        self.tables
            .lock()
            .await
            .receipts
            .insert(receipt.id, receipt.clone());
        Ok(())
    }

    async fn get_receipt(&self, id: Uuid) -> Result<Option<Receipt>> {
        Ok(self.tables.lock().await.receipts.get(&id).cloned())
    }

    async fn list_receipts(&self, filter: &ReceiptFilter) -> Result<Vec<Receipt>> {
        let t = self.tables.lock().await;
        let receipts = t.receipts.values().filter(|r| filter.matches(r)).cloned();
        Ok(sorted(receipts, |r| r.submitted_at))
    }

    async fn save_qualification(&self, qualification: &MonthlyQualification) -> Result<()> {
        self.tables
            .lock()
            .await
            .qualifications
            .insert(qualification.id, qualification.clone());
        Ok(())
    }

    async fn find_qualification(&self, certificate_id: Uuid, month: Month) -> Result<Option<MonthlyQualification>> {
        let t = self.tables.lock().await;
        Ok(t
            .qualifications
            .values()
            .find(|q| q.certificate_id == certificate_id && q.month == month)
            .cloned())
    }

    async fn list_qualifications(&self, filter: &QualificationFilter) -> Result<Vec<MonthlyQualification>> {
        let t = self.tables.lock().await;
        let quals = t.qualifications.values().filter(|q| filter.matches(q)).cloned();
        Ok(sorted(quals, |q| (q.month, q.created_at)))
    }

    async fn save_survey(&self, survey: &Survey) -> Result<()> {
        self.tables.lock().await.surveys.insert(survey.id, survey.clone());
        Ok(())
    }

    async fn find_survey(&self, month: Month) -> Result<Option<Survey>> {
        let t = self.tables.lock().await;
        Ok(t.surveys.values().find(|s| s.month == month).cloned())
    }

    async fn insert_survey_response(&self, response: &SurveyResponse) -> Result<()> {
        let mut t = self.tables.lock().await;
        let exists = t
            .survey_responses
            .values()
            .any(|r| r.certificate_id == response.certificate_id && r.month == response.month);
        if exists {
            return Err(Error::conflict("survey already answered for this month"));
        }
        t.survey_responses.insert(response.id, response.clone());
        Ok(())
    }

    async fn find_survey_response(&self, certificate_id: Uuid, month: Month) -> Result<Option<SurveyResponse>> {
        let t = self.tables.lock().await;
        Ok(t
            .survey_responses
            .values()
            .find(|r| r.certificate_id == certificate_id && r.month == month)
            .cloned())
    }

    async fn save_fulfillment(&self, fulfillment: &Fulfillment) -> Result<()> {
        self.tables
            .lock()
            .await
            .fulfillments
            .insert(fulfillment.id, fulfillment.clone());
        Ok(())
    }

    async fn get_fulfillment(&self, id: Uuid) -> Result<Option<Fulfillment>> {
        Ok(self.tables.lock().await.fulfillments.get(&id).cloned())
    }

    async fn list_fulfillments(
        &self,
        status: Option<FulfillmentStatus>,
        certificate_id: Option<Uuid>,
    ) -> Result<Vec<Fulfillment>> {
        let t = self.tables.lock().await;
        let items = t
            .fulfillments
            .values()
            .filter(|f| status.map_or(true, |s| f.status == s))
            .filter(|f| certificate_id.map_or(true, |id| f.certificate_id == id))
            .cloned();
        Ok(sorted(items, |f| f.created_at))
    }

    async fn save_campaign(&self, campaign: &EmailCampaign) -> Result<()> {
        self.tables
            .lock()
            .await
            .campaigns
            .insert(campaign.id, campaign.clone());
        Ok(())
    }

    async fn get_campaign(&self, id: Uuid) -> Result<Option<EmailCampaign>> {
        Ok(self.tables.lock().await.campaigns.get(&id).cloned())
    }

    async fn list_campaigns(&self) -> Result<Vec<EmailCampaign>> {
        let t = self.tables.lock().await;
        Ok(sorted(t.campaigns.values().cloned(), |c| c.created_at))
    }
}
