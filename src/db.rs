// src/db.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::{
    bson::{doc, to_bson, to_document, Document},
    options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReplaceOptions, ReturnDocument},
    Client, Collection, Database, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
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
    receipt::Receipt,
    store::{CertificateFilter, QualificationFilter, ReceiptFilter, Store},
    survey::{Survey, SurveyResponse},
    user::{MagicLink, Role, User},
};

const USERS: &str = "users";
const MAGIC_LINKS: &str = "magic_links";
const MERCHANTS: &str = "merchants";
const GROCERY_STORES: &str = "grocery_stores";
const PURCHASES: &str = "purchases";
const CERTIFICATES: &str = "certificates";
const RECEIPTS: &str = "receipts";
const QUALIFICATIONS: &str = "monthly_qualifications";
const SURVEYS: &str = "surveys";
const SURVEY_RESPONSES: &str = "survey_responses";
const FULFILLMENTS: &str = "fulfillments";
const CAMPAIGNS: &str = "email_campaigns";

#[derive(Clone, Debug)]
pub struct DB {
    pub client: Client,
    pub database: Database,
}

impl DB {
    pub async fn new(uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        let database = client.database(database);

        Ok(Self { client, database })
    }

    pub async fn ensure_indexes(&self) -> Result<()> {
        let unique = || IndexOptions::builder().unique(true).build();

        let indexes: [(&str, Document, bool); 7] = [
            (USERS, doc! { "email": 1 }, true),
            (MERCHANTS, doc! { "slug": 1 }, true),
            (CERTIFICATES, doc! { "code": 1 }, true),
            (CERTIFICATES, doc! { "merchant_id": 1, "status": 1, "denomination_cents": 1 }, false),
            (QUALIFICATIONS, doc! { "certificate_id": 1, "month": 1 }, true),
            (SURVEY_RESPONSES, doc! { "certificate_id": 1, "month": 1 }, true),
            (RECEIPTS, doc! { "status": 1, "month": 1 }, false),
        ];

        for (collection, keys, is_unique) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(if is_unique { Some(unique()) } else { None })
                .build();
            self.database
                .collection::<Document>(collection)
                .create_index(model, None)
                .await?;
        }

        tracing::debug!(database = %self.database.name(), "indexes ensured");
        Ok(())
    }
}

pub struct MongoStore {
    db: DB,
}

impl MongoStore {
    pub fn new(db: DB) -> Self {
        Self { db }
    }

    fn collection<T>(&self, name: &str) -> Collection<T> {
        self.db.database.collection::<T>(name)
    }

    // Writes go through `to_document` so stored values encode exactly like `key`.
    async fn upsert<T: Serialize>(&self, name: &str, id: Uuid, value: &T) -> Result<()> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.collection::<Document>(name)
            .replace_one(by_id(id)?, to_document(value)?, options)
            .await?;
        Ok(())
    }

    async fn insert<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        self.collection::<Document>(name)
            .insert_one(to_document(value)?, None)
            .await?;
        Ok(())
    }

    async fn find_one<T>(&self, name: &str, filter: Document) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync,
    {
        Ok(self.collection::<T>(name).find_one(filter, None).await?)
    }

    async fn find_many<T>(&self, name: &str, filter: Document, sort: Document) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync,
    {
        let options = FindOptions::builder().sort(sort).build();
        let cursor = self.collection::<T>(name).find(filter, options).await?;
        Ok(cursor.try_collect().await?)
    }
}

/// Encodes a value the same way it is stored, for use in filters.
fn key<T: Serialize>(value: &T) -> Result<mongodb::bson::Bson> {
    Ok(to_bson(value)?)
}

fn by_id(id: Uuid) -> Result<Document> {
    Ok(doc! { "id": key(&id)? })
}

fn certificate_filter(filter: &CertificateFilter) -> Result<Document> {
    let mut d = Document::new();
    if let Some(id) = filter.merchant_id {
        d.insert("merchant_id", key(&id)?);
    }
    if let Some(id) = filter.member_id {
        d.insert("member_id", key(&id)?);
    }
    if let Some(status) = filter.status {
        d.insert("status", key(&status)?);
    }
    Ok(d)
}

fn receipt_filter(filter: &ReceiptFilter) -> Result<Document> {
    let mut d = Document::new();
    if let Some(id) = filter.certificate_id {
        d.insert("certificate_id", key(&id)?);
    }
    if let Some(id) = filter.member_id {
        d.insert("member_id", key(&id)?);
    }
    if let Some(status) = filter.status {
        d.insert("status", key(&status)?);
    }
    if let Some(month) = filter.month {
        d.insert("month", key(&month)?);
    }
    Ok(d)
}

fn qualification_filter(filter: &QualificationFilter) -> Result<Document> {
    let mut d = Document::new();
    if let Some(id) = filter.certificate_id {
        d.insert("certificate_id", key(&id)?);
    }
    if let Some(id) = filter.member_id {
        d.insert("member_id", key(&id)?);
    }
    if let Some(month) = filter.month {
        d.insert("month", key(&month)?);
    }
    Ok(d)
}

#[async_trait]
impl Store for MongoStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        if self.find_user_by_email(&user.email).await?.is_some() {
            return Err(Error::conflict(format!("user {} already exists", user.email)));
        }
        self.insert(USERS, user).await
    }

    async fn save_user(&self, user: &User) -> Result<()> {
        self.upsert(USERS, user.id, user).await
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.find_one(USERS, by_id(id)?).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_one(USERS, doc! { "email": email }).await
    }

    async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>> {
        let filter = match role {
            Some(role) => doc! { "role": key(&role)? },
            None => doc! {},
        };
        self.find_many(USERS, filter, doc! { "created_at": 1 }).await
    }

    async fn insert_magic_link(&self, link: &MagicLink) -> Result<()> {
        self.insert(MAGIC_LINKS, link).await
    }

    async fn consume_magic_link(&self, token: &str, now: DateTime<Utc>) -> Result<Option<MagicLink>> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let link = self
            .collection::<MagicLink>(MAGIC_LINKS)
            .find_one_and_update(
                doc! { "token": token, "used_at": null },
                doc! { "$set": { "used_at": key(&now)? } },
                options,
            )
            .await?;
        Ok(link)
    }

    async fn save_merchant(&self, merchant: &Merchant) -> Result<()> {
        self.upsert(MERCHANTS, merchant.id, merchant).await
    }

    async fn get_merchant(&self, id: Uuid) -> Result<Option<Merchant>> {
        self.find_one(MERCHANTS, by_id(id)?).await
    }

    async fn find_merchant_by_user(&self, user_id: Uuid) -> Result<Option<Merchant>> {
        self.find_one(MERCHANTS, doc! { "user_id": key(&user_id)? }).await
    }

    async fn find_merchant_by_slug(&self, slug: &str) -> Result<Option<Merchant>> {
        self.find_one(MERCHANTS, doc! { "slug": slug }).await
    }

    async fn save_grocery_store(&self, store: &GroceryStore) -> Result<()> {
        self.upsert(GROCERY_STORES, store.id, store).await
    }

    async fn get_grocery_store(&self, id: Uuid) -> Result<Option<GroceryStore>> {
        self.find_one(GROCERY_STORES, by_id(id)?).await
    }

    async fn save_purchase(&self, purchase: &Purchase) -> Result<()> {
        self.upsert(PURCHASES, purchase.id, purchase).await
    }

    async fn get_purchase(&self, id: Uuid) -> Result<Option<Purchase>> {
        self.find_one(PURCHASES, by_id(id)?).await
    }

    async fn list_purchases(&self, merchant_id: Option<Uuid>, status: Option<PurchaseStatus>) -> Result<Vec<Purchase>> {
        let mut filter = Document::new();
        if let Some(id) = merchant_id {
            filter.insert("merchant_id", key(&id)?);
        }
        if let Some(status) = status {
            filter.insert("status", key(&status)?);
        }
        self.find_many(PURCHASES, filter, doc! { "created_at": 1 }).await
    }

    async fn insert_certificates(&self, certificates: &[Certificate]) -> Result<()> {
        if certificates.is_empty() {
            return Ok(());
        }
        let documents = certificates
            .iter()
            .map(to_document)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.collection::<Document>(CERTIFICATES)
            .insert_many(documents, None)
            .await?;
        Ok(())
    }

    async fn save_certificate(&self, certificate: &Certificate) -> Result<()> {
        self.upsert(CERTIFICATES, certificate.id, certificate).await
    }

    async fn get_certificate(&self, id: Uuid) -> Result<Option<Certificate>> {
        self.find_one(CERTIFICATES, by_id(id)?).await
    }

    async fn find_certificate_by_code(&self, code: &str) -> Result<Option<Certificate>> {
        self.find_one(CERTIFICATES, doc! { "code": code }).await
    }

    async fn list_certificates(&self, filter: &CertificateFilter) -> Result<Vec<Certificate>> {
        self.find_many(
            CERTIFICATES,
            certificate_filter(filter)?,
            doc! { "created_at": 1, "code": 1 },
        )
        .await
    }

    async fn reserve_certificate(
        &self,
        merchant_id: Uuid,
        denomination_cents: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Certificate>> {
        let options = FindOneAndUpdateOptions::builder()
            .sort(doc! { "created_at": 1, "code": 1 })
            .return_document(ReturnDocument::After)
            .build();

        let filter = doc! {
            "merchant_id": key(&merchant_id)?,
            "denomination_cents": denomination_cents,
            "status": key(&CertificateStatus::Available)?,
        };
        let update = doc! {
            "$set": {
                "status": key(&transition(CertificateStatus::Available, CertificateEvent::Issue)?)?,
                "issued_at": key(&now)?,
            }
        };

        Ok(self
            .collection::<Certificate>(CERTIFICATES)
            .find_one_and_update(filter, update, options)
            .await?)
    }

    async fn claim_certificate(&self, id: Uuid, member_id: Uuid, now: DateTime<Utc>) -> Result<Option<Certificate>> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let filter = doc! {
            "id": key(&id)?,
            "status": key(&CertificateStatus::Issued)?,
            "member_id": null,
        };
        let update = doc! {
            "$set": {
                "status": key(&transition(CertificateStatus::Issued, CertificateEvent::Claim)?)?,
                "member_id": key(&member_id)?,
                "claimed_at": key(&now)?,
            }
        };

        Ok(self
            .collection::<Certificate>(CERTIFICATES)
            .find_one_and_update(filter, update, options)
            .await?)
    }

    async fn save_receipt(&self, receipt: &Receipt) -> Result<()> {
        self.upsert(RECEIPTS, receipt.id, receipt).await
    }

    async fn get_receipt(&self, id: Uuid) -> Result<Option<Receipt>> {
        self.find_one(RECEIPTS, by_id(id)?).await
    }

    async fn list_receipts(&self, filter: &ReceiptFilter) -> Result<Vec<Receipt>> {
        self.find_many(RECEIPTS, receipt_filter(filter)?, doc! { "submitted_at": 1 })
            .await
    }

    async fn save_qualification(&self, qualification: &MonthlyQualification) -> Result<()> {
        self.upsert(QUALIFICATIONS, qualification.id, qualification).await
    }

    async fn find_qualification(&self, certificate_id: Uuid, month: Month) -> Result<Option<MonthlyQualification>> {
        self.find_one(
            QUALIFICATIONS,
            doc! { "certificate_id": key(&certificate_id)?, "month": key(&month)? },
        )
        .await
    }

    async fn list_qualifications(&self, filter: &QualificationFilter) -> Result<Vec<MonthlyQualification>> {
        self.find_many(
            QUALIFICATIONS,
            qualification_filter(filter)?,
            doc! { "month": 1, "created_at": 1 },
        )
        .await
    }

    async fn save_survey(&self, survey: &Survey) -> Result<()> {
        self.upsert(SURVEYS, survey.id, survey).await
    }

    async fn find_survey(&self, month: Month) -> Result<Option<Survey>> {
        self.find_one(SURVEYS, doc! { "month": key(&month)? }).await
    }

    async fn insert_survey_response(&self, response: &SurveyResponse) -> Result<()> {
        if self
            .find_survey_response(response.certificate_id, response.month)
            .await?
            .is_some()
        {
            return Err(Error::conflict("survey already answered for this month"));
        }
        self.insert(SURVEY_RESPONSES, response).await
    }

    async fn find_survey_response(&self, certificate_id: Uuid, month: Month) -> Result<Option<SurveyResponse>> {
        self.find_one(
            SURVEY_RESPONSES,
            doc! { "certificate_id": key(&certificate_id)?, "month": key(&month)? },
        )
        .await
    }

    async fn save_fulfillment(&self, fulfillment: &Fulfillment) -> Result<()> {
        self.upsert(FULFILLMENTS, fulfillment.id, fulfillment).await
    }

    async fn get_fulfillment(&self, id: Uuid) -> Result<Option<Fulfillment>> {
        self.find_one(FULFILLMENTS, by_id(id)?).await
    }

    async fn list_fulfillments(
        &self,
        status: Option<FulfillmentStatus>,
        certificate_id: Option<Uuid>,
    ) -> Result<Vec<Fulfillment>> {
        let mut filter = Document::new();
        if let Some(status) = status {
            filter.insert("status", key(&status)?);
        }
        if let Some(id) = certificate_id {
            filter.insert("certificate_id", key(&id)?);
        }
        self.find_many(FULFILLMENTS, filter, doc! { "created_at": 1 }).await
    }

    async fn save_campaign(&self, campaign: &EmailCampaign) -> Result<()> {
        self.upsert(CAMPAIGNS, campaign.id, campaign).await
    }

    async fn get_campaign(&self, id: Uuid) -> Result<Option<EmailCampaign>> {
        self.find_one(CAMPAIGNS, by_id(id)?).await
    }

    async fn list_campaigns(&self) -> Result<Vec<EmailCampaign>> {
        self.find_many(CAMPAIGNS, doc! {}, doc! { "created_at": -1 }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_only_include_set_fields() {
        let empty = certificate_filter(&CertificateFilter::default()).unwrap();
        assert!(empty.is_empty());

        let f = receipt_filter(&ReceiptFilter {
            status: Some(crate::receipt::ReceiptStatus::Pending),
            month: Some("2026-05".parse().unwrap()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(f.get_str("status").unwrap(), "pending");
        assert_eq!(f.get_str("month").unwrap(), "2026-05");
        assert!(!f.contains_key("member_id"));
    }

    #[test]
    fn test_stored_ids_match_filter_keys() {
        let cert = Certificate::new(Uuid::new_v4(), Uuid::new_v4(), 2_500, Utc::now());
        let stored = to_document(&cert).unwrap();

        assert_eq!(stored.get("id"), Some(&key(&cert.id).unwrap()));
        assert_eq!(stored.get("merchant_id"), Some(&key(&cert.merchant_id).unwrap()));
        assert_eq!(stored.get("status"), Some(&key(&CertificateStatus::Available).unwrap()));
    }
}
