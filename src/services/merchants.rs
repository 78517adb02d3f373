// src/services/merchants.rs

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use super::Platform;
use crate::{
    error::{Error, Result},
    grocery::{GroceryStore, NewGroceryStore},
    lifecycle::CertificateStatus,
    merchant::{slugify, Merchant, MerchantProfile},
    purchase::Purchase,
    search::clamp_limit,
    store::CertificateFilter,
    user::{normalize_email, User},
};

#[derive(Clone, Debug, Default, Serialize)]
pub struct InventoryLine {
    pub denomination_cents: i64,
    pub counts: BTreeMap<CertificateStatus, i64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MerchantDashboard {
    pub merchant: Merchant,
    pub inventory: Vec<InventoryLine>,
    pub purchases: Vec<Purchase>,
}

fn clean(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Platform {
    pub async fn upsert_merchant_profile(&self, user: &User, profile: MerchantProfile) -> Result<Merchant> {
        let business_name = profile.business_name.trim().to_string();
        if business_name.is_empty() {
            return Err(Error::invalid("business name is required"));
        }
        let contact_email = match clean(profile.contact_email) {
            Some(e) => normalize_email(&e)?,
            None => user.email.clone(),
        };

        let now = self.now();
        let existing = self.store().find_merchant_by_user(user.id).await?;

        let slug = match &existing {
            Some(m) if m.business_name == business_name => m.slug.clone(),
            _ => self.unique_slug(&business_name, existing.as_ref().map(|m| m.id)).await?,
        };

        let merchant = Merchant {
            id: existing.as_ref().map(|m| m.id).unwrap_or_else(Uuid::new_v4),
            user_id: user.id,
            business_name,
            slug,
            contact_email,
            phone: clean(profile.phone),
            address: clean(profile.address),
            city: clean(profile.city),
            state: clean(profile.state),
            website: clean(profile.website),
            description: clean(profile.description),
            created_at: existing.as_ref().map(|m| m.created_at).unwrap_or(now),
            updated_at: now,
        };

        self.store().save_merchant(&merchant).await?;
        tracing::info!(merchant_id = %merchant.id, slug = %merchant.slug, "merchant profile saved");

        Ok(merchant)
    }

    async fn unique_slug(&self, business_name: &str, owner: Option<Uuid>) -> Result<String> {
        let base = match slugify(business_name) {
            s if s.is_empty() => "merchant".to_string(),
            s => s,
        };

        let mut candidate = base.clone();
        let mut n = 1;
        loop {
            match self.store().find_merchant_by_slug(&candidate).await? {
                Some(m) if Some(m.id) != owner => {
                    n += 1;
                    candidate = format!("{}-{}", base, n);
                }
                _ => return Ok(candidate),
            }
        }
    }

    pub async fn merchant_by_slug(&self, slug: &str) -> Result<Merchant> {
        self.store()
            .find_merchant_by_slug(&slug.to_lowercase())
            .await?
            .ok_or_else(|| Error::not_found(format!("merchant '{}'", slug)))
    }

    pub async fn merchant_dashboard(&self, user_id: Uuid) -> Result<MerchantDashboard> {
        let merchant = self.merchant_for_user(user_id).await?;

        let certificates = self
            .store()
            .list_certificates(&CertificateFilter {
                merchant_id: Some(merchant.id),
                ..Default::default()
            })
            .await?;

        let mut lines: BTreeMap<i64, InventoryLine> = BTreeMap::new();
        for c in &certificates {
            let line = lines.entry(c.denomination_cents).or_insert_with(|| InventoryLine {
                denomination_cents: c.denomination_cents,
                counts: BTreeMap::new(),
            });
            *line.counts.entry(c.status).or_insert(0) += 1;
        }

        let purchases = self.store().list_purchases(Some(merchant.id), None).await?;

        Ok(MerchantDashboard {
            merchant,
            inventory: lines.into_values().collect(),
            purchases,
        })
    }

    pub async fn create_grocery_store(&self, input: NewGroceryStore) -> Result<GroceryStore> {
        let required = [
            ("name", &input.name),
            ("address", &input.address),
            ("city", &input.city),
            ("state", &input.state),
            ("postal", &input.postal),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(Error::invalid(format!("grocery store {} is required", field)));
        }

        let store = GroceryStore {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            address: input.address.trim().to_string(),
            city: input.city.trim().to_string(),
            state: input.state.trim().to_uppercase(),
            postal: input.postal.trim().to_string(),
            created_at: self.now(),
        };

        self.store().save_grocery_store(&store).await?;
        self.directory.index(&store).await?;
        tracing::info!(store_id = %store.id, name = %store.name, "grocery store added");

        Ok(store)
    }

    pub async fn search_grocery_stores(&self, query: &str, limit: Option<usize>) -> Result<Vec<GroceryStore>> {
        self.directory.search(query.trim(), clamp_limit(limit)).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{harness, user};
    use super::*;
    use crate::user::Role;

    fn profile(name: &str) -> MerchantProfile {
        MerchantProfile {
            business_name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_slug_collisions_get_suffix() {
        let h = harness();
        let a = user(&h.platform, "a@example.com", Role::Merchant).await;
        let b = user(&h.platform, "b@example.com", Role::Merchant).await;
        let c = user(&h.platform, "c@example.com", Role::Merchant).await;

        let ma = h.platform.upsert_merchant_profile(&a, profile("Joe's Diner")).await.unwrap();
        let mb = h.platform.upsert_merchant_profile(&b, profile("Joe's Diner")).await.unwrap();
        let mc = h.platform.upsert_merchant_profile(&c, profile("JOE'S DINER")).await.unwrap();

        assert_eq!(ma.slug, "joe-s-diner");
        assert_eq!(mb.slug, "joe-s-diner-2");
        assert_eq!(mc.slug, "joe-s-diner-3");
        assert_eq!(ma.contact_email, "a@example.com");
    }

    #[tokio::test]
    async fn test_update_keeps_identity() {
        let h = harness();
        let a = user(&h.platform, "a@example.com", Role::Merchant).await;

        let first = h.platform.upsert_merchant_profile(&a, profile("Corner Cafe")).await.unwrap();
        let mut update = profile("Corner Cafe");
        update.city = Some("  Akron ".to_string());
        let second = h.platform.upsert_merchant_profile(&a, update).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.slug, "corner-cafe");
        assert_eq!(second.city.as_deref(), Some("Akron"));

        let renamed = h.platform.upsert_merchant_profile(&a, profile("Corner Bistro")).await.unwrap();
        assert_eq!(renamed.slug, "corner-bistro");
        assert_eq!(renamed.id, first.id);
    }

    #[tokio::test]
    async fn test_profile_requires_name() {
        let h = harness();
        let a = user(&h.platform, "a@example.com", Role::Merchant).await;
        assert!(h.platform.upsert_merchant_profile(&a, profile("  ")).await.is_err());
    }

    #[tokio::test]
    async fn test_grocery_store_indexed() {
        let h = harness();
        let input = NewGroceryStore {
            name: "Kroger".into(),
            address: "12 High St".into(),
            city: "Columbus".into(),
            state: "oh".into(),
            postal: "43215".into(),
        };
        let store = h.platform.create_grocery_store(input.clone()).await.unwrap();
        assert_eq!(store.state, "OH");

        let hits = h.platform.search_grocery_stores("kroger", None).await.unwrap();
        assert_eq!(hits, vec![store]);

        let mut missing = input;
        missing.postal = " ".into();
        assert!(h.platform.create_grocery_store(missing).await.is_err());
    }
}
