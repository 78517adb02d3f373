// src/services/mod.rs
//
// Business operations. Each submodule adds an `impl Platform` block for one
// area: accounts, merchants, inventory, redemption, moderation, campaigns.

pub mod accounts;
pub mod campaigns;
pub mod inventory;
pub mod merchants;
pub mod moderation;
pub mod redemption;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    auth::SessionKeys,
    certificate::Certificate,
    clock::{Clock, SystemClock},
    config::{Config, Rules},
    error::{Error, Result},
    mailer::{Mailer, OutgoingEmail},
    merchant::Merchant,
    ocr::ReceiptScanner,
    search::StoreDirectory,
    store::Store,
};

/// Shared application state: storage, outbound integrations and settings.
#[derive(Clone)]
pub struct Platform {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    directory: Arc<dyn StoreDirectory>,
    scanner: Option<Arc<dyn ReceiptScanner>>,
    clock: Arc<dyn Clock>,
    sessions: SessionKeys,
    config: Arc<Config>,
}

impl Platform {
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        directory: Arc<dyn StoreDirectory>,
    ) -> Self {
        Self {
            store,
            mailer,
            directory,
            scanner: None,
            clock: Arc::new(SystemClock),
            sessions: SessionKeys::new(&config.jwt_secret, config.session_ttl_hours),
            config: Arc::new(config),
        }
    }

    pub fn with_scanner(mut self, scanner: Arc<dyn ReceiptScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rules(&self) -> &Rules {
        &self.config.rules
    }

    pub fn sessions(&self) -> &SessionKeys {
        &self.sessions
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Sends mail where delivery is a courtesy; failures are logged only.
    pub(crate) async fn notify(&self, email: OutgoingEmail) {
        if let Err(e) = self.mailer.send(&email).await {
            tracing::warn!(to = %email.to, subject = %email.subject, error = %e, "notification failed");
        }
    }

    pub(crate) async fn certificate(&self, id: Uuid) -> Result<Certificate> {
        self.store
            .get_certificate(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("certificate {}", id)))
    }

    pub(crate) async fn merchant_for_user(&self, user_id: Uuid) -> Result<Merchant> {
        self.store
            .find_merchant_by_user(user_id)
            .await?
            .ok_or_else(|| Error::not_found("merchant profile"))
    }

    pub(crate) async fn member_email(&self, member_id: Uuid) -> Result<Option<String>> {
        Ok(self.store.get_user(member_id).await?.map(|u| u.email))
    }
}

pub fn format_cents(cents: i64) -> String {
    format!("${}.{:02}", cents / 100, (cents % 100).abs())
}
