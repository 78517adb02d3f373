// src/services/accounts.rs

use chrono::Duration;
use serde::Serialize;
use uuid::Uuid;

use super::Platform;
use crate::{
    error::{Error, Result},
    mailer::OutgoingEmail,
    user::{normalize_email, MagicLink, Role, User},
};

#[derive(Clone, Debug, Serialize)]
pub struct SessionGrant {
    pub token: String,
    pub user: User,
}

fn new_link_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

impl Platform {
    pub async fn request_magic_link(&self, email: &str, role: Option<Role>) -> Result<()> {
        let email = normalize_email(email)?;

        let role = match role.unwrap_or(Role::Member) {
            Role::Admin => return Err(Error::invalid("admin accounts cannot be requested")),
            _ if self.config().is_admin_email(&email) => Role::Admin,
            other => other,
        };

        let now = self.now();
        let link = MagicLink {
            token: new_link_token(),
            email: email.clone(),
            role,
            created_at: now,
            expires_at: now + Duration::minutes(self.config().magic_link_ttl_minutes),
            used_at: None,
        };
        self.store().insert_magic_link(&link).await?;

        let url = format!("{}/auth/verify?token={}", self.config().app_base_url, link.token);
        let body = format!(
            "Use the link below to sign in. It expires in {} minutes and works once.\n\n{}\n",
            self.config().magic_link_ttl_minutes,
            url
        );

        // the link is useless if it never arrives
        self.mailer
            .send(&OutgoingEmail::new(email.as_str(), "Your sign-in link", body))
            .await?;

        tracing::info!(email = %email, role = %role, "magic link issued");
        Ok(())
    }

    pub async fn verify_magic_link(&self, token: &str) -> Result<SessionGrant> {
        let now = self.now();
        let link = self
            .store()
            .consume_magic_link(token.trim(), now)
            .await?
            .ok_or_else(|| Error::Unauthorized("sign-in link is invalid or already used".to_string()))?;

        if link.is_expired(now) {
            return Err(Error::Unauthorized("sign-in link has expired".to_string()));
        }

        let is_admin = self.config().is_admin_email(&link.email);
        let user = match self.store().find_user_by_email(&link.email).await? {
            Some(mut user) => {
                if is_admin {
                    user.role = Role::Admin;
                }
                user.last_login_at = Some(now);
                self.store().save_user(&user).await?;
                user
            }
            None => {
                let role = if is_admin { Role::Admin } else { link.role };
                let mut user = User::new(link.email.clone(), role, now);
                user.last_login_at = Some(now);
                self.store().insert_user(&user).await?;
                tracing::info!(user_id = %user.id, role = %user.role, "user created");
                user
            }
        };

        let token = self.sessions().issue(&user, now)?;
        tracing::info!(user_id = %user.id, "signed in");

        Ok(SessionGrant { token, user })
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<User> {
        self.store()
            .get_user(user_id)
            .await?
            .ok_or_else(|| Error::Unauthorized("account no longer exists".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::harness;
    use super::*;

    fn token_from(body: &str) -> String {
        body.split("token=")
            .nth(1)
            .map(|rest| rest.trim().to_string())
            .unwrap()
    }

    #[tokio::test]
    async fn test_magic_link_sign_in_creates_member() {
        let h = harness();
        h.platform.request_magic_link(" Jane@Example.com ", None).await.unwrap();

        let mail = h.outbox.sent_to("jane@example.com").await;
        assert_eq!(mail.len(), 1);
        let token = token_from(&mail[0].text_body);

        let grant = h.platform.verify_magic_link(&token).await.unwrap();
        assert_eq!(grant.user.role, Role::Member);
        let claims = h.platform.sessions().verify(&grant.token, h.platform.now()).unwrap();
        assert_eq!(claims.sub, grant.user.id);

        // one use only
        assert!(matches!(
            h.platform.verify_magic_link(&token).await,
            Err(Error::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_link_rejected() {
        let h = harness();
        h.platform
            .request_magic_link("shop@example.com", Some(Role::Merchant))
            .await
            .unwrap();
        let token = token_from(&h.outbox.sent().await[0].text_body);

        h.clock.advance(Duration::minutes(16));
        assert!(matches!(
            h.platform.verify_magic_link(&token).await,
            Err(Error::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_existing_role_kept_and_admin_promoted() {
        let h = harness();
        h.platform
            .request_magic_link("shop@example.com", Some(Role::Merchant))
            .await
            .unwrap();
        let token = token_from(&h.outbox.sent().await[0].text_body);
        h.platform.verify_magic_link(&token).await.unwrap();

        h.platform.request_magic_link("shop@example.com", None).await.unwrap();
        let token = token_from(&h.outbox.sent().await[1].text_body);
        let grant = h.platform.verify_magic_link(&token).await.unwrap();
        assert_eq!(grant.user.role, Role::Merchant);

        h.platform.request_magic_link("admin@example.com", None).await.unwrap();
        let token = token_from(&h.outbox.sent().await[2].text_body);
        let grant = h.platform.verify_magic_link(&token).await.unwrap();
        assert_eq!(grant.user.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_admin_cannot_be_requested() {
        let h = harness();
        assert!(matches!(
            h.platform.request_magic_link("x@example.com", Some(Role::Admin)).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(h.platform.request_magic_link("not-an-email", None).await.is_err());
    }
}
