// src/config.rs

use std::str::FromStr;

use crate::error::{Error, Result};

/// Business rules that drive issuance, qualification and rewards.
#[derive(Clone, Debug, PartialEq)]
pub struct Rules {
    /// Approved receipt total a member needs in one month.
    pub monthly_threshold_cents: i64,
    /// Gift card amount paid out for each qualified month.
    pub monthly_reward_cents: i64,
    /// Days after issue during which a certificate must be registered.
    pub claim_window_days: i64,
    /// Merchant price of a certificate, in basis points of face value.
    pub merchant_price_bps: i64,
}

impl Rules {
    /// Every rule must be positive; the merchant price cannot exceed face value.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("MONTHLY_THRESHOLD_CENTS", self.monthly_threshold_cents),
            ("MONTHLY_REWARD_CENTS", self.monthly_reward_cents),
            ("CLAIM_WINDOW_DAYS", self.claim_window_days),
            ("MERCHANT_PRICE_BPS", self.merchant_price_bps),
        ];
        if let Some((key, value)) = positive.iter().find(|(_, v)| *v <= 0) {
            return Err(Error::Config(format!("{} must be greater than zero, got {}", key, value)));
        }
        if self.merchant_price_bps > 10_000 {
            return Err(Error::Config(format!(
                "MERCHANT_PRICE_BPS must be at most 10000, got {}",
                self.merchant_price_bps
            )));
        }
        Ok(())
    }
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            monthly_threshold_cents: 10_000,
            monthly_reward_cents: 2_500,
            claim_window_days: 90,
            merchant_price_bps: 1_000,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MeilisearchConfig {
    pub url: String,
    pub key: String,
}

#[derive(Clone, Debug)]
pub struct VeryfiConfig {
    pub base_url: String,
    pub client_id: String,
    pub username: String,
    pub api_key: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub mongodb_uri: Option<String>,
    pub mongodb_database: String,
    pub meilisearch: Option<MeilisearchConfig>,
    pub jwt_secret: String,
    pub app_base_url: String,
    pub bind_addr: String,
    pub postmark_token: Option<String>,
    pub postmark_base_url: String,
    pub mail_from: String,
    pub veryfi: Option<VeryfiConfig>,
    pub magic_link_ttl_minutes: i64,
    pub session_ttl_hours: i64,
    pub admin_emails: Vec<String>,
    pub rules: Rules,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mongodb_uri: None,
            mongodb_database: "grocery_rebates".to_string(),
            meilisearch: None,
            jwt_secret: "development-secret".to_string(),
            app_base_url: "http://localhost:3000".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
            postmark_token: None,
            postmark_base_url: "https://api.postmarkapp.com".to_string(),
            mail_from: "rebates@localhost".to_string(),
            veryfi: None,
            magic_link_ttl_minutes: 15,
            session_ttl_hours: 720,
            admin_emails: Vec::new(),
            rules: Rules::default(),
        }
    }
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();
        let default_rules = Rules::default();

        let jwt_secret = get("JWT_SECRET")
            .ok_or_else(|| Error::Config("JWT_SECRET must be set".to_string()))?;

        let meilisearch = match (get("MEILISEARCH_URL"), get("MEILISEARCH_KEY")) {
            (Some(url), key) => Some(MeilisearchConfig {
                url,
                key: key.unwrap_or_default(),
            }),
            (None, _) => None,
        };

        let veryfi = match (
            get("VERYFI_CLIENT_ID"),
            get("VERYFI_USERNAME"),
            get("VERYFI_API_KEY"),
        ) {
            (Some(client_id), Some(username), Some(api_key)) => Some(VeryfiConfig {
                base_url: get("VERYFI_BASE_URL")
                    .unwrap_or_else(|| "https://api.veryfi.com".to_string()),
                client_id,
                username,
                api_key,
            }),
            _ => None,
        };

        let admin_emails = get("ADMIN_EMAILS")
            .map(|raw| {
                raw.split(',')
                    .map(|e| e.trim().to_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let rules = Rules {
            monthly_threshold_cents: parse_or(
                &get,
                "MONTHLY_THRESHOLD_CENTS",
                default_rules.monthly_threshold_cents,
            )?,
            monthly_reward_cents: parse_or(&get, "MONTHLY_REWARD_CENTS", default_rules.monthly_reward_cents)?,
            claim_window_days: parse_or(&get, "CLAIM_WINDOW_DAYS", default_rules.claim_window_days)?,
            merchant_price_bps: parse_or(&get, "MERCHANT_PRICE_BPS", default_rules.merchant_price_bps)?,
        };
        rules.validate()?;

        Ok(Self {
            mongodb_uri: get("MONGODB_URI"),
            mongodb_database: get("MONGODB_DATABASE").unwrap_or(defaults.mongodb_database),
            meilisearch,
            jwt_secret,
            app_base_url: get("APP_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.app_base_url),
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            postmark_token: get("POSTMARK_SERVER_TOKEN"),
            postmark_base_url: get("POSTMARK_BASE_URL").unwrap_or(defaults.postmark_base_url),
            mail_from: get("MAIL_FROM").unwrap_or(defaults.mail_from),
            veryfi,
            magic_link_ttl_minutes: parse_or(&get, "MAGIC_LINK_TTL_MINUTES", 15)?,
            session_ttl_hours: parse_or(&get, "SESSION_TTL_HOURS", 720)?,
            admin_emails,
            rules,
        })
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.iter().any(|a| a == email)
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| Error::Config(format!("{} must be a number, got '{}'", key, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_requires_jwt_secret() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.mongodb_database, "grocery_rebates");
        assert_eq!(config.rules, Rules::default());
        assert!(config.meilisearch.is_none());
        assert!(config.veryfi.is_none());
        assert!(config.postmark_token.is_none());
    }

    #[test]
    fn test_overrides_and_admins() {
        let config = Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("APP_BASE_URL", "https://grc.example.com/"),
            ("ADMIN_EMAILS", " Ops@Example.com, ,boss@example.com"),
            ("MONTHLY_REWARD_CENTS", "5000"),
            ("MEILISEARCH_URL", "http://localhost:7700"),
        ]))
        .unwrap();

        assert_eq!(config.app_base_url, "https://grc.example.com");
        assert!(config.is_admin_email("ops@example.com"));
        assert!(config.is_admin_email("boss@example.com"));
        assert_eq!(config.admin_emails.len(), 2);
        assert_eq!(config.rules.monthly_reward_cents, 5000);
        assert_eq!(config.meilisearch.unwrap().key, "");
    }

    #[test]
    fn test_rejects_bad_number() {
        let err = Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("CLAIM_WINDOW_DAYS", "ninety"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("CLAIM_WINDOW_DAYS"));
    }

    #[test]
    fn test_rejects_non_positive_rules() {
        for (key, value) in [
            ("MONTHLY_REWARD_CENTS", "-100"),
            ("MONTHLY_REWARD_CENTS", "0"),
            ("MONTHLY_THRESHOLD_CENTS", "-1"),
            ("CLAIM_WINDOW_DAYS", "0"),
            ("MERCHANT_PRICE_BPS", "-5"),
            ("MERCHANT_PRICE_BPS", "10001"),
        ] {
            let err = Config::from_lookup(lookup(&[("JWT_SECRET", "s3cret"), (key, value)])).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{}={} accepted", key, value);
            assert!(err.to_string().contains(key));
        }
    }

    #[test]
    fn test_veryfi_needs_all_keys() {
        let config = Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("VERYFI_CLIENT_ID", "id"),
            ("VERYFI_USERNAME", "user"),
        ]))
        .unwrap();
        assert!(config.veryfi.is_none());
    }
}
