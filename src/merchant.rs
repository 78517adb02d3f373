// src/merchant.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Merchant {
    pub id: Uuid,
    pub user_id: Uuid,
    pub business_name: String,
    pub slug: String,
    pub contact_email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MerchantProfile {
    pub business_name: String,
    pub contact_email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
}

/// Lowercase alphanumerics joined by single dashes.
pub fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Joe's Pizza & Subs"), "joe-s-pizza-subs");
        assert_eq!(slugify("  Main  Street Auto "), "main-street-auto");
        assert_eq!(slugify("Café Olé"), "caf-ol");
        assert_eq!(slugify("!!!"), "");
    }
}
