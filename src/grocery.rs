// src/grocery.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A grocery store a member can register a certificate against.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct GroceryStore {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct NewGroceryStore {
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal: String,
}

impl GroceryStore {
    pub fn search_text(&self) -> String {
        format!("{} {} {} {} {}", self.name, self.address, self.city, self.state, self.postal)
    }
}
