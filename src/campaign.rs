// src/campaign.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::month::Month;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Audience {
    AllMembers,
    AllMerchants,
    MembersMissingSurvey { month: Month },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Sent,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EmailCampaign {
    pub id: Uuid,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub audience: Audience,
    pub status: CampaignStatus,
    pub recipient_count: i64,
    pub failed_count: i64,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewCampaign {
    pub name: String,
    pub subject: String,
    pub body: String,
    pub audience: Audience,
}

pub fn render_body(body: &str, email: &str) -> String {
    body.replace("{{email}}", email)
}
