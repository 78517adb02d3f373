// src/ocr.rs

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    config::VeryfiConfig,
    error::{Error, Result},
};

/// Fields read off a receipt image.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct OcrResult {
    pub vendor: Option<String>,
    pub total_cents: Option<i64>,
    pub date: Option<NaiveDate>,
}

#[async_trait]
pub trait ReceiptScanner: Send + Sync {
    async fn scan(&self, image_url: &str) -> Result<OcrResult>;
}

pub struct VeryfiScanner {
    client: reqwest::Client,
    config: VeryfiConfig,
}

#[derive(Debug, Deserialize)]
struct VeryfiVendor {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VeryfiDocument {
    total: Option<f64>,
    date: Option<String>,
    vendor: Option<VeryfiVendor>,
}

impl VeryfiScanner {
    pub fn new(config: VeryfiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl ReceiptScanner for VeryfiScanner {
    async fn scan(&self, image_url: &str) -> Result<OcrResult> {
        let url = format!(
            "{}/api/v8/partner/documents",
            self.config.base_url.trim_end_matches('/')
        );

        let resp = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .header("CLIENT-ID", &self.config.client_id)
            .header(
                "AUTHORIZATION",
                format!("apikey {}:{}", self.config.username, self.config.api_key),
            )
            .json(&json!({ "file_url": image_url }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!("veryfi returned {}", status)));
        }

        let doc: VeryfiDocument = resp.json().await?;
        Ok(doc.into())
    }
}

impl From<VeryfiDocument> for OcrResult {
    fn from(doc: VeryfiDocument) -> Self {
        // "2026-05-10 14:22:00"
        let date = doc
            .date
            .as_deref()
            .and_then(|d| d.get(0..10))
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());

        Self {
            vendor: doc.vendor.and_then(|v| v.name).filter(|n| !n.trim().is_empty()),
            total_cents: doc.total.map(|t| (t * 100.0).round() as i64),
            date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> VeryfiConfig {
        VeryfiConfig {
            base_url,
            client_id: "cid".to_string(),
            username: "grc".to_string(),
            api_key: "key".to_string(),
        }
    }

    #[tokio::test]
    async fn test_scan_parses_document() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v8/partner/documents"))
            .and(header("CLIENT-ID", "cid"))
            .and(header("AUTHORIZATION", "apikey grc:key"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "total": 104.37,
                "date": "2026-05-10 14:22:00",
                "vendor": { "name": "Fresh Market" }
            })))
            .mount(&server)
            .await;

        let scanner = VeryfiScanner::new(config(server.uri()));
        let result = scanner.scan("https://blob.example.com/r.jpg").await.unwrap();

        assert_eq!(result.total_cents, Some(10_437));
        assert_eq!(result.vendor.as_deref(), Some("Fresh Market"));
        assert_eq!(result.date, NaiveDate::from_ymd_opt(2026, 5, 10));
    }

    #[tokio::test]
    async fn test_scan_upstream_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let scanner = VeryfiScanner::new(config(server.uri()));
        assert!(matches!(
            scanner.scan("https://blob.example.com/r.jpg").await,
            Err(Error::Upstream(_))
        ));
    }

    #[test]
    fn test_partial_document() {
        let doc = VeryfiDocument {
            total: None,
            date: Some("garbage".to_string()),
            vendor: Some(VeryfiVendor { name: Some(" ".to_string()) }),
        };
        assert_eq!(OcrResult::from(doc), OcrResult::default());
    }
}
