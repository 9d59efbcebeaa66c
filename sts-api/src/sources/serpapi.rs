//! SerpAPI client shared by the Google Play, App Store and Google Search adapters

use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::SourceError;

pub const SERPAPI_BASE_URL: &str = "https://serpapi.com";
const USER_AGENT: &str = concat!("sts-api/", env!("CARGO_PKG_VERSION"));

/// Thin SerpAPI `search.json` client
pub struct SerpApiClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl SerpApiClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, SourceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| SourceError::Http(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Run one search and return the raw JSON document
    ///
    /// SerpAPI reports engine failures as `{"error": "..."}` with a 200 or
    /// 4xx status; both surface as `SourceError::Provider`.
    pub async fn search(&self, engine: &str, params: &[(&str, String)]) -> Result<Value, SourceError> {
        if !sts_common::config::is_valid_key(&self.api_key) {
            return Err(SourceError::Config("SerpAPI key not configured".to_string()));
        }

        let url = format!("{}/search.json", self.base_url);
        let mut query: Vec<(&str, String)> = vec![("engine", engine.to_string())];
        query.extend(params.iter().cloned());
        query.push(("api_key", self.api_key.clone()));

        debug!(engine = %engine, "Querying SerpAPI");

        let response = self.http_client.get(&url).query(&query).send().await?;
        let status = response.status();
        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) if status.is_success() => return Err(SourceError::Parse(e.to_string())),
            Err(_) => return Err(SourceError::Status(status.as_u16(), status.to_string())),
        };

        if let Some(error) = body.get("error").and_then(Value::as_str) {
            return Err(SourceError::Provider(error.to_string()));
        }
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16(), body.to_string()));
        }

        Ok(body)
    }
}

/// Read a string field, accepting numbers as text
pub(crate) fn str_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read a numeric field, accepting numeric strings
pub(crate) fn f64_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Array field as a slice; missing or non-array is empty
pub(crate) fn array_field<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
