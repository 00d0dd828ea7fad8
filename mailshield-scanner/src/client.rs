use crate::error::{Result, ScanFailure};
use crate::result::{RiskLevel, ScanResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

pub const SCAN_URL_PATH: &str = "/api/threats/scan-url";

/// Anything that can turn a URL into a [`ScanResult`].
///
/// Implementations perform exactly one scoring attempt per call and never retry.
#[async_trait]
pub trait RiskScorer: Send + Sync {
    async fn score_url(&self, url: &str) -> Result<ScanResult>;
}

#[derive(Serialize)]
struct ScanUrlRequest<'a> {
    url: &'a str,
}

/// Client for the backend's `scan-url` endpoint.
#[derive(Clone)]
pub struct HttpRiskClient {
    client: Client,
    endpoint: Url,
}

impl HttpRiskClient {
    pub fn new(backend_url: &str) -> Result<Self> {
        Self::with_timeout(backend_url, 10)
    }

    pub fn with_timeout(backend_url: &str, timeout_secs: u64) -> Result<Self> {
        let endpoint = Self::endpoint_for(backend_url)?;

        let client = Client::builder()
            .user_agent(concat!("MailShield/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs((timeout_secs / 2).max(1)))
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()
            .map_err(|e| ScanFailure::ClientBuild(e.to_string()))?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn endpoint_for(backend_url: &str) -> Result<Url> {
        let base = backend_url.trim().trim_end_matches('/');
        let endpoint = Url::parse(&format!("{}{}", base, SCAN_URL_PATH))
            .map_err(|e| ScanFailure::InvalidUrl(format!("{}: {}", backend_url, e)))?;

        match endpoint.scheme() {
            "http" | "https" => Ok(endpoint),
            other => Err(ScanFailure::InvalidUrl(format!(
                "unsupported backend scheme '{}'",
                other
            ))),
        }
    }
}

#[async_trait]
impl RiskScorer for HttpRiskClient {
    async fn score_url(&self, url: &str) -> Result<ScanResult> {
        debug!("Scoring {}", url);

        let start = Instant::now();
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&ScanUrlRequest { url })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScanFailure::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let result = normalize_response(url, &body)?;

        debug!(
            "Scored {} in {:?}: {} ({})",
            url,
            start.elapsed(),
            result.risk_score(),
            result.risk_level()
        );
        Ok(result)
    }
}

/// Turn a raw `scan-url` body into a [`ScanResult`].
///
/// The body must be a JSON object. Missing or mistyped fields degrade to a safe
/// result instead of failing.
pub fn normalize_response(url: &str, body: &str) -> Result<ScanResult> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ScanFailure::InvalidResponse(format!("{}: {}", url, e)))?;

    let Some(object) = value.as_object() else {
        return Err(ScanFailure::InvalidResponse(format!(
            "{}: expected a JSON object",
            url
        )));
    };

    let Some(raw_score) = object.get("risk_score").and_then(score_from_value) else {
        warn!("Response for {} has no usable risk_score, treating as safe", url);
        return Ok(ScanResult::safe(url));
    };

    let reasons = object
        .get("reasons")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let result = ScanResult::new(url, raw_score, reasons);

    if let Some(reported) = object
        .get("risk_level")
        .and_then(Value::as_str)
        .and_then(|level| level.parse::<RiskLevel>().ok())
        && reported != result.risk_level()
    {
        debug!(
            "Backend level '{}' for {} disagrees with score {}, using '{}'",
            reported,
            url,
            result.risk_score(),
            result.risk_level()
        );
    }

    Ok(result)
}

fn score_from_value(value: &Value) -> Option<u8> {
    let score = value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.round() as i64))?;
    Some(score.clamp(0, 100) as u8)
}
