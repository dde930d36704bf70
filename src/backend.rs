//! REST backend client
//!
//! Typed HTTP client for the point-in-time snapshot side of the backend:
//! the device list, single devices and windowed reading history. Rows that
//! fail boundary validation are skipped individually so one bad row cannot
//! sink a whole fetch.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ClientError, ClientResult, MalformedEvent};
use crate::models::{DeviceId, DeviceSummary, Reading};
use crate::validation;

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// REST client for the monitoring backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: Url,
}

impl BackendClient {
    /// Create a client against `base_url` without authorization.
    pub fn new(base_url: &str) -> ClientResult<Self> {
        Self::with_token(base_url, None)
    }

    /// Create a client, optionally sending `Authorization: Bearer <token>`
    /// with every request.
    pub fn with_token(base_url: &str, token: Option<&str>) -> ClientResult<Self> {
        let mut builder = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT);

        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ClientError::Config(format!("invalid auth token: {}", e)))?;
            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: Url::parse(base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL of the push-event stream.
    pub fn events_url(&self) -> ClientResult<Url> {
        Ok(self.base_url.join("/api/events")?)
    }

    /// Fetch the full device list.
    pub async fn list_devices(&self) -> ClientResult<Vec<DeviceSummary>> {
        let url = self.base_url.join("/api/devices")?;
        debug!(%url, "Fetching device list");

        let rows: Vec<Value> = self.get_json(url).await?;
        Ok(collect_rows(&rows, validation::parse_device_summary, "device"))
    }

    /// Fetch a single device summary.
    pub async fn get_device(&self, device_id: DeviceId) -> ClientResult<DeviceSummary> {
        let url = self
            .base_url
            .join(&format!("/api/devices/{}", device_id))?;
        debug!(%url, "Fetching device");

        let value: Value = self.get_json(url).await?;
        validation::parse_device_summary(&value)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    /// Fetch the trailing `query_hours` hours of readings for one device,
    /// ordered by the backend.
    pub async fn get_readings(
        &self,
        device_id: DeviceId,
        query_hours: u32,
    ) -> ClientResult<Vec<Reading>> {
        let mut url = self
            .base_url
            .join(&format!("/api/devices/{}/readings", device_id))?;
        url.query_pairs_mut()
            .append_pair("hours", &query_hours.to_string());
        debug!(%url, "Fetching readings");

        let rows: Vec<Value> = self.get_json(url).await?;
        Ok(collect_rows(&rows, validation::parse_reading, "reading"))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> ClientResult<T> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::status(status, message));
        }

        Ok(response.json().await?)
    }
}

/// Parse bulk rows, skipping malformed ones with a warning.
fn collect_rows<T>(
    rows: &[Value],
    parse: impl Fn(&Value) -> Result<T, MalformedEvent>,
    kind: &str,
) -> Vec<T> {
    rows.iter()
        .filter_map(|row| match parse(row) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(kind, %error, "Skipping malformed row in fetch result");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(BackendClient::new("not a url").is_err());
    }

    #[test]
    fn test_events_url() {
        let client = BackendClient::new("http://localhost:3000").unwrap();
        assert_eq!(
            client.events_url().unwrap().as_str(),
            "http://localhost:3000/api/events"
        );
    }

    #[test]
    fn test_collect_rows_skips_malformed() {
        let rows = vec![
            json!({ "timestamp": "2024-06-01T12:00:00Z", "rainfall_mm": 1.0 }),
            json!({ "rainfall_mm": 2.0 }),
            json!({ "timestamp": "2024-06-01T13:00:00Z", "rainfall_mm": "0.5" }),
        ];

        let readings = collect_rows(&rows, validation::parse_reading, "reading");

        assert_eq!(readings.len(), 2);
        assert_eq!(readings[1].rainfall_mm, 0.5);
    }
}
