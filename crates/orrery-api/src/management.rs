// Alpaca management API
//
// Server-level endpoints under `/management`. Discovery uses
// `configureddevices` to turn a responding port into device records.

use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::client::parse_envelope;
use crate::error::Error;
use crate::models::{ConfiguredDevice, ServerDescription};
use crate::transport::TransportConfig;

/// Client for one Alpaca server's management endpoints.
pub struct ManagementClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ManagementClient {
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.base_url.join(path)?;
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        let envelope = parse_envelope::<T>(resp).await?;
        envelope.value.ok_or_else(|| Error::Deserialization {
            message: format!("response for '{path}' carried no Value"),
            body: String::new(),
        })
    }

    /// Supported management API versions (normally `[1]`).
    pub async fn api_versions(&self) -> Result<Vec<u32>, Error> {
        self.get("management/apiversions").await
    }

    pub async fn description(&self) -> Result<ServerDescription, Error> {
        self.get("management/v1/description").await
    }

    /// Every device the server exposes.
    pub async fn configured_devices(&self) -> Result<Vec<ConfiguredDevice>, Error> {
        self.get("management/v1/configureddevices").await
    }
}
