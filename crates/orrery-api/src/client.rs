// Alpaca device HTTP client
//
// Wraps `reqwest::Client` with Alpaca URL construction, transaction ids,
// and envelope unwrapping. Per-kind endpoints (telescope, camera, focuser)
// are implemented as inherent methods in separate files to keep this
// module focused on transport mechanics.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{AlpacaResponse, DeviceKind};
use crate::transport::TransportConfig;

/// Raw HTTP client for one Alpaca device (`{kind}/{number}` on a server).
///
/// Every request carries `ClientID` and a monotonically increasing
/// `ClientTransactionID`. Methods return the unwrapped `Value`; a non-zero
/// `ErrorNumber` becomes [`Error::Device`].
#[derive(Debug)]
pub struct AlpacaClient {
    http: reqwest::Client,
    base_url: Url,
    kind: DeviceKind,
    number: u32,
    client_id: u32,
    transaction: AtomicU32,
}

impl AlpacaClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// `base_url` is the server root, e.g. `http://192.168.1.5:11111/`.
    pub fn new(
        base_url: Url,
        kind: DeviceKind,
        number: u32,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, kind, number))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, kind: DeviceKind, number: u32) -> Self {
        Self {
            http,
            base_url,
            kind,
            number,
            client_id: std::process::id() % 65_536,
            transaction: AtomicU32::new(0),
        }
    }

    /// Build the server root URL for `host:port`.
    pub fn server_url(host: &str, port: u16) -> Result<Url, Error> {
        Ok(Url::parse(&format!("http://{host}:{port}/"))?)
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/api/v1/{kind}/{number}/{property}`
    pub(crate) fn device_url(&self, property: &str) -> Result<Url, Error> {
        let path = format!(
            "api/v1/{}/{}/{}",
            self.kind.path_segment(),
            self.number,
            property.to_ascii_lowercase()
        );
        Ok(self.base_url.join(&path)?)
    }

    fn next_transaction(&self) -> u32 {
        self.transaction.fetch_add(1, Ordering::Relaxed) + 1
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// GET a property and return its `Value`.
    pub(crate) async fn get<T: DeserializeOwned>(&self, property: &str) -> Result<T, Error> {
        self.get_with(property, &[]).await
    }

    /// GET a property with extra query parameters.
    pub(crate) async fn get_with<T: DeserializeOwned>(
        &self,
        property: &str,
        query: &[(&str, String)],
    ) -> Result<T, Error> {
        let url = self.device_url(property)?;
        debug!("GET {}", url);

        let transaction = self.next_transaction().to_string();
        let client_id = self.client_id.to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("ClientID", client_id.as_str()),
            ("ClientTransactionID", transaction.as_str()),
        ];
        params.extend(query.iter().map(|(k, v)| (*k, v.as_str())));

        let resp = self
            .http
            .get(url)
            .query(&params)
            .send()
            .await
            .map_err(Error::Transport)?;

        let envelope: AlpacaResponse<T> = parse_envelope(resp).await?;
        require_value(envelope, property)
    }

    /// PUT a method or property setter, discarding any `Value`.
    pub(crate) async fn put(&self, property: &str, form: &[(&str, String)]) -> Result<(), Error> {
        let _: Option<serde_json::Value> = self.put_returning(property, form).await?;
        Ok(())
    }

    /// PUT and return the optional `Value` (used by `action`).
    pub(crate) async fn put_returning<T: DeserializeOwned>(
        &self,
        property: &str,
        form: &[(&str, String)],
    ) -> Result<Option<T>, Error> {
        let url = self.device_url(property)?;
        debug!("PUT {}", url);

        let transaction = self.next_transaction().to_string();
        let client_id = self.client_id.to_string();
        let mut body: Vec<(&str, &str)> = form.iter().map(|(k, v)| (*k, v.as_str())).collect();
        body.push(("ClientID", client_id.as_str()));
        body.push(("ClientTransactionID", transaction.as_str()));

        let resp = self
            .http
            .put(url)
            .form(&body)
            .send()
            .await
            .map_err(Error::Transport)?;

        let envelope: AlpacaResponse<T> = parse_envelope(resp).await?;
        Ok(envelope.value)
    }

    // ── Common device members ────────────────────────────────────────

    pub async fn connected(&self) -> Result<bool, Error> {
        self.get("connected").await
    }

    pub async fn set_connected(&self, connected: bool) -> Result<(), Error> {
        self.put("connected", &[("Connected", connected.to_string())])
            .await
    }

    pub async fn name(&self) -> Result<String, Error> {
        self.get("name").await
    }

    pub async fn description(&self) -> Result<String, Error> {
        self.get("description").await
    }

    pub async fn driver_info(&self) -> Result<String, Error> {
        self.get("driverinfo").await
    }

    pub async fn driver_version(&self) -> Result<String, Error> {
        self.get("driverversion").await
    }

    pub async fn interface_version(&self) -> Result<i32, Error> {
        self.get("interfaceversion").await
    }

    pub async fn supported_actions(&self) -> Result<Vec<String>, Error> {
        self.get("supportedactions").await
    }

    /// Invoke a driver-specific action. `parameters` is passed verbatim;
    /// the returned string is whatever the driver produced.
    pub async fn action(&self, action: &str, parameters: &str) -> Result<String, Error> {
        let value: Option<serde_json::Value> = self
            .put_returning(
                "action",
                &[
                    ("Action", action.to_owned()),
                    ("Parameters", parameters.to_owned()),
                ],
            )
            .await?;

        Ok(match value {
            Some(serde_json::Value::String(s)) => s,
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        })
    }
}

/// Check the HTTP status, then parse the Alpaca envelope and surface a
/// non-zero `ErrorNumber` as [`Error::Device`].
pub(crate) async fn parse_envelope<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<AlpacaResponse<T>, Error> {
    let status = resp.status();
    let url = resp.url().to_string();
    let body = resp.text().await.map_err(Error::Transport)?;

    if !status.is_success() {
        return Err(Error::Http {
            status: status.as_u16(),
            url,
            body,
        });
    }

    let envelope: AlpacaResponse<T> =
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: body.clone(),
        })?;

    if envelope.error_number != 0 {
        return Err(Error::Device {
            code: envelope.error_number,
            message: envelope.error_message,
        });
    }

    Ok(envelope)
}

fn require_value<T>(envelope: AlpacaResponse<T>, property: &str) -> Result<T, Error> {
    envelope.value.ok_or_else(|| Error::Deserialization {
        message: format!("response for '{property}' carried no Value"),
        body: String::new(),
    })
}
