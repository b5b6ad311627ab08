use crate::{Error, HttpConfig, Result, RetryPolicy};
use async_trait::async_trait;
use reqwest::header::{ETAG, HeaderMap};
use reqwest::{Client, StatusCode};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Response metadata from a lightweight probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResponse {
    /// Validator token reported by the origin, if any.
    pub etag: Option<String>,
    /// All response headers with lowercase names.
    pub headers: BTreeMap<String, String>,
}

/// A downloaded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// Validator token reported with the body, if any.
    pub etag: Option<String>,
    /// Response body decoded as text.
    pub body: String,
    /// HTTP status code.
    pub status: u16,
}

/// Source of page metadata and bodies.
///
/// The change detector only talks to the network through this trait, which
/// lets tests substitute a scripted implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Retrieve response metadata without the body.
    async fn probe(&self, url: &str) -> Result<ProbeResponse>;

    /// Download the full body. Non-success statuses are errors.
    async fn fetch(&self, url: &str) -> Result<FetchResponse>;
}

/// HTTP client for probing and downloading tracked pages.
///
/// Requests never carry conditional headers: the detector compares
/// validator tokens itself, so the origin always answers with a full
/// response.
pub struct HttpTransport {
    client: Client,
    retry: RetryPolicy,
}

impl HttpTransport {
    /// Creates a transport from explicit settings.
    pub fn from_config(config: &HttpConfig, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .danger_accept_invalid_certs(!config.verify_tls)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(Error::Network)?;
        Ok(Self { client, retry })
    }

    async fn head_once(&self, url: &str) -> Result<ProbeResponse> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;
        debug!("HEAD {} -> {}", url, response.status());

        let headers = response.headers();
        Ok(ProbeResponse {
            etag: etag_of(headers),
            headers: header_map(headers),
        })
    }

    async fn get_once(&self, url: &str) -> Result<FetchResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;
        let status = response.status();

        if !status.is_success() {
            if status == StatusCode::NOT_FOUND {
                return Err(Error::NotFound(format!("Page not found at '{url}'")));
            }
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let etag = etag_of(response.headers());
        let body = response.text().await.map_err(|e| request_error(url, e))?;
        info!("Fetched {} bytes from {}", body.len(), url);

        Ok(FetchResponse {
            etag,
            body,
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip_all, fields(url = %url))]
    async fn probe(&self, url: &str) -> Result<ProbeResponse> {
        validate_url(url)?;
        self.retry.run("probe", || self.head_once(url)).await
    }

    #[instrument(skip_all, fields(url = %url))]
    async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        validate_url(url)?;
        self.retry.run("fetch", || self.get_once(url)).await
    }
}

fn validate_url(url: &str) -> Result<()> {
    let parsed = url::Url::parse(url).map_err(|e| Error::InvalidUrl(format!("'{url}': {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::InvalidUrl(format!(
            "'{url}': unsupported scheme '{other}'"
        ))),
    }
}

/// Map a failed request, keeping timeouts distinct from other network errors.
fn request_error(url: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(format!("request to '{url}' timed out"))
    } else {
        Error::Network(err)
    }
}

fn etag_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(std::string::ToString::to_string)
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}
