use std::time::Duration;

use archiver_core::{ArchiverConfig, FailureKind};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, COOKIE, REFERER, USER_AGENT};

use crate::FetchError;

const SESSION_COOKIE: &str = "substack.sid=";

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_body_bytes: u64,
    pub user_agent: String,
    pub referer: String,
}

impl HttpSettings {
    pub fn from_config(config: &ArchiverConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            request_timeout: config.request_timeout,
            redirect_limit: 5,
            max_body_bytes: config.max_body_bytes,
            user_agent: config.user_agent.clone(),
            referer: config.referer.clone(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self::from_config(&ArchiverConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchMetadata {
    pub requested_url: String,
    pub final_url: String,
    pub content_type: Option<String>,
    pub byte_len: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub bytes: Vec<u8>,
    pub metadata: FetchMetadata,
}

/// Source of raw pages for the content fetcher.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        allowed_content_types: &[&str],
    ) -> Result<FetchOutput, FetchError>;
}

/// Shared HTTP client carrying the browser-like headers and optional session credential.
///
/// One session is shared by the archive client, the content fetcher and the
/// media resolver so connection pooling spans the whole run.
#[derive(Debug, Clone)]
pub struct HttpSession {
    client: reqwest::Client,
    settings: HttpSettings,
    authenticated: bool,
}

impl HttpSession {
    pub fn new(settings: HttpSettings, credential: Option<&str>) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value(&settings.user_agent)?);
        headers.insert(REFERER, header_value(&settings.referer)?);
        let credential = credential.map(str::trim).filter(|c| !c.is_empty());
        if let Some(raw) = credential {
            headers.insert(COOKIE, header_value(&session_cookie(raw))?);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit))
            .default_headers(headers)
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;

        Ok(Self {
            client,
            settings,
            authenticated: credential.is_some(),
        })
    }

    pub fn from_config(config: &ArchiverConfig, credential: Option<&str>) -> Result<Self, FetchError> {
        Self::new(HttpSettings::from_config(config), credential)
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }

    /// Issue a GET and return the successful response without reading the body.
    pub async fn open(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus {
                    status: status.as_u16(),
                },
                status.to_string(),
            ));
        }
        Ok(response)
    }

    /// GET a whole body, enforcing the size limit and an optional content-type allow list.
    pub async fn get_bytes(
        &self,
        url: &str,
        allowed_content_types: &[&str],
    ) -> Result<FetchOutput, FetchError> {
        let response = self.open(url).await?;
        let max_bytes = self.settings.max_body_bytes;

        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes,
                        actual: Some(content_len),
                    },
                    "response too large",
                ));
            }
        }

        let final_url = response.url().to_string();
        let content_type = content_type_of(&response);

        if let Some(ct) = content_type.as_deref() {
            if !allowed_content_types.is_empty() && !is_content_type_allowed(ct, allowed_content_types)
            {
                return Err(FetchError::new(
                    FailureKind::UnsupportedContentType {
                        content_type: ct.to_string(),
                    },
                    "unsupported content type",
                ));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes,
                        actual: Some(next_len),
                    },
                    "response too large",
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        let metadata = FetchMetadata {
            requested_url: url.to_string(),
            final_url,
            content_type,
            byte_len: bytes.len() as u64,
        };

        Ok(FetchOutput { bytes, metadata })
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpSession {
    async fn fetch(
        &self,
        url: &str,
        allowed_content_types: &[&str],
    ) -> Result<FetchOutput, FetchError> {
        self.get_bytes(url, allowed_content_types).await
    }
}

/// Accepts either a bare session id or a full `substack.sid=...` cookie string.
pub(crate) fn session_cookie(raw: &str) -> String {
    if raw.contains(SESSION_COOKIE) {
        raw.to_string()
    } else {
        format!("{SESSION_COOKIE}{raw}")
    }
}

pub(crate) fn content_type_of(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

fn is_content_type_allowed(content_type: &str, allowed: &[&str]) -> bool {
    let ct = content_type.split(';').next().unwrap_or(content_type).trim();
    allowed.iter().any(|a| a.eq_ignore_ascii_case(ct))
}

fn header_value(value: &str) -> Result<HeaderValue, FetchError> {
    HeaderValue::from_str(value)
        .map_err(|err| FetchError::new(FailureKind::InvalidUrl, format!("invalid header value: {err}")))
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
