//! Blocking HTTP seam shared by every upstream source.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use thiserror::Error;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Why a single upstream fetch produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("HTTP client build error: {0}")]
    ClientBuild(String),
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} was blocked with HTTP status {status}")]
    Blocked { url: String, status: u16 },
    #[error("unexpected HTTP status {status} from {url}")]
    HttpStatus { url: String, status: u16 },
    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },
    #[error("failed to parse {what}: {message}")]
    Parse { what: &'static str, message: String },
    #[error("insufficient data: {0}")]
    InsufficientData(String),
}

impl FetchError {
    pub fn parse(what: &'static str, message: impl ToString) -> Self {
        Self::Parse {
            what,
            message: message.to_string(),
        }
    }

    pub fn insufficient(message: impl Into<String>) -> Self {
        Self::InsufficientData(message.into())
    }

    /// Stable short label used as the `reason` log field.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ClientBuild(_) => "client_build",
            Self::Timeout { .. } => "timeout",
            Self::Blocked { .. } => "blocked",
            Self::HttpStatus { .. } => "http_status",
            Self::Transport { .. } => "transport",
            Self::Parse { .. } => "parse_error",
            Self::InsufficientData(_) => "insufficient_data",
        }
    }
}

pub trait HttpFetcher: Send + Sync {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

pub struct ReqwestBlockingFetcher {
    client: reqwest::blocking::Client,
}

impl ReqwestBlockingFetcher {
    pub fn new(cfg: &HttpConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        let agent = HeaderValue::from_str(&cfg.user_agent)
            .map_err(|err| FetchError::ClientBuild(err.to_string()))?;
        headers.insert(USER_AGENT, agent);
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .default_headers(headers)
            .build()
            .map_err(|err| FetchError::ClientBuild(err.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpFetcher for ReqwestBlockingFetcher {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| transport_error(url, &err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(url, status));
        }

        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|err| transport_error(url, &err))
    }
}

fn transport_error(url: &str, err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

fn status_error(url: &str, status: StatusCode) -> FetchError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            FetchError::Blocked {
                url: url.to_string(),
                status: status.as_u16(),
            }
        }
        other => FetchError::HttpStatus {
            url: url.to_string(),
            status: other.as_u16(),
        },
    }
}
