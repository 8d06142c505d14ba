//! Registry document loading
//!
//! A registry URL is either a file on disk (plain path or `file://`) or
//! an HTTP(S) endpoint. Remote fetches retry transient failures with an
//! exponentially growing per-attempt timeout and delay.

use std::path::PathBuf;
use std::time::Duration;

use backoff::ExponentialBackoff;
use reqwest::StatusCode;
use reqwest::blocking::Client;

use crate::model::RegistryDocument;
use crate::{Error, Result};

const USER_AGENT: &str = concat!("plugin-manager/", env!("CARGO_PKG_VERSION"));

/// Retry policy for remote registry fetches.
///
/// Attempt `n` (zero-based) uses a timeout of `initial_timeout * 2^n`; the
/// wait before attempt `n + 1` is `base_delay * 2^n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_timeout: Duration,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_timeout: Duration::from_secs(10),
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn timeout_for(&self, attempt: u32) -> Duration {
        self.initial_timeout.saturating_mul(2u32.saturating_pow(attempt))
    }

    fn backoff(&self) -> ExponentialBackoff {
        let max_interval = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(self.max_attempts));
        ExponentialBackoff {
            current_interval: self.base_delay,
            initial_interval: self.base_delay,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Load a registry document from `url`.
pub fn fetch_document(url: &str, policy: &RetryPolicy) -> Result<RegistryDocument> {
    match local_file(url) {
        Some(path) => load_local(url, &path),
        None => fetch_remote(url, policy),
    }
}

/// A URL names a local registry when it points at an existing file.
fn local_file(url: &str) -> Option<PathBuf> {
    let raw = url.strip_prefix("file://").unwrap_or(url);
    let path = PathBuf::from(raw);
    path.is_file().then_some(path)
}

fn load_local(url: &str, path: &std::path::Path) -> Result<RegistryDocument> {
    tracing::debug!(path = %path.display(), "Loading registry from local file");
    let content = std::fs::read_to_string(path).map_err(|e| Error::fetch(url, e))?;
    serde_json::from_str(&content).map_err(|e| Error::parse(url, e))
}

fn fetch_remote(url: &str, policy: &RetryPolicy) -> Result<RegistryDocument> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| Error::fetch(url, e))?;

    let mut attempt = 0u32;
    let operation = || {
        let timeout = policy.timeout_for(attempt);
        attempt += 1;
        tracing::debug!(url, attempt, max = policy.max_attempts, ?timeout, "Fetching registry");

        match fetch_once(&client, url, timeout) {
            Ok(document) => Ok(document),
            Err(Failure::Permanent(e)) => Err(backoff::Error::permanent(e)),
            Err(Failure::Transient(e)) if attempt >= policy.max_attempts => {
                Err(backoff::Error::permanent(e))
            }
            Err(Failure::Transient(e)) => Err(backoff::Error::transient(e)),
        }
    };
    let notify = |e: Error, wait: Duration| {
        tracing::warn!(url, error = %e, ?wait, "Registry fetch failed, retrying");
    };

    backoff::retry_notify(policy.backoff(), operation, notify).map_err(|e| match e {
        backoff::Error::Permanent(e) | backoff::Error::Transient { err: e, .. } => e,
    })
}

enum Failure {
    Transient(Error),
    Permanent(Error),
}

fn fetch_once(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> std::result::Result<RegistryDocument, Failure> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .map_err(|e| Failure::Transient(Error::fetch(url, e)))?;

    let status = response.status();
    if !status.is_success() {
        let error = Error::fetch(url, format!("HTTP {status}"));
        return Err(if is_transient(status) {
            Failure::Transient(error)
        } else {
            Failure::Permanent(error)
        });
    }

    let body = response
        .text()
        .map_err(|e| Failure::Transient(Error::fetch(url, e)))?;
    serde_json::from_str(&body).map_err(|e| Failure::Permanent(Error::parse(url, e)))
}

/// 404 and server errors may clear up; other client errors will not.
fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::NOT_FOUND || status.is_server_error()
}
