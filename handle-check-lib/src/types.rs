//! Core data types for username probing.
//!
//! This module defines the main data structures used throughout the library:
//! per-site outcomes, the batch that collects them, classification strategies
//! and the checker configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Browser User-Agent sent with every probe unless configured otherwise.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Upper bound for the concurrency ceiling.
pub const MAX_CONCURRENCY: usize = 1000;

/// Classification status of one site for one username.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    /// An account with this username exists on the site
    Claimed,

    /// No account with this username exists on the site
    Available,

    /// The probe could not be classified (network failure, timeout,
    /// challenge page, misconfigured site entry)
    Unknown,

    /// The username does not satisfy the site's own username rule and
    /// was never sent to the site
    Illegal,
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryStatus::Claimed => write!(f, "Claimed"),
            QueryStatus::Available => write!(f, "Available"),
            QueryStatus::Unknown => write!(f, "Unknown"),
            QueryStatus::Illegal => write!(f, "Illegal"),
        }
    }
}

/// Rule family used to turn a site's response into a status.
///
/// Catalog files name these `message`, `status_code`, `response_url` and
/// `errorUrl`. Any other name is kept verbatim as `Unrecognized`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Strategy {
    /// Look for known "not found" messages in the body
    Message,

    /// Look at the raw HTTP status code (redirects not followed)
    StatusCode,

    /// Look at the status after following redirects
    ResponseUrl,

    /// Look for a known error page in the final URL
    ErrorUrl,

    /// A strategy name this library does not know
    Unrecognized(String),
}

impl Strategy {
    /// Name as it appears in catalog files.
    pub fn as_str(&self) -> &str {
        match self {
            Strategy::Message => "message",
            Strategy::StatusCode => "status_code",
            Strategy::ResponseUrl => "response_url",
            Strategy::ErrorUrl => "errorUrl",
            Strategy::Unrecognized(name) => name,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Strategy::Unrecognized(_))
    }
}

impl From<String> for Strategy {
    fn from(name: String) -> Self {
        match name.as_str() {
            "message" => Strategy::Message,
            "status_code" => Strategy::StatusCode,
            "response_url" => Strategy::ResponseUrl,
            "errorUrl" | "error_url" => Strategy::ErrorUrl,
            _ => Strategy::Unrecognized(name),
        }
    }
}

impl From<&str> for Strategy {
    fn from(name: &str) -> Self {
        Strategy::from(name.to_string())
    }
}

impl From<Strategy> for String {
    fn from(strategy: Strategy) -> Self {
        strategy.as_str().to_string()
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of probing one site for one username.
///
/// Exactly one outcome exists per catalog entry per batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeOutcome {
    /// Catalog name of the site (e.g., "GitHub")
    pub site: String,

    /// The username that was checked
    pub username: String,

    /// Classification of the site's response
    pub status: QueryStatus,

    /// Profile URL for this username; empty when the username was rejected
    /// by the site's username rule
    pub url: String,

    /// Home page of the site, when the catalog provides one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_main: Option<String>,

    /// HTTP status of the final response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,

    /// How long the request took
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<Duration>,

    /// Response body, kept only when classification or keyword matching
    /// needs it
    #[serde(skip)]
    pub body: Option<String>,

    /// Keywords found in the body of a claimed profile
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_keywords: Vec<String>,

    /// Why the probe ended up unknown, if it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ProbeOutcome {
    /// Outcome for a username rejected by the site's username rule.
    pub fn illegal<S: Into<String>, U: Into<String>>(
        site: S,
        username: U,
        url_main: Option<String>,
    ) -> Self {
        Self {
            site: site.into(),
            username: username.into(),
            status: QueryStatus::Illegal,
            url: String::new(),
            url_main,
            http_status: None,
            elapsed: None,
            body: None,
            matched_keywords: Vec::new(),
            error_message: None,
        }
    }

    /// Outcome for a probe that failed or could not be classified.
    pub fn unknown<S: Into<String>, U: Into<String>, L: Into<String>, R: Into<String>>(
        site: S,
        username: U,
        url: L,
        url_main: Option<String>,
        reason: R,
    ) -> Self {
        Self {
            site: site.into(),
            username: username.into(),
            status: QueryStatus::Unknown,
            url: url.into(),
            url_main,
            http_status: None,
            elapsed: None,
            body: None,
            matched_keywords: Vec::new(),
            error_message: Some(reason.into()),
        }
    }

    pub fn is_claimed(&self) -> bool {
        self.status == QueryStatus::Claimed
    }
}

/// All outcomes of one batch, keyed by site name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeBatch {
    /// The username that was checked
    pub username: String,

    /// One outcome per catalog entry
    pub outcomes: BTreeMap<String, ProbeOutcome>,

    /// Wall-clock duration of the whole batch
    pub elapsed: Duration,
}

impl ProbeBatch {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn get(&self, site: &str) -> Option<&ProbeOutcome> {
        self.outcomes.get(site)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ProbeOutcome)> {
        self.outcomes.iter()
    }

    /// Outcomes classified as claimed, in site-name order.
    pub fn claimed(&self) -> impl Iterator<Item = &ProbeOutcome> {
        self.outcomes.values().filter(|o| o.is_claimed())
    }

    /// Status for each site, for comparing runs.
    pub fn statuses(&self) -> BTreeMap<&str, QueryStatus> {
        self.outcomes
            .iter()
            .map(|(site, outcome)| (site.as_str(), outcome.status))
            .collect()
    }
}

/// Configuration options for probing operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Maximum number of probes in flight at once
    /// Default: 100, Range: 1-1000
    pub concurrency: usize,

    /// Timeout for each individual probe
    /// Default: 5 seconds
    #[serde(skip)]
    pub timeout: Duration,

    /// User-Agent header sent with every probe
    pub user_agent: String,

    /// Skip TLS certificate validation
    /// Default: true (many sites in the catalog have broken chains)
    pub accept_invalid_certs: bool,

    /// Order in which declared strategies are evaluated
    /// Default: message, status_code, response_url, errorUrl
    pub strategy_order: Vec<Strategy>,

    /// Keywords looked up in the body of claimed profiles
    /// Default: empty
    pub keywords: Vec<String>,

    /// Maximum number of redirects followed for strategies that follow them
    /// Default: 10
    pub max_redirects: usize,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            concurrency: 100,
            timeout: Duration::from_secs(5),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_invalid_certs: true,
            strategy_order: vec![
                Strategy::Message,
                Strategy::StatusCode,
                Strategy::ResponseUrl,
                Strategy::ErrorUrl,
            ],
            keywords: Vec::new(),
            max_redirects: 10,
        }
    }
}

impl CheckConfig {
    /// Set the concurrency ceiling.
    ///
    /// Clamped to 1..=1000.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }

    /// Set the per-probe timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Enable or disable TLS certificate validation.
    pub fn with_accept_invalid_certs(mut self, enabled: bool) -> Self {
        self.accept_invalid_certs = enabled;
        self
    }

    /// Set the strategy evaluation order.
    pub fn with_strategy_order(mut self, order: Vec<Strategy>) -> Self {
        self.strategy_order = order;
        self
    }

    /// Set keywords looked up in claimed profile bodies.
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }
}
