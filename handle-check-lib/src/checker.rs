//! Main username checker implementation.
//!
//! `UsernameChecker` fans out one probe per catalog entry under a global
//! concurrency ceiling, sharing one connection-pooled HTTP client for the
//! whole batch. Each probe returns a plain `ProbeOutcome`; a failed probe
//! becomes `Unknown` for its site and never aborts the batch.

use crate::classify::{self, ProbeResponse};
use crate::error::HandleCheckError;
use crate::interpolate::{interpolate, interpolate_str, url_username};
use crate::site::{ServiceDefinition, SiteCatalog};
use crate::types::{CheckConfig, ProbeBatch, ProbeOutcome, QueryStatus, MAX_CONCURRENCY};
use crate::utils::{match_keywords, satisfies_rule, validate_username};
use futures::stream::{BoxStream, FuturesUnordered, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, LOCATION};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Probes spawned for one batch: site name, its `urlMain` and the task
/// computing its outcome.
type SpawnedProbes = Vec<(String, Option<String>, JoinHandle<ProbeOutcome>)>;

/// Coordinates username probing across a site catalog.
///
/// # Example
///
/// ```rust,no_run
/// use handle_check_lib::{CheckConfig, ServiceDefinition, SiteCatalog, Strategy, UsernameChecker};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let catalog = SiteCatalog::new().with_site(
///         "GitHub",
///         ServiceDefinition::new("https://github.com/{}", Strategy::StatusCode),
///     );
///     let checker = UsernameChecker::with_config(CheckConfig::default().with_concurrency(50));
///     let batch = checker.check_username("alice", &catalog).await?;
///     for outcome in batch.claimed() {
///         println!("[+] {}: {}", outcome.site, outcome.url);
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct UsernameChecker {
    /// Configuration settings for this checker instance
    config: CheckConfig,
}

impl UsernameChecker {
    /// Create a new checker with default configuration.
    ///
    /// Default settings:
    /// - Concurrency: 100
    /// - Timeout: 5 seconds
    /// - TLS validation: relaxed
    /// - Strategy order: message, status_code, response_url, error_url
    pub fn new() -> Self {
        Self::with_config(CheckConfig::default())
    }

    /// Create a new checker with custom configuration.
    pub fn with_config(config: CheckConfig) -> Self {
        Self { config }
    }

    /// Get the current configuration for this checker.
    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    /// Replace the configuration. Takes effect for the next batch.
    pub fn set_config(&mut self, config: CheckConfig) {
        self.config = config;
    }

    /// Probes allowed in flight. The config field is public, so it is
    /// clamped here as well as in `with_concurrency`.
    fn ceiling(&self) -> usize {
        self.config.concurrency.clamp(1, MAX_CONCURRENCY)
    }

    /// Build the HTTP client shared by every probe of one batch.
    ///
    /// Redirects are never followed by the client itself; `fetch` follows
    /// them by hand for the strategies that want them, so a single
    /// connection pool serves every site.
    pub fn build_client(&self) -> Result<reqwest::Client, HandleCheckError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        reqwest::Client::builder()
            .user_agent(self.config.user_agent.as_str())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(self.config.accept_invalid_certs)
            .pool_max_idle_per_host(self.ceiling())
            .timeout(self.config.timeout + Duration::from_secs(2)) // Add buffer for the probe timeout
            .build()
            .map_err(|e| {
                HandleCheckError::network_with_source("Failed to create HTTP client", e.to_string())
            })
    }

    /// Probe every site in the catalog for `username`.
    ///
    /// Returns once every probe has finished. The batch holds exactly one
    /// outcome per catalog entry.
    ///
    /// # Errors
    ///
    /// Only batch-level problems are errors: an empty username or an HTTP
    /// client that cannot be constructed. Per-site failures are reported as
    /// `QueryStatus::Unknown` outcomes.
    pub async fn check_username(
        &self,
        username: &str,
        catalog: &SiteCatalog,
    ) -> Result<ProbeBatch, HandleCheckError> {
        let start_time = Instant::now();
        let probes = self.spawn_probes(username, catalog)?;

        let (sites, handles): (Vec<_>, Vec<_>) = probes
            .into_iter()
            .map(|(site, url_main, handle)| ((site, url_main), handle))
            .unzip();
        let joined = futures::future::join_all(handles).await;

        let mut outcomes = BTreeMap::new();
        for ((site, url_main), result) in sites.into_iter().zip(joined) {
            let outcome = result.unwrap_or_else(|e| lost_probe(&site, username, url_main, e));
            outcomes.insert(site, outcome);
        }

        let elapsed = start_time.elapsed();
        info!(
            username,
            sites = outcomes.len(),
            claimed = outcomes.values().filter(|o| o.is_claimed()).count(),
            elapsed_ms = elapsed.as_millis() as u64,
            "batch finished"
        );

        Ok(ProbeBatch {
            username: username.to_string(),
            outcomes,
            elapsed,
        })
    }

    /// Probe every site and yield outcomes as they complete.
    ///
    /// Same ceiling and failure handling as [`check_username`](Self::check_username);
    /// the stream yields exactly one outcome per catalog entry, in completion
    /// order. Must be called from within a Tokio runtime.
    pub fn check_username_stream(
        &self,
        username: &str,
        catalog: &SiteCatalog,
    ) -> Result<BoxStream<'static, ProbeOutcome>, HandleCheckError> {
        let probes = self.spawn_probes(username, catalog)?;
        let username = username.to_string();

        let pending: FuturesUnordered<_> = probes
            .into_iter()
            .map(|(site, url_main, handle)| {
                let username = username.clone();
                async move {
                    handle
                        .await
                        .unwrap_or_else(|e| lost_probe(&site, &username, url_main, e))
                }
            })
            .collect();

        Ok(pending.boxed())
    }

    /// Spawn one probe task per catalog entry.
    ///
    /// All tasks share one client and one semaphore sized to the concurrency
    /// ceiling. The client is dropped once the last task finishes.
    fn spawn_probes(
        &self,
        username: &str,
        catalog: &SiteCatalog,
    ) -> Result<SpawnedProbes, HandleCheckError> {
        validate_username(username)?;
        let client = self.build_client()?;
        let limiter = Arc::new(Semaphore::new(self.ceiling()));

        info!(
            username,
            sites = catalog.len(),
            concurrency = self.ceiling(),
            "starting batch"
        );

        let probes = catalog
            .iter()
            .map(|(site, definition)| {
                let checker = self.clone();
                let client = client.clone();
                let limiter = Arc::clone(&limiter);
                let task_site = site.clone();
                let definition = definition.clone();
                let url_main = definition.url_main.clone();
                let username = username.to_string();

                let handle = tokio::spawn(async move {
                    let _permit = match limiter.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return ProbeOutcome::unknown(
                                task_site,
                                username,
                                String::new(),
                                definition.url_main.clone(),
                                "concurrency limiter closed",
                            )
                        }
                    };
                    checker
                        .check_site(&client, &username, &task_site, &definition)
                        .await
                });

                (site.clone(), url_main, handle)
            })
            .collect();

        Ok(probes)
    }

    /// Probe a single site.
    ///
    /// Never fails: anything that goes wrong becomes an `Unknown` outcome.
    /// Callers are responsible for any concurrency limiting.
    pub async fn check_site(
        &self,
        client: &reqwest::Client,
        username: &str,
        site: &str,
        definition: &ServiceDefinition,
    ) -> ProbeOutcome {
        let escaped = url_username(username);
        let url = interpolate_str(&definition.url, &escaped);
        let url_main = definition.url_main.clone();

        if let Some(pattern) = &definition.regex_check {
            match satisfies_rule(pattern, username) {
                Ok(false) => {
                    debug!(site, username, "username rejected by site rule");
                    return ProbeOutcome::illegal(site, username, url_main);
                }
                Ok(true) => {}
                Err(e) => {
                    warn!(site, error = %e, "unusable regexCheck in catalog");
                    return ProbeOutcome::unknown(site, username, url, url_main, e.to_string());
                }
            }
        }

        let probe_url = definition
            .url_probe
            .as_deref()
            .map(|template| interpolate_str(template, &escaped))
            .unwrap_or_else(|| url.clone());
        let headers = definition
            .headers
            .as_ref()
            .map(|h| interpolate(&serde_json::Value::Object(h.clone()), &escaped));

        let start_time = Instant::now();
        let fetched = tokio::time::timeout(
            self.config.timeout,
            self.fetch(
                client,
                &probe_url,
                headers.as_ref(),
                classify::follows_redirects(definition),
            ),
        )
        .await;
        let elapsed = start_time.elapsed();

        let response = match fetched {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                debug!(site, url = %probe_url, error = %e, "probe failed");
                return ProbeOutcome::unknown(site, username, url, url_main, e.to_string());
            }
            Err(_) => {
                debug!(site, url = %probe_url, "probe timed out");
                let e = HandleCheckError::timeout("site probe", self.config.timeout);
                return ProbeOutcome::unknown(site, username, url, url_main, e.to_string());
            }
        };

        let status = classify::classify(definition, &response, &self.config.strategy_order);
        debug!(
            site,
            http_status = response.status,
            status = %status,
            elapsed_ms = elapsed.as_millis() as u64,
            "probe classified"
        );

        let matched_keywords = if status == QueryStatus::Claimed {
            match_keywords(&response.body, &self.config.keywords)
        } else {
            Vec::new()
        };
        let keep_body = classify::needs_body(definition) || !self.config.keywords.is_empty();
        let error_message = (status == QueryStatus::Unknown)
            .then(|| "response could not be classified".to_string());

        ProbeOutcome {
            site: site.to_string(),
            username: username.to_string(),
            status,
            url,
            url_main,
            http_status: Some(response.status),
            elapsed: Some(elapsed),
            body: keep_body.then_some(response.body),
            matched_keywords,
            error_message,
        }
    }

    /// Issue the GET, following redirects by hand when asked to.
    async fn fetch(
        &self,
        client: &reqwest::Client,
        url: &str,
        headers: Option<&serde_json::Value>,
        follow_redirects: bool,
    ) -> Result<ProbeResponse, HandleCheckError> {
        let mut current = reqwest::Url::parse(url).map_err(|e| {
            HandleCheckError::network_with_source(format!("Invalid probe URL '{}'", url), e.to_string())
        })?;
        let mut hops = 0;

        loop {
            let mut request = client.get(current.clone());
            if let Some(serde_json::Value::Object(extra)) = headers {
                for (name, value) in extra {
                    let value = match value {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    request = request.header(name.as_str(), value);
                }
            }

            let response = request.send().await?;
            let status = response.status();

            if follow_redirects && status.is_redirection() && hops < self.config.max_redirects {
                let next = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|location| location.to_str().ok())
                    .and_then(|location| current.join(location).ok());
                if let Some(next) = next {
                    hops += 1;
                    current = next;
                    continue;
                }
            }

            let final_url = response.url().to_string();
            let body = response.text().await?;
            return Ok(ProbeResponse {
                status: status.as_u16(),
                final_url,
                body,
            });
        }
    }
}

impl Default for UsernameChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome for a probe task that ended without producing one (panic or abort).
fn lost_probe(
    site: &str,
    username: &str,
    url_main: Option<String>,
    error: tokio::task::JoinError,
) -> ProbeOutcome {
    warn!(site, error = %error, "probe task did not complete");
    ProbeOutcome::unknown(
        site,
        username,
        String::new(),
        url_main,
        format!("probe task failed: {}", error),
    )
}
