//! Response classification.
//!
//! Turns a completed probe response into a [`QueryStatus`] using the
//! strategies a site declares. Strategies are evaluated in the configured
//! priority order. `Available` ends evaluation; `Claimed` holds only until a
//! later declared strategy says otherwise.

use crate::site::ServiceDefinition;
use crate::types::{QueryStatus, Strategy};
use tracing::debug;

/// Fragments emitted by common anti-bot challenge pages (Cloudflare, AWS WAF,
/// PerimeterX). A page containing any of these says nothing about the account.
pub const CHALLENGE_MARKERS: &[&str] = &[
    ".loading-spinner{visibility:hidden}body.no-js .challenge-running{display:none}",
    "<span id=\"challenge-error-text\">",
    "AwsWafIntegration.forceRefreshToken",
    "{return l.onPageView}}),Object.defineProperty(r,\"perimeterxIdentifiers\"",
];

/// What the classifier needs to know about a finished request.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResponse {
    /// Status of the final response
    pub status: u16,

    /// URL of the final response, after any redirects that were followed
    pub final_url: String,

    /// Decoded response body
    pub body: String,
}

impl ProbeResponse {
    pub fn new<U: Into<String>, B: Into<String>>(status: u16, final_url: U, body: B) -> Self {
        Self {
            status,
            final_url: final_url.into(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Whether the body is an anti-bot interstitial.
pub fn is_bot_challenge(body: &str) -> bool {
    CHALLENGE_MARKERS.iter().any(|marker| body.contains(marker))
}

/// Whether redirects should be followed when probing this site.
///
/// The raw status code is the signal for `status_code` sites, so they are
/// never followed there.
pub fn follows_redirects(site: &ServiceDefinition) -> bool {
    !site.declares(&Strategy::StatusCode)
}

/// Whether classification reads the response body.
pub fn needs_body(site: &ServiceDefinition) -> bool {
    site.declares(&Strategy::Message)
}

/// Classify a response for a site.
///
/// `order` is the strategy priority; declared strategies missing from it are
/// evaluated afterwards in declaration order. A site with no recognized
/// strategy falls back to the 2xx test, and one whose strategies all lack
/// the data they need is `Unknown`.
pub fn classify(site: &ServiceDefinition, response: &ProbeResponse, order: &[Strategy]) -> QueryStatus {
    if is_bot_challenge(&response.body) {
        debug!(url = %response.final_url, "bot challenge page detected");
        return QueryStatus::Unknown;
    }

    let strategies = ordered_strategies(site, order);
    if strategies.is_empty() {
        return success_test(response);
    }

    let mut verdict = QueryStatus::Unknown;
    for strategy in strategies {
        match evaluate(strategy, site, response) {
            Some(QueryStatus::Available) => return QueryStatus::Available,
            Some(status) => verdict = status,
            None => debug!(strategy = %strategy, "strategy inconclusive"),
        }
    }

    verdict
}

/// Recognized strategies declared by the site, in evaluation order.
fn ordered_strategies<'a>(site: &'a ServiceDefinition, order: &'a [Strategy]) -> Vec<&'a Strategy> {
    let declared: Vec<&Strategy> = site
        .strategies()
        .iter()
        .filter(|s| s.is_recognized())
        .collect();

    let mut ordered: Vec<&Strategy> = order
        .iter()
        .filter(|s| declared.contains(s))
        .collect();
    for strategy in declared {
        if !ordered.contains(&strategy) {
            ordered.push(strategy);
        }
    }
    ordered
}

/// Evaluate one strategy. `None` when the site entry lacks what the
/// strategy needs.
fn evaluate(strategy: &Strategy, site: &ServiceDefinition, response: &ProbeResponse) -> Option<QueryStatus> {
    match strategy {
        Strategy::Message => {
            let messages = site.error_msg.as_ref().filter(|m| !m.is_empty())?;
            let found = messages
                .iter()
                .any(|message| response.body.contains(message.as_str()));
            Some(if found {
                QueryStatus::Available
            } else {
                QueryStatus::Claimed
            })
        }
        Strategy::StatusCode => {
            let listed = site
                .error_code
                .as_ref()
                .is_some_and(|codes| codes.contains(&response.status));
            if listed {
                Some(QueryStatus::Available)
            } else {
                Some(success_test(response))
            }
        }
        Strategy::ResponseUrl => Some(success_test(response)),
        Strategy::ErrorUrl => {
            let redirected_to_error = site
                .error_url
                .as_deref()
                .filter(|fragment| !fragment.is_empty())
                .is_some_and(|fragment| response.final_url.contains(fragment));
            if redirected_to_error {
                Some(QueryStatus::Available)
            } else {
                Some(success_test(response))
            }
        }
        Strategy::Unrecognized(_) => None,
    }
}

/// 2xx means the profile exists, anything else means it does not.
fn success_test(response: &ProbeResponse) -> QueryStatus {
    if response.is_success() {
        QueryStatus::Claimed
    } else {
        QueryStatus::Available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::OneOrMany;
    use crate::types::CheckConfig;

    fn order() -> Vec<Strategy> {
        CheckConfig::default().strategy_order
    }

    fn response(status: u16, body: &str) -> ProbeResponse {
        ProbeResponse::new(status, "http://x/alice", body)
    }

    #[test]
    fn test_message_strategy() {
        let site = ServiceDefinition::new("http://y/{}", Strategy::Message).with_error_msg("not found");
        assert_eq!(
            classify(&site, &response(200, "User not found"), &order()),
            QueryStatus::Available
        );
        assert_eq!(
            classify(&site, &response(200, "<html>profile</html>"), &order()),
            QueryStatus::Claimed
        );
    }

    #[test]
    fn test_message_strategy_with_list() {
        let mut site = ServiceDefinition::new("http://y/{}", Strategy::Message);
        site.error_msg = Some(OneOrMany::Many(vec![
            "no such user".to_string(),
            "page missing".to_string(),
        ]));
        assert_eq!(
            classify(&site, &response(200, "sorry, page missing"), &order()),
            QueryStatus::Available
        );
        assert_eq!(
            classify(&site, &response(200, "welcome"), &order()),
            QueryStatus::Claimed
        );
    }

    #[test]
    fn test_message_strategy_without_messages_is_unknown() {
        let site = ServiceDefinition::new("http://y/{}", Strategy::Message);
        assert_eq!(
            classify(&site, &response(200, "anything"), &order()),
            QueryStatus::Unknown
        );
    }

    #[test]
    fn test_status_code_strategy() {
        let site = ServiceDefinition::new("http://x/{}", Strategy::StatusCode).with_error_codes(vec![404, 410]);
        assert_eq!(classify(&site, &response(404, ""), &order()), QueryStatus::Available);
        assert_eq!(classify(&site, &response(410, ""), &order()), QueryStatus::Available);
        assert_eq!(classify(&site, &response(200, ""), &order()), QueryStatus::Claimed);
        assert_eq!(classify(&site, &response(204, ""), &order()), QueryStatus::Claimed);
        assert_eq!(classify(&site, &response(301, ""), &order()), QueryStatus::Available);
        assert_eq!(classify(&site, &response(500, ""), &order()), QueryStatus::Available);
    }

    #[test]
    fn test_status_code_listed_success_code_is_available() {
        let site = ServiceDefinition::new("http://x/{}", Strategy::StatusCode).with_error_codes(vec![200]);
        assert_eq!(classify(&site, &response(200, ""), &order()), QueryStatus::Available);
    }

    #[test]
    fn test_response_url_strategy() {
        let site = ServiceDefinition::new("http://x/{}", Strategy::ResponseUrl);
        assert_eq!(classify(&site, &response(200, ""), &order()), QueryStatus::Claimed);
        assert_eq!(classify(&site, &response(404, ""), &order()), QueryStatus::Available);
    }

    #[test]
    fn test_error_url_strategy() {
        let site = ServiceDefinition::new("http://x/{}", Strategy::ErrorUrl).with_error_url("/404");
        let redirected = ProbeResponse::new(200, "http://x/404?from=alice", "");
        assert_eq!(classify(&site, &redirected, &order()), QueryStatus::Available);
        assert_eq!(classify(&site, &response(200, ""), &order()), QueryStatus::Claimed);
        assert_eq!(classify(&site, &response(403, ""), &order()), QueryStatus::Available);
    }

    #[test]
    fn test_unrecognized_strategy_falls_back_to_success_test() {
        let site = ServiceDefinition::new("http://x/{}", Strategy::from("something_new"));
        assert_eq!(classify(&site, &response(200, ""), &order()), QueryStatus::Claimed);
        assert_eq!(classify(&site, &response(404, ""), &order()), QueryStatus::Available);

        let bare = ServiceDefinition {
            url: "http://x/{}".to_string(),
            ..Default::default()
        };
        assert_eq!(classify(&bare, &response(200, ""), &order()), QueryStatus::Claimed);
    }

    #[test]
    fn test_message_then_status_code() {
        let mut site = ServiceDefinition::new("http://x/{}", Strategy::Message)
            .with_error_msg("not found")
            .with_error_codes(vec![404]);
        site.error_type = OneOrMany::Many(vec![Strategy::StatusCode, Strategy::Message]);

        // Message runs first even though status_code is declared first.
        assert_eq!(
            classify(&site, &response(200, "user not found"), &order()),
            QueryStatus::Available
        );
        // No error text in the body, but the listed status code overrules it.
        assert_eq!(
            classify(&site, &response(404, "<html></html>"), &order()),
            QueryStatus::Available
        );
        assert_eq!(
            classify(&site, &response(200, "<html></html>"), &order()),
            QueryStatus::Claimed
        );
    }

    #[test]
    fn test_claimed_is_checked_by_response_url() {
        let mut site = ServiceDefinition::new("http://x/{}", Strategy::Message).with_error_msg("gone");
        site.error_type = OneOrMany::Many(vec![Strategy::Message, Strategy::ResponseUrl]);
        assert_eq!(
            classify(&site, &response(500, "<html>oops</html>"), &order()),
            QueryStatus::Available
        );
        assert_eq!(
            classify(&site, &response(200, "<html>hi</html>"), &order()),
            QueryStatus::Claimed
        );
    }

    #[test]
    fn test_inconclusive_message_falls_through_to_status_code() {
        let mut site = ServiceDefinition::new("http://x/{}", Strategy::Message)
            .with_error_codes(vec![404]);
        site.error_type = OneOrMany::Many(vec![Strategy::Message, Strategy::StatusCode]);

        assert_eq!(
            classify(&site, &response(404, "whatever"), &order()),
            QueryStatus::Available
        );
        assert_eq!(
            classify(&site, &response(200, "whatever"), &order()),
            QueryStatus::Claimed
        );
    }

    #[test]
    fn test_custom_order() {
        let mut site = ServiceDefinition::new("http://x/{}", Strategy::Message).with_error_msg("gone");
        site.error_type = OneOrMany::Many(vec![Strategy::Message, Strategy::ResponseUrl]);
        let order = vec![Strategy::ResponseUrl, Strategy::Message];
        assert_eq!(
            classify(&site, &response(200, "gone"), &order),
            QueryStatus::Available
        );
    }

    #[test]
    fn test_bot_challenge_short_circuits() {
        let site = ServiceDefinition::new("http://x/{}", Strategy::StatusCode);
        let body = "<html><span id=\"challenge-error-text\">Enable JavaScript</span></html>";
        assert_eq!(classify(&site, &response(200, body), &order()), QueryStatus::Unknown);
        assert!(is_bot_challenge("x AwsWafIntegration.forceRefreshToken() y"));
        assert!(!is_bot_challenge("<html>profile</html>"));
    }

    #[test]
    fn test_redirect_policy() {
        assert!(!follows_redirects(&ServiceDefinition::new("u", Strategy::StatusCode)));
        assert!(follows_redirects(&ServiceDefinition::new("u", Strategy::ResponseUrl)));
        assert!(follows_redirects(&ServiceDefinition::new("u", Strategy::Message)));
        assert!(needs_body(&ServiceDefinition::new("u", Strategy::Message)));
        assert!(!needs_body(&ServiceDefinition::new("u", Strategy::StatusCode)));
    }
}
