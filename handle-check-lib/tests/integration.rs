// handle-check-lib/tests/integration.rs

//! Integration tests for handle-check-lib probing against local servers

use futures::StreamExt;
use handle_check_lib::{
    BatchSummary, CheckConfig, OneOrMany, QueryStatus, ServiceDefinition, SiteCatalog, Strategy,
    UsernameChecker,
};
use httpmock::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn checker() -> UsernameChecker {
    UsernameChecker::with_config(
        CheckConfig::default()
            .with_concurrency(10)
            .with_timeout(Duration::from_secs(3)),
    )
}

/// Address of a port that refuses connections.
async fn closed_port() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

/// Accepts connections, reads the request and never answers.
async fn silent_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });
    addr.to_string()
}

#[tokio::test]
async fn test_status_code_site() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/a/alice");
            then.status(404);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/a/bob");
            then.status(200).body("<html>bob</html>");
        })
        .await;

    let catalog = SiteCatalog::new().with_site(
        "siteA",
        ServiceDefinition::new(server.url("/a/{}"), Strategy::StatusCode)
            .with_error_codes(vec![404]),
    );

    let alice = checker().check_username("alice", &catalog).await.unwrap();
    let outcome = alice.get("siteA").unwrap();
    assert_eq!(outcome.status, QueryStatus::Available);
    assert_eq!(outcome.url, server.url("/a/alice"));
    assert_eq!(outcome.http_status, Some(404));
    assert!(outcome.elapsed.is_some());
    assert!(outcome.body.is_none());

    let bob = checker().check_username("bob", &catalog).await.unwrap();
    assert_eq!(bob.get("siteA").unwrap().status, QueryStatus::Claimed);
}

#[tokio::test]
async fn test_message_site() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/b/alice");
            then.status(200).body("<html>Sorry, User not found</html>");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/b/bob");
            then.status(200).body("<html>bob's profile</html>");
        })
        .await;

    let catalog = SiteCatalog::new().with_site(
        "siteB",
        ServiceDefinition::new(server.url("/b/{}"), Strategy::Message)
            .with_error_msg("User not found"),
    );

    let alice = checker().check_username("alice", &catalog).await.unwrap();
    let outcome = alice.get("siteB").unwrap();
    assert_eq!(outcome.status, QueryStatus::Available);
    assert!(outcome.body.as_deref().unwrap().contains("User not found"));

    let bob = checker().check_username("bob", &catalog).await.unwrap();
    assert_eq!(bob.get("siteB").unwrap().status, QueryStatus::Claimed);
}

#[tokio::test]
async fn test_illegal_username_sends_no_request() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.any_request();
            then.status(200);
        })
        .await;

    let catalog = SiteCatalog::new().with_site(
        "strict",
        ServiceDefinition::new(server.url("/{}"), Strategy::StatusCode)
            .with_regex_check("^[a-z0-9]{3,15}$"),
    );

    let batch = checker().check_username("bad name!", &catalog).await.unwrap();
    let outcome = batch.get("strict").unwrap();
    assert_eq!(outcome.status, QueryStatus::Illegal);
    assert_eq!(outcome.url, "");
    assert_eq!(mock.hits_async().await, 0);
}

#[tokio::test]
async fn test_failures_stay_with_their_site() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/ok/alice");
            then.status(200);
        })
        .await;

    let refused = closed_port().await;
    let silent = silent_server().await;

    let catalog = SiteCatalog::new()
        .with_site(
            "healthy",
            ServiceDefinition::new(server.url("/ok/{}"), Strategy::StatusCode),
        )
        .with_site(
            "refused",
            ServiceDefinition::new(format!("http://{}/{{}}", refused), Strategy::StatusCode),
        )
        .with_site(
            "hanging",
            ServiceDefinition::new(format!("http://{}/{{}}", silent), Strategy::StatusCode),
        );

    let checker = UsernameChecker::with_config(
        CheckConfig::default().with_timeout(Duration::from_millis(400)),
    );
    let batch = checker.check_username("alice", &catalog).await.unwrap();

    assert_eq!(batch.len(), 3);
    assert_eq!(batch.get("healthy").unwrap().status, QueryStatus::Claimed);

    let refused = batch.get("refused").unwrap();
    assert_eq!(refused.status, QueryStatus::Unknown);
    assert!(refused.http_status.is_none());
    assert!(refused.error_message.is_some());

    let hanging = batch.get("hanging").unwrap();
    assert_eq!(hanging.status, QueryStatus::Unknown);
    assert!(hanging.error_message.as_deref().unwrap().contains("Timeout"));
}

#[tokio::test]
async fn test_coverage_matches_catalog() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.any_request();
            then.status(200).body("profile");
        })
        .await;
    let refused = closed_port().await;

    let mut catalog = SiteCatalog::new();
    for i in 0..20 {
        let definition = match i % 4 {
            0 => ServiceDefinition::new(server.url(&format!("/s{}/{{}}", i)), Strategy::StatusCode),
            1 => ServiceDefinition::new(server.url(&format!("/s{}/{{}}", i)), Strategy::Message)
                .with_error_msg("nope"),
            2 => ServiceDefinition::new(format!("http://{}/{{}}", refused), Strategy::ResponseUrl),
            _ => ServiceDefinition::new(server.url(&format!("/s{}/{{}}", i)), Strategy::StatusCode)
                .with_regex_check("^x$"),
        };
        catalog.insert(format!("site{:02}", i), definition);
    }

    let batch = checker().check_username("alice", &catalog).await.unwrap();
    let expected: BTreeSet<&String> = catalog.names().collect();
    let actual: BTreeSet<&String> = batch.outcomes.keys().collect();
    assert_eq!(expected, actual);

    let summary = BatchSummary::from_batch(&batch);
    assert_eq!(summary.total, 20);
    assert_eq!(summary.claimed, 10);
    assert_eq!(summary.unknown, 5);
    assert_eq!(summary.illegal, 5);
}

#[tokio::test]
async fn test_concurrency_ceiling_is_respected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    {
        let in_flight = Arc::clone(&in_flight);
        let max_seen = Arc::clone(&max_seen);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let in_flight = Arc::clone(&in_flight);
                let max_seen = Arc::clone(&max_seen);
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }

                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);

                    let _ = socket
                        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                        .await;
                });
            }
        });
    }

    let catalog: SiteCatalog = (0..12)
        .map(|i| {
            (
                format!("gate{}", i),
                ServiceDefinition::new(format!("http://{}/g{}/{{}}", addr, i), Strategy::StatusCode),
            )
        })
        .collect();

    let checker = UsernameChecker::with_config(
        CheckConfig::default()
            .with_concurrency(3)
            .with_timeout(Duration::from_secs(5)),
    );
    let batch = checker.check_username("alice", &catalog).await.unwrap();

    assert_eq!(batch.len(), 12);
    assert!(batch.iter().all(|(_, o)| o.status == QueryStatus::Claimed));
    let max = max_seen.load(Ordering::SeqCst);
    assert!(max <= 3, "saw {} requests in flight", max);
    assert!(max >= 1);
}

#[tokio::test]
async fn test_repeated_runs_agree() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.path("/x/alice");
            then.status(404);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.path("/y/alice");
            then.status(200).body("welcome alice");
        })
        .await;

    let catalog = SiteCatalog::new()
        .with_site(
            "x",
            ServiceDefinition::new(server.url("/x/{}"), Strategy::StatusCode),
        )
        .with_site(
            "y",
            ServiceDefinition::new(server.url("/y/{}"), Strategy::Message).with_error_msg("gone"),
        );

    let checker = checker();
    let first = checker.check_username("alice", &catalog).await.unwrap();
    let second = checker.check_username("alice", &catalog).await.unwrap();
    assert_eq!(first.statuses(), second.statuses());
}

#[tokio::test]
async fn test_redirect_handling_per_strategy() {
    let server = MockServer::start_async().await;
    let landing = server.url("/profile/alice");
    server
        .mock_async(|when, then| {
            when.path("/r/alice");
            then.status(302).header("Location", landing.as_str());
        })
        .await;
    server
        .mock_async(|when, then| {
            when.path("/e/alice");
            then.status(302).header("Location", "/not-found?from=alice");
        })
        .await;
    let status_redirect = server
        .mock_async(|when, then| {
            when.path("/s/alice");
            then.status(302).header("Location", "/landing");
        })
        .await;
    let landing_mock = server
        .mock_async(|when, then| {
            when.path("/landing");
            then.status(200);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.path("/profile/alice");
            then.status(200).body("alice");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.path("/not-found");
            then.status(200).body("no such user");
        })
        .await;

    let catalog = SiteCatalog::new()
        .with_site(
            "follows",
            ServiceDefinition::new(server.url("/r/{}"), Strategy::ResponseUrl),
        )
        .with_site(
            "error-page",
            ServiceDefinition::new(server.url("/e/{}"), Strategy::ErrorUrl)
                .with_error_url("/not-found"),
        )
        .with_site(
            "raw-status",
            ServiceDefinition::new(server.url("/s/{}"), Strategy::StatusCode),
        );

    let batch = checker().check_username("alice", &catalog).await.unwrap();
    assert_eq!(batch.get("follows").unwrap().status, QueryStatus::Claimed);
    assert_eq!(batch.get("error-page").unwrap().status, QueryStatus::Available);

    let raw = batch.get("raw-status").unwrap();
    assert_eq!(raw.status, QueryStatus::Available);
    assert_eq!(raw.http_status, Some(302));
    assert_eq!(status_redirect.hits_async().await, 1);
    assert_eq!(landing_mock.hits_async().await, 0);
}

#[tokio::test]
async fn test_redirect_limit() {
    let server = MockServer::start_async().await;
    let looping = server
        .mock_async(|when, then| {
            when.path("/loop/alice");
            then.status(302).header("Location", "/loop/alice");
        })
        .await;

    let catalog = SiteCatalog::new().with_site(
        "loop",
        ServiceDefinition::new(server.url("/loop/{}"), Strategy::ResponseUrl),
    );
    let checker = UsernameChecker::with_config(CheckConfig::default().with_max_redirects(3));
    let batch = checker.check_username("alice", &catalog).await.unwrap();

    assert_eq!(batch.get("loop").unwrap().status, QueryStatus::Available);
    assert_eq!(looping.hits_async().await, 4);
}

#[tokio::test]
async fn test_headers_are_interpolated() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.path("/api/alice")
                .header("X-Handle", "alice")
                .header("Authorization", "Bearer token-for-alice");
            then.status(200);
        })
        .await;

    let catalog = SiteCatalog::new().with_site(
        "api",
        ServiceDefinition::new(server.url("/api/{}"), Strategy::StatusCode)
            .with_header("X-Handle", "{}")
            .with_header("Authorization", "Bearer token-for-{}"),
    );

    let batch = checker().check_username("alice", &catalog).await.unwrap();
    assert_eq!(batch.get("api").unwrap().status, QueryStatus::Claimed);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_probe_url_is_fetched_and_profile_url_reported() {
    let server = MockServer::start_async().await;
    let probe = server
        .mock_async(|when, then| {
            when.path("/api/users/alice");
            then.status(200);
        })
        .await;
    let profile = server
        .mock_async(|when, then| {
            when.path("/u/alice");
            then.status(404);
        })
        .await;

    let catalog = SiteCatalog::new().with_site(
        "split",
        ServiceDefinition::new(server.url("/u/{}"), Strategy::StatusCode)
            .with_url_probe(server.url("/api/users/{}"))
            .with_url_main(server.url("/")),
    );

    let batch = checker().check_username("alice", &catalog).await.unwrap();
    let outcome = batch.get("split").unwrap();
    assert_eq!(outcome.status, QueryStatus::Claimed);
    assert_eq!(outcome.url, server.url("/u/alice"));
    assert_eq!(outcome.url_main.as_deref(), Some(server.url("/").as_str()));
    assert_eq!(probe.hits_async().await, 1);
    assert_eq!(profile.hits_async().await, 0);
}

#[tokio::test]
async fn test_bot_challenge_is_unknown() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.path("/cf/alice");
            then.status(403)
                .body("<html><span id=\"challenge-error-text\">Checking your browser</span></html>");
        })
        .await;

    let catalog = SiteCatalog::new().with_site(
        "guarded",
        ServiceDefinition::new(server.url("/cf/{}"), Strategy::StatusCode),
    );

    let batch = checker().check_username("alice", &catalog).await.unwrap();
    assert_eq!(batch.get("guarded").unwrap().status, QueryStatus::Unknown);
}

#[tokio::test]
async fn test_keywords_on_claimed_profiles() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.path("/k/alice");
            then.status(200).body("Alice writes Rust and some Go");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.path("/m/alice");
            then.status(404).body("Rust Go");
        })
        .await;

    let catalog = SiteCatalog::new()
        .with_site(
            "claimed",
            ServiceDefinition::new(server.url("/k/{}"), Strategy::StatusCode),
        )
        .with_site(
            "missing",
            ServiceDefinition::new(server.url("/m/{}"), Strategy::StatusCode),
        );

    let checker = UsernameChecker::with_config(
        CheckConfig::default().with_keywords(vec!["rust".to_string(), "python".to_string()]),
    );
    let batch = checker.check_username("alice", &catalog).await.unwrap();

    let claimed = batch.get("claimed").unwrap();
    assert_eq!(claimed.matched_keywords, vec!["rust".to_string()]);
    assert!(claimed.body.is_some());

    let missing = batch.get("missing").unwrap();
    assert_eq!(missing.status, QueryStatus::Available);
    assert!(missing.matched_keywords.is_empty());
}

#[tokio::test]
async fn test_listed_status_code_overrules_message() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.path("/multi/alice");
            then.status(404).body("<html>profile page</html>");
        })
        .await;

    let mut definition = ServiceDefinition::new(server.url("/multi/{}"), Strategy::Message)
        .with_error_msg("does not exist")
        .with_error_codes(vec![404]);
    definition.error_type = OneOrMany::Many(vec![Strategy::StatusCode, Strategy::Message]);
    let catalog = SiteCatalog::new().with_site("multi", definition);

    let batch = checker().check_username("alice", &catalog).await.unwrap();
    assert_eq!(batch.get("multi").unwrap().status, QueryStatus::Available);
}

#[tokio::test]
async fn test_stream_yields_every_site() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.any_request();
            then.status(200);
        })
        .await;
    let refused = closed_port().await;

    let catalog = SiteCatalog::new()
        .with_site("one", ServiceDefinition::new(server.url("/1/{}"), Strategy::StatusCode))
        .with_site("two", ServiceDefinition::new(server.url("/2/{}"), Strategy::ResponseUrl))
        .with_site(
            "down",
            ServiceDefinition::new(format!("http://{}/{{}}", refused), Strategy::StatusCode),
        );

    let outcomes: Vec<_> = checker()
        .check_username_stream("alice", &catalog)
        .unwrap()
        .collect()
        .await;

    assert_eq!(outcomes.len(), 3);
    let sites: BTreeSet<_> = outcomes.iter().map(|o| o.site.as_str()).collect();
    assert_eq!(sites, BTreeSet::from(["down", "one", "two"]));
    let down = outcomes.iter().find(|o| o.site == "down").unwrap();
    assert_eq!(down.status, QueryStatus::Unknown);
}

#[tokio::test]
async fn test_catalog_file_end_to_end() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.path("/gh/alice");
            then.status(200);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.path("/bb/alice");
            then.status(200).body("This user does not exist");
        })
        .await;

    let json = format!(
        r#"{{
            "$schema": "data.schema.json",
            "Hub": {{ "url": "{hub}", "errorType": "status_code" }},
            "Board": {{ "url": "{board}", "errorType": "message", "errorMsg": ["does not exist"] }},
            "Flaky": {{ "url": "{hub}", "errorType": "status_code" }}
        }}"#,
        hub = server.url("/gh/{}"),
        board = server.url("/bb/{}"),
    );

    let mut catalog = SiteCatalog::from_json_str(&json).unwrap();
    catalog.exclude(&handle_check_lib::parse_exclusions("Flaky\n"));

    let batch = checker().check_username("alice", &catalog).await.unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch.get("Hub").unwrap().status, QueryStatus::Claimed);
    assert_eq!(batch.get("Board").unwrap().status, QueryStatus::Available);
    assert_eq!(batch.claimed().count(), 1);
}
