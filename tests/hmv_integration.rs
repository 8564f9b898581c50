//! End-to-end runs of the authenticated-catalog crawler against a mock site.

use std::time::Duration;

use vmcrawler::config::HmvDelays;
use vmcrawler::{CrawlError, Credentials, DelayRange, HmvConfig, HmvCrawler, RateLimiter};
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into(), "text/html")
}

fn listing(names: &[&str]) -> String {
    names
        .iter()
        .map(|name| {
            format!(
                r#"<div class="col"><h4 class="vmname"><a href="/machines/machine.php?vm={name}">{name}</a></h4></div>"#
            )
        })
        .collect()
}

fn machine_page(name: &str) -> String {
    format!(
        r#"<h1>{name}</h1><div class="d-flex mt-4"><a class="btn download" href="/download/?vm={name}">Download</a></div>"#
    )
}

fn config(server: &MockServer, dir: &tempfile::TempDir) -> HmvConfig {
    HmvConfig {
        base_url: server.uri(),
        max_pages: 2,
        output_path: dir.path().join("hmv_links.txt"),
        log_path: dir.path().join("hmv_logs.txt"),
        delays: HmvDelays {
            before_redirect: DelayRange::ZERO,
            per_machine: DelayRange::ZERO,
            per_page: DelayRange::ZERO,
        },
        ..HmvConfig::default()
    }
}

fn credentials() -> Credentials {
    Credentials::new("player", "secret")
}

async fn mount_login_success(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/login/auth.php"))
        .and(body_string_contains("admin=player"))
        .and(body_string_contains("password_usuario=secret"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", format!("{}/dashboard/", server.uri()).as_str()),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dashboard/"))
        .respond_with(html("<p>Welcome</p>"))
        .mount(server)
        .await;
}

/// Machine page whose download button redirects to `target`.
async fn mount_machine(server: &MockServer, name: &str, target: &str) {
    Mock::given(method("GET"))
        .and(path("/machines/machine.php"))
        .and(query_param("vm", name))
        .respond_with(html(machine_page(name)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/download/"))
        .and(query_param("vm", name))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", format!("{}{target}", server.uri()).as_str()),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(target))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

#[tokio::test]
async fn listing_returns_every_entry_in_order() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path("/machines/"))
        .and(query_param("p", "1"))
        .respond_with(html(listing(&["Alpha", "Beta", "Gamma", "Delta"])))
        .mount(&server)
        .await;

    let crawler = HmvCrawler::new(config(&server, &dir), RateLimiter::disabled()).unwrap();
    let links = crawler.machine_links(1).await;

    let expected: Vec<String> = ["Alpha", "Beta", "Gamma", "Delta"]
        .iter()
        .map(|name| format!("{}/machines/machine.php?vm={name}", server.uri()))
        .collect();
    assert_eq!(links, expected);
}

#[tokio::test]
async fn listing_error_is_empty() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path("/machines/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let crawler = HmvCrawler::new(config(&server, &dir), RateLimiter::disabled()).unwrap();
    assert!(crawler.machine_links(1).await.is_empty());
}

#[tokio::test]
async fn redirect_to_file_host_is_resolved() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_machine(&server, "Alpha", "/mega.nz/file/ALPHA").await;

    let crawler = HmvCrawler::new(config(&server, &dir), RateLimiter::disabled()).unwrap();
    let anchor = crawler
        .download_anchor(&format!("{}/machines/machine.php?vm=Alpha", server.uri()))
        .await
        .unwrap();
    assert_eq!(anchor, format!("{}/download/?vm=Alpha", server.uri()));

    let link = crawler.follow_redirect(&anchor).await;
    assert_eq!(link, Some(format!("{}/mega.nz/file/ALPHA", server.uri())));
}

#[tokio::test]
async fn machine_page_without_anchor_is_none() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path("/machines/machine.php"))
        .respond_with(html("<h1>Alpha</h1><p>Coming soon</p>"))
        .mount(&server)
        .await;

    let crawler = HmvCrawler::new(config(&server, &dir), RateLimiter::disabled()).unwrap();
    let anchor = crawler
        .download_anchor(&format!("{}/machines/machine.php?vm=Alpha", server.uri()))
        .await;
    assert_eq!(anchor, None);
}

#[tokio::test]
async fn crawl_stops_at_sentinel_and_writes_links() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_login_success(&server).await;

    Mock::given(method("GET"))
        .and(path("/machines/"))
        .and(query_param("p", "1"))
        .respond_with(html(listing(&["Alpha", "Beta", "Gamma", "REALSAGA", "Delta"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/machines/"))
        .and(query_param("p", "2"))
        .respond_with(html(listing(&["Later"])))
        .expect(0)
        .mount(&server)
        .await;

    mount_machine(&server, "Alpha", "/mega.nz/file/ALPHA").await;
    Mock::given(method("GET"))
        .and(path("/machines/machine.php"))
        .and(query_param("vm", "Beta"))
        .respond_with(html("<h1>Beta</h1>"))
        .mount(&server)
        .await;
    mount_machine(&server, "Gamma", "/elsewhere/gamma").await;
    Mock::given(method("GET"))
        .and(path("/machines/machine.php"))
        .and(query_param("vm", "Delta"))
        .respond_with(html(machine_page("Delta")))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = config(&server, &dir);
    config.stop_names = vec!["realsaga".to_string()];
    let output = config.output_path.clone();
    let crawler = HmvCrawler::new(config, RateLimiter::disabled()).unwrap();

    let summary = crawler.run(&credentials()).await.unwrap();

    let alpha = format!("{}/mega.nz/file/ALPHA", server.uri());
    assert_eq!(summary.links, vec![alpha.clone()]);
    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.stopped_at.as_deref(), Some("REALSAGA"));
    assert_eq!(std::fs::read_to_string(output).unwrap(), format!("{alpha}\n"));
}

#[tokio::test]
async fn crawl_continues_past_empty_pages() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_login_success(&server).await;

    Mock::given(method("GET"))
        .and(path("/machines/"))
        .and(query_param("p", "1"))
        .respond_with(html("<p>No machines</p>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/machines/"))
        .and(query_param("p", "2"))
        .respond_with(html(listing(&["Alpha", "Alpha"])))
        .mount(&server)
        .await;
    mount_machine(&server, "Alpha", "/mega.nz/file/ALPHA").await;

    let crawler = HmvCrawler::new(config(&server, &dir), RateLimiter::disabled()).unwrap();
    let summary = crawler.run(&credentials()).await.unwrap();

    let alpha = format!("{}/mega.nz/file/ALPHA", server.uri());
    assert_eq!(summary.links, vec![alpha.clone(), alpha]);
    assert_eq!(summary.stopped_at, None);
}

#[tokio::test]
async fn failed_login_writes_nothing() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path("/login/auth.php"))
        .respond_with(html("<form><button>Sign in</button></form>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/machines/"))
        .respond_with(html(listing(&["Alpha"])))
        .expect(0)
        .mount(&server)
        .await;

    let config = config(&server, &dir);
    let output = config.output_path.clone();
    let crawler = HmvCrawler::new(config, RateLimiter::disabled()).unwrap();

    let err = crawler.run(&credentials()).await.unwrap_err();
    assert!(matches!(err, CrawlError::LoginFailed));
    assert!(!output.exists());
}

#[tokio::test]
async fn pacing_follows_machine_and_page_order() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_login_success(&server).await;

    Mock::given(method("GET"))
        .and(path("/machines/"))
        .and(query_param("p", "1"))
        .respond_with(html(listing(&["Alpha", "Beta"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/machines/"))
        .and(query_param("p", "2"))
        .respond_with(html(listing(&["Gamma", "RealSaga", "Delta"])))
        .mount(&server)
        .await;
    mount_machine(&server, "Alpha", "/mega.nz/file/ALPHA").await;
    Mock::given(method("GET"))
        .and(path("/machines/machine.php"))
        .and(query_param("vm", "Beta"))
        .respond_with(html("<h1>Beta</h1>"))
        .mount(&server)
        .await;
    mount_machine(&server, "Gamma", "/mega.nz/file/GAMMA").await;

    let config = HmvConfig {
        delays: HmvDelays {
            before_redirect: DelayRange::fixed(0.5),
            per_machine: DelayRange::fixed(2.0),
            per_page: DelayRange::fixed(3.0),
        },
        ..config(&server, &dir)
    };
    let limiter = RateLimiter::recording();
    let crawler = HmvCrawler::new(config, limiter.clone()).unwrap();

    let summary = crawler.run(&credentials()).await.unwrap();

    assert_eq!(summary.links.len(), 2);
    assert_eq!(summary.stopped_at.as_deref(), Some("RealSaga"));
    // Beta has no download button, so it skips the pre-redirect pause.
    // The sentinel ends the crawl before the page pause.
    let expected: Vec<Duration> = [500, 2000, 2000, 3000, 500, 2000]
        .into_iter()
        .map(Duration::from_millis)
        .collect();
    assert_eq!(limiter.recorded(), expected);
}
