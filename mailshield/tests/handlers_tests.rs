use mailshield::handlers::*;
use mailshield_core::dom::Document;
use mailshield_scanner::{RiskScorer, ScanResult};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, method, path},
};

const PAGE: &str = r#"<html><body>
<nav><a href="https://nav.example/inbox">Inbox</a></nav>
<div role="main">
  <p>Please <a href="https://bad.example/login-verify">verify your account</a>.</p>
  <p>Docs at <a href="https://safe.example/">safe</a>.</p>
  <p><a href="/settings">Settings</a></p>
</div>
</body></html>"#;

fn write_page(html: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", html).unwrap();
    file
}

async fn mount_score(server: &MockServer, url: &str, score: u8) {
    let reasons: Vec<&str> = if score > 0 {
        vec!["Suspicious keyword"]
    } else {
        Vec::new()
    };
    Mock::given(method("POST"))
        .and(path("/api/threats/scan-url"))
        .and(body_json(serde_json::json!({ "url": url })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "url": url,
            "risk_score": score,
            "reasons": reasons,
        })))
        .mount(server)
        .await;
}

#[test]
fn test_parse_url_line_with_scheme() {
    let result = parse_url_line("https://example.com/login");
    assert_eq!(result, Some("https://example.com/login".to_string()));
}

#[test]
fn test_parse_url_line_without_scheme() {
    let result = parse_url_line("example.com");
    assert_eq!(result, Some("https://example.com/".to_string()));
}

#[test]
fn test_parse_url_line_invalid() {
    assert_eq!(parse_url_line("not a valid url!!!"), None);
    assert_eq!(parse_url_line("   "), None);
    assert_eq!(parse_url_line("localhost"), None);
}

#[test]
fn test_effective_config_backend_override() -> Result<(), Box<dyn std::error::Error>> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, r#"{{ "backend_url": "http://from-file:8000", "debounce_ms": 200 }}"#)?;
    let path = PathBuf::from(file.path());

    let config = effective_config(Some(&path), None)?;
    assert_eq!(config.backend_url, "http://from-file:8000");
    assert_eq!(config.debounce_ms, 200);

    let config = effective_config(Some(&path), Some(" https://override.example "))?;
    assert_eq!(config.backend_url, "https://override.example");
    assert_eq!(config.debounce_ms, 200);
    Ok(())
}

#[test]
fn test_effective_config_missing_file() {
    let path = PathBuf::from("/nonexistent/mailshield/config.json");
    let err = effective_config(Some(&path), None).unwrap_err();
    assert!(err.contains("config.json"));
}

#[test]
fn test_load_page_reads_html() {
    let file = write_page(PAGE);
    let page_url = Url::parse("https://mail.example.com/inbox").unwrap();

    let doc = load_page(file.path(), Some(&page_url)).unwrap();

    assert_eq!(doc.location(), Some(&page_url));
    assert_eq!(doc.select("a").unwrap().len(), 4);
}

#[test]
fn test_load_page_empty_or_missing() {
    let file = write_page("   \n");
    let err = load_page(file.path(), None).unwrap_err();
    assert!(err.contains("empty"));

    let err = load_page(&PathBuf::from("/nonexistent/page.html"), None).unwrap_err();
    assert!(err.contains("Failed to read page"));
}

#[test]
fn test_format_check_result() {
    let result = ScanResult::new(
        "https://bad.example/login-verify",
        80,
        vec!["Typosquatting".to_string()],
    );
    let out = format_check_result(&result);
    assert!(out.contains("HIGH"));
    assert!(out.contains("https://bad.example/login-verify"));
    assert!(out.contains("Score: 80"));
    assert!(out.contains("- Typosquatting"));

    let out = format_check_result(&ScanResult::safe("https://safe.example/"));
    assert!(out.contains("SAFE"));
    assert!(out.contains("No risk indicators reported"));
}

#[test]
fn test_build_client_rejects_bad_backend() {
    let mut config = mailshield_core::PipelineConfig::default();
    config.backend_url = "ftp://threats.example".to_string();
    assert!(build_client(&config).is_err());
}

#[tokio::test]
async fn test_scan_document_annotates_risky_links() {
    let server = MockServer::start().await;
    mount_score(&server, "https://bad.example/login-verify", 80).await;
    mount_score(&server, "https://safe.example/", 0).await;

    let file = write_page(PAGE);
    let page_url = Url::parse("https://mail.example.com/inbox").unwrap();
    let doc = load_page(file.path(), Some(&page_url)).unwrap();

    let mut config = mailshield_core::PipelineConfig::default();
    config.backend_url = server.uri();
    let client = Arc::new(build_client(&config).unwrap());

    let (summary, html) = scan_document(doc, client, &config).await.unwrap();

    // The nav link sits outside the content root; /settings resolves to the host's own domain
    assert_eq!(summary.candidates, 2);
    assert_eq!(summary.annotated, 1);
    assert_eq!(summary.silent, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.toasts, 1);
    assert_eq!(summary.findings[0].url, "https://bad.example/login-verify");
    assert!(summary.findings[0].toast_shown);

    assert!(html.contains("data-mailshield-risk=\"high\""));
    assert!(html.contains("mailshield-badge"));
    assert!(html.contains("HIGH [Score: 80]"));
    assert!(html.contains("data-mailshield-toast"));
}

#[tokio::test]
async fn test_scan_document_counts_backend_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/threats/scan-url"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let file = write_page(PAGE);
    let doc = load_page(file.path(), None).unwrap();

    let mut config = mailshield_core::PipelineConfig::default();
    config.backend_url = server.uri();
    let client = Arc::new(build_client(&config).unwrap());

    let (summary, html) = scan_document(doc, client.clone(), &config).await.unwrap();

    // Without a page URL the relative link cannot resolve, leaving two absolute links
    assert_eq!(summary.candidates, 2);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.annotated, 0);
    assert!(!html.contains("mailshield-badge"));

    assert!(client.score_url("https://bad.example/").await.is_err());
}
