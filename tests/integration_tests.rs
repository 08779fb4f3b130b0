//! Integration tests for the feedboard dashboard builder
//!
//! These tests drive the fetcher, parser, source stores and aggregation
//! against mocked HTTP endpoints and temporary directories.

mod common {
    use feedboard::fetcher::Fetcher;
    use wiremock::MockServer;

    pub fn rss(title: &str, items: &[(&str, &str, &str)]) -> String {
        let items: String = items
            .iter()
            .map(|(title, link, date)| {
                format!(
                    "<item><title>{}</title><link>{}</link><pubDate>{}</pubDate></item>",
                    title, link, date
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <rss version="2.0"><channel><title>{}</title><link>https://example.com</link>
            <description>test</description>{}</channel></rss>"#,
            title, items
        )
    }

    pub fn fetcher_for(server: &MockServer) -> Fetcher {
        Fetcher::with_client(
            reqwest::Client::new(),
            format!("{}/v1/api.json", server.uri()),
        )
    }
}

#[cfg(test)]
mod config_integration_tests {
    use feedboard::config::{Config, RegistryConfig};

    #[test]
    fn test_load_bundled_config() {
        let config = Config::load("feedboard.toml");
        assert!(config.is_ok(), "Failed to load feedboard.toml: {:?}", config.err());

        let config = config.unwrap();
        assert!(!config.panels.is_empty(), "feedboard.toml should define panels");
        assert!(config.activity.is_some());
        assert!(matches!(config.registry, Some(RegistryConfig::File { .. })));
        assert!(config.panels.iter().all(|p| p.limit > 0));
    }
}

#[cfg(test)]
mod fetcher_integration_tests {
    use super::common::*;
    use feedboard::error::FetchError;
    use feedboard::model::{FeedLocator, FeedPayload, FeedStatus};
    use feedboard::parser::parse_payload;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_remote_xml_feed() {
        let server = MockServer::start().await;
        let body = rss(
            "Remote",
            &[
                ("A", "https://r.example/a", "Mon, 01 Jan 2024 10:00:00 GMT"),
                ("B", "https://r.example/b", "Mon, 01 Jan 2024 09:00:00 GMT"),
            ],
        );
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let payload = fetcher
            .fetch(&FeedLocator::Remote(format!("{}/feed.xml", server.uri())))
            .await
            .unwrap();
        assert!(matches!(payload, FeedPayload::Xml(_)));

        let parsed = parse_payload(&payload, 5).unwrap();
        assert_eq!(parsed.status, FeedStatus::Ok);
        assert_eq!(parsed.articles.len(), 2);
        assert_eq!(parsed.articles[0].link, "https://r.example/a");
    }

    #[tokio::test]
    async fn test_non_2xx_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = fetcher_for(&server)
            .fetch(&FeedLocator::Remote(format!("{}/gone.xml", server.uri())))
            .await;
        assert!(matches!(result, Err(FetchError::Status { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_proxied_feed_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/api.json"))
            .and(query_param("rss_url", "https://www.digiforma.com/feed/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "items": [
                    { "title": "One", "link": "https://www.digiforma.com/1", "pubDate": "2024-01-01 10:00:00" },
                    { "title": "Two", "link": "https://www.digiforma.com/2", "pubDate": "2024-01-02 10:00:00" }
                ]
            })))
            .mount(&server)
            .await;

        let payload = fetcher_for(&server)
            .fetch(&FeedLocator::Proxied("https://www.digiforma.com/feed/".to_string()))
            .await
            .unwrap();
        let parsed = parse_payload(&payload, 10).unwrap();
        assert_eq!(parsed.articles.len(), 2);
        assert_eq!(parsed.articles[1].title, "Two");
    }

    #[tokio::test]
    async fn test_proxy_without_items_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/api.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let payload = fetcher_for(&server)
            .fetch(&FeedLocator::Proxied("https://down.example/rss".to_string()))
            .await
            .unwrap();
        let parsed = parse_payload(&payload, 10).unwrap();
        assert_eq!(parsed.status, FeedStatus::Unavailable { reason: None });
        assert!(parsed.articles.is_empty());
    }

    #[tokio::test]
    async fn test_proxy_returning_html_is_invalid_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/api.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let result = fetcher_for(&server)
            .fetch(&FeedLocator::Proxied("https://a.example/rss".to_string()))
            .await;
        assert!(matches!(result, Err(FetchError::InvalidJson { .. })));
    }
}

#[cfg(test)]
mod validation_integration_tests {
    use super::common::*;
    use feedboard::error::ValidationError;
    use feedboard::registry::{prepare_source, validate_feed, SourceDraft};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn serve(server: &MockServer, route: &str, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(response)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_rejection_reasons() {
        let server = MockServer::start().await;
        serve(&server, "/500", ResponseTemplate::new(500)).await;
        serve(
            &server,
            "/broken",
            ResponseTemplate::new(200).set_body_string("<rss><channel><item></channel></rss>"),
        )
        .await;
        serve(
            &server,
            "/empty",
            ResponseTemplate::new(200).set_body_string(rss("Empty", &[])),
        )
        .await;
        serve(
            &server,
            "/page",
            ResponseTemplate::new(200).set_body_string("<html><body><p>Welcome</p></body></html>"),
        )
        .await;

        let fetcher = fetcher_for(&server);
        let base = server.uri();

        assert!(matches!(
            validate_feed(&fetcher, &format!("{}/500", base)).await,
            Err(ValidationError::HttpStatus(500))
        ));
        assert!(matches!(
            validate_feed(&fetcher, &format!("{}/broken", base)).await,
            Err(ValidationError::NotXml(_))
        ));
        assert!(matches!(
            validate_feed(&fetcher, &format!("{}/empty", base)).await,
            Err(ValidationError::NoEntries)
        ));
        assert!(matches!(
            validate_feed(&fetcher, &format!("{}/page", base)).await,
            Err(ValidationError::NoEntries)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let fetcher = feedboard::fetcher::Fetcher::with_client(
            reqwest::Client::new(),
            "http://127.0.0.1:9/api.json",
        );
        let result = validate_feed(&fetcher, "http://127.0.0.1:9/feed").await;
        assert!(matches!(result, Err(ValidationError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_summary_and_scheme_rejection() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/feed",
            ResponseTemplate::new(200).set_body_string(rss(
                "Channel Title",
                &[("A", "https://a.example/1", "Mon, 01 Jan 2024 10:00:00 GMT")],
            )),
        )
        .await;

        // prepare_source upgrades to https, which the mock server does not serve.
        let fetcher = fetcher_for(&server);
        let url = format!("{}/feed", server.uri());
        let summary = validate_feed(&fetcher, &url).await.unwrap();
        assert_eq!(summary.title.as_deref(), Some("Channel Title"));
        assert_eq!(summary.entries, 1);

        let result = prepare_source(
            &fetcher,
            SourceDraft {
                name: String::new(),
                url: "ftp://example.com/feed".to_string(),
                category: "legal".to_string(),
            },
        )
        .await;
        assert!(matches!(result, Err(ValidationError::UnsupportedScheme(_))));
    }
}

#[cfg(test)]
mod store_integration_tests {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use feedboard::error::StoreError;
    use feedboard::model::SourceDescriptor;
    use feedboard::registry::SourceRegistry;
    use feedboard::store::{FileStore, GitHubStore, SourceStore};
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CONTENTS_PATH: &str = "/repos/acme/dashboard/contents/docs/data/sources.json";

    fn source(name: &str, category: &str) -> SourceDescriptor {
        SourceDescriptor {
            name: name.to_string(),
            url: format!("https://{}.example.com/feed", name),
            category: category.to_string(),
            favicon: None,
        }
    }

    fn github_store(server: &MockServer) -> GitHubStore {
        GitHubStore::new(
            reqwest::Client::builder()
                .user_agent("feedboard-tests")
                .build()
                .unwrap(),
            server.uri(),
            "acme",
            "dashboard",
            "docs/data/sources.json",
            "main",
            "secret-token",
        )
    }

    async fn mount_contents(server: &MockServer, sources: &[SourceDescriptor], sha: &str) {
        let encoded = STANDARD.encode(serde_json::to_vec_pretty(sources).unwrap());
        // The API wraps base64 content at 60 columns.
        let wrapped: Vec<String> = encoded
            .as_bytes()
            .chunks(60)
            .map(|c| String::from_utf8(c.to_vec()).unwrap())
            .collect();

        Mock::given(method("GET"))
            .and(path(CONTENTS_PATH))
            .and(query_param("ref", "main"))
            .and(header("authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sha": sha,
                "encoding": "base64",
                "content": wrapped.join("\n")
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_github_load_decodes_content_and_sha() {
        let server = MockServer::start().await;
        mount_contents(&server, &[source("a", "legal"), source("b", "pedago")], "sha-1").await;

        let snapshot = github_store(&server).load().await.unwrap();
        assert_eq!(snapshot.revision.as_deref(), Some("sha-1"));
        assert_eq!(snapshot.sources, vec![source("a", "legal"), source("b", "pedago")]);
    }

    #[tokio::test]
    async fn test_github_missing_file_loads_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CONTENTS_PATH))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let snapshot = github_store(&server).load().await.unwrap();
        assert!(snapshot.sources.is_empty());
        assert!(snapshot.revision.is_none());
    }

    #[tokio::test]
    async fn test_github_save_sends_loaded_sha() {
        let server = MockServer::start().await;
        mount_contents(&server, &[source("a", "legal")], "sha-1").await;
        Mock::given(method("PUT"))
            .and(path(CONTENTS_PATH))
            .and(body_partial_json(json!({ "sha": "sha-1", "branch": "main" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": { "sha": "sha-2" },
                "commit": { "sha": "c0ffee" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = github_store(&server);
        let mut registry = SourceRegistry::load(&store).await.unwrap();
        registry.add(source("b", "pedago"));
        registry.persist(&store).await.unwrap();

        assert_eq!(registry.revision(), Some("sha-2"));
    }

    #[tokio::test]
    async fn test_github_stale_sha_is_conflict() {
        let server = MockServer::start().await;
        mount_contents(&server, &[source("a", "legal")], "sha-1").await;
        Mock::given(method("PUT"))
            .and(path(CONTENTS_PATH))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "message": "docs/data/sources.json does not match sha-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = github_store(&server);
        let mut registry = SourceRegistry::load(&store).await.unwrap();
        assert_ok!(registry.delete(0));

        let result = registry.persist(&store).await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        // The registry still points at the revision it loaded.
        assert_eq!(registry.revision(), Some("sha-1"));
    }

    #[tokio::test]
    async fn test_github_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CONTENTS_PATH))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = github_store(&server).load().await;
        assert!(matches!(result, Err(StoreError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_concurrent_admin_sessions_on_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("sources.json"));
        store.save(&[source("a", "legal")], None).await.unwrap();

        let mut first = SourceRegistry::load(&store).await.unwrap();
        let mut second = SourceRegistry::load(&store).await.unwrap();

        first.add(source("b", "pedago"));
        assert_ok!(first.persist(&store).await);

        second.add(source("c", "metiers"));
        let err = assert_err!(second.persist(&store).await);
        assert!(matches!(err, StoreError::Conflict { .. }));

        // Reload, re-apply, resubmit.
        let mut retry = SourceRegistry::load(&store).await.unwrap();
        retry.add(source("c", "metiers"));
        assert_ok!(retry.persist(&store).await);

        let names: Vec<String> = SourceRegistry::load(&store)
            .await
            .unwrap()
            .sources()
            .iter()
            .map(|s| s.name.clone())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}

#[cfg(test)]
mod end_to_end_tests {
    use super::common::*;
    use feedboard::activity::ActivityHistogram;
    use feedboard::aggregate::{aggregate_sources, GLOBAL_FILE};
    use feedboard::config::{AggregateConfig, Config};
    use feedboard::dashboard::build_dashboard;
    use feedboard::model::SourceDescriptor;
    use feedboard::parser::parse_xml;
    use feedboard::render::HtmlDashboard;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_aggregate_then_build_dashboard() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/legal.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss(
                "Legal",
                &[
                    ("Decree", "https://legal.example/1", "Tue, 02 Jan 2024 09:00:00 GMT"),
                    ("Shared", "https://shared.example/1", "Mon, 01 Jan 2024 09:00:00 GMT"),
                ],
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pedago.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss(
                "Pedago",
                &[
                    ("Course", "https://pedago.example/1", "Wed, 03 Jan 2024 09:00:00 GMT"),
                    ("Shared", "https://shared.example/1", "Mon, 01 Jan 2024 09:00:00 GMT"),
                ],
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/down.xml"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let sources = vec![
            SourceDescriptor {
                name: "Legal".to_string(),
                url: format!("{}/legal.xml", server.uri()),
                category: "legal".to_string(),
                favicon: None,
            },
            SourceDescriptor {
                name: "Pedago".to_string(),
                url: format!("{}/pedago.xml", server.uri()),
                category: "pedago".to_string(),
                favicon: None,
            },
            SourceDescriptor {
                name: "Down".to_string(),
                url: format!("{}/down.xml", server.uri()),
                category: "legal".to_string(),
                favicon: None,
            },
        ];

        let dir = tempfile::tempdir().unwrap();
        let xml_dir = dir.path().join("xml");
        let aggregate_config = AggregateConfig {
            output_dir: xml_dir.clone(),
            ..AggregateConfig::default()
        };

        let fetcher = fetcher_for(&server);
        let report = aggregate_sources(&fetcher, &sources, &aggregate_config)
            .await
            .unwrap();

        assert_eq!(report.failed_sources, vec!["Down".to_string()]);
        assert_eq!(report.total_articles, 3);
        assert!(xml_dir.join("flux_legal.xml").exists());
        assert!(xml_dir.join("flux_pedago.xml").exists());

        let global = std::fs::read(xml_dir.join(GLOBAL_FILE)).unwrap();
        let parsed = parse_xml(&global, 10).unwrap();
        let titles: Vec<&str> = parsed.articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Course", "Decree", "Shared"]);

        // Dashboard over the generated files.
        let toml = format!(
            r#"
            [[panels]]
            id = "articles-legal"
            label = "Legal"
            location = "{legal}"

            [[panels]]
            id = "articles-global"
            label = "Latest"
            location = "{global}"
            limit = 2
            compact = true

            [activity]
            location = "{global}"
            "#,
            legal = xml_dir.join("flux_legal.xml").display(),
            global = xml_dir.join(GLOBAL_FILE).display(),
        );
        let config = Config::from_str(&toml).unwrap();

        let mut dashboard = HtmlDashboard::new("Test", config.panels.len());
        let summary = build_dashboard(&fetcher, &config, &mut dashboard).await;
        assert_eq!(summary.loaded, 2);
        assert_eq!(summary.failed, 0);

        assert_eq!(
            dashboard.activity(),
            &ActivityHistogram::from_raw(["2024-01-01", "2024-01-02", "2024-01-03"])
        );

        let html = dashboard.render().unwrap();
        assert!(html.contains("Latest (2)"));
        assert!(html.contains("Legal (2)"));
        assert!(html.contains("Decree"));
    }
}
