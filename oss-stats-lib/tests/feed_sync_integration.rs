//! Integration tests for the feed synchronizer and the feed queries that read its output

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use core::time::Duration;
use oss_stats_lib::config::{BlogSourceConfig, FeedConfig, GitHubConfig, HttpConfig};
use oss_stats_lib::feed::{ContentSource, FeedSynchronizer};
use oss_stats_lib::github::GitHubClient;
use oss_stats_lib::model::{FeedCategory, FeedEntry, FeedSource, ReleaseLevel};
use oss_stats_lib::query::{FeedQuery, Visibility, get_feed_facet_counts, list_feed_entries};
use oss_stats_lib::registry::{Library, Org, Registry};
use oss_stats_lib::store::CacheStore;
use serde_json::json;
use std::fs;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().to_utc()
}

fn http() -> HttpConfig {
    HttpConfig {
        request_timeout: Duration::from_secs(5),
        max_retries: 1,
        retry_base_delay: Duration::from_millis(1),
    }
}

fn registry() -> Arc<Registry> {
    Arc::new(
        Registry::new(
            vec![Org {
                id: "tanstack".into(),
                github: "TanStack".into(),
            }],
            vec![Library {
                id: "query".into(),
                name: Some("TanStack Query".into()),
                org: "tanstack".into(),
                repo: "TanStack/query".into(),
                packages: vec!["@tanstack/react-query".into()],
                legacy_packages: Vec::new(),
                track_releases: true,
            }],
        )
        .unwrap(),
    )
}

fn synchronizer(api_base_url: &str, store: &CacheStore, blog: ContentSource) -> FeedSynchronizer {
    let github_config = GitHubConfig {
        api_base_url: api_base_url.to_string(),
        web_base_url: api_base_url.to_string(),
        fetch_dependents: false,
        max_rate_limit_wait: Duration::from_secs(1),
        ..GitHubConfig::default()
    };
    let feed_config = FeedConfig {
        excerpt_length: 40,
        site_url: "https://example.com/".into(),
        ..FeedConfig::default()
    };

    let github = GitHubClient::new(&github_config, &http(), None).unwrap();
    FeedSynchronizer::new(store.clone(), registry(), github, blog, feed_config, github_config)
}

fn write_post(dir: &Utf8Path, slug: &str, title: &str, published: &str) {
    let text = format!("---\ntitle: {title}\npublished: {published}\nauthors:\n  - Tanner Linsley\n---\n\n{title} is out. Read all about it here.\n");
    fs::write(dir.join(format!("{slug}.md")), text).unwrap();
}

#[tokio::test]
async fn test_release_sync_is_idempotent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/TanStack/query/releases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "tag_name": "v5.1.0-beta.0",
                "name": "v5.1.0-beta.0",
                "body": "Not ready yet",
                "html_url": "https://github.com/TanStack/query/releases/tag/v5.1.0-beta.0",
                "draft": true,
                "prerelease": true,
                "created_at": "2024-02-29T11:00:00Z",
                "published_at": null
            },
            {
                "tag_name": "v5.0.1",
                "name": "v5.0.1",
                "body": "## Fixes\n\n- **query**: fix a race in `refetch`",
                "html_url": "https://github.com/TanStack/query/releases/tag/v5.0.1",
                "draft": false,
                "prerelease": false,
                "created_at": "2024-02-29T10:00:00Z",
                "published_at": "2024-02-29T10:00:00Z"
            },
            {
                "tag_name": "v5.0.0",
                "name": null,
                "body": "The big one",
                "html_url": "https://github.com/TanStack/query/releases/tag/v5.0.0",
                "draft": false,
                "prerelease": false,
                "created_at": "2024-02-29T09:00:00Z",
                "published_at": "2024-02-29T09:00:00Z"
            }
        ])))
        .expect(2)
        .mount(&server)
        .await;

    let store = CacheStore::in_memory();
    let sync = synchronizer(&server.uri(), &store, ContentSource::None);
    let now = at("2024-03-01T12:00:00Z");

    let first = sync.sync_github_releases(None, now).await.unwrap();
    assert!(first.success());
    assert_eq!(first.created, 2);
    assert_eq!(first.updated, 0);
    assert_eq!(first.skipped_count, 1);

    let second = sync.sync_github_releases(None, at("2024-03-01T13:00:00Z")).await.unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 2);
    assert_eq!(second.skipped_count, 1);

    let page = list_feed_entries(&store, &FeedQuery::default()).unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.entries[0].entry_id, "release:tanstack/query:v5.0.1");
    assert_eq!(page.entries[0].title, "TanStack Query v5.0.1");
    assert_eq!(page.entries[0].created_at, now);
    assert_eq!(page.entries[1].title, "TanStack Query v5.0.0");
    assert_eq!(page.entries[1].entry_id, "release:tanstack/query:v5.0.0");
    assert_eq!(page.entries[1].library_ids, vec!["query".to_string()]);
    assert!(page.entries.iter().all(|e| e.category == FeedCategory::Release && e.auto_synced));
    assert!(page.entries[0].published_at > page.entries[1].published_at);

    let majors = list_feed_entries(
        &store,
        &FeedQuery {
            release_levels: vec![ReleaseLevel::Major],
            ..FeedQuery::default()
        },
    )
    .unwrap();
    assert_eq!(majors.total, 1);
    assert_eq!(majors.entries[0].release_level(), Some(ReleaseLevel::Major));

    let facets = get_feed_facet_counts(&store, &FeedQuery::default()).unwrap();
    assert_eq!(facets.sources.get(&FeedSource::Github), Some(&2));
    assert_eq!(facets.release_levels.get(&ReleaseLevel::Patch), Some(&1));
    assert_eq!(facets.tags.get("release"), Some(&2));
}

#[tokio::test]
async fn test_release_sync_reports_failing_repository() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/TanStack/query/releases"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = CacheStore::in_memory();
    let result = synchronizer(&server.uri(), &store, ContentSource::None)
        .sync_github_releases(Some(7), at("2024-03-01T12:00:00Z"))
        .await
        .unwrap();

    assert!(!result.success());
    assert_eq!(result.error_count, 1);
    assert_eq!(result.errors[0].item, "TanStack/query");
    assert_eq!(list_feed_entries(&store, &FeedQuery::default()).unwrap().total, 0);
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
async fn test_directory_blog_sync_hides_removed_posts() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();

    write_post(&dir, "query-v5", "Announcing Query v5", "2023-10-17");
    write_post(&dir, "router-v1", "Announcing Router v1", "2023-12-22");
    fs::write(dir.join("notes.txt"), "not a post").unwrap();

    let store = CacheStore::in_memory();
    let sync = synchronizer("http://127.0.0.1:9", &store, ContentSource::Directory(dir.clone()));

    let first = sync.sync_blog_posts(at("2024-03-01T12:00:00Z")).await.unwrap();
    assert!(first.success());
    assert_eq!(first.created, 2);
    assert_eq!(first.hidden, 0);

    let entry: FeedEntry = store.get(&FeedEntry::blog_id("query-v5")).found().unwrap();
    assert_eq!(entry.category, FeedCategory::Blog);
    assert!(entry.content.ends_with("(https://example.com/blog/query-v5)"));

    fs::remove_file(dir.join("router-v1.md")).unwrap();

    let second = sync.sync_blog_posts(at("2024-03-02T12:00:00Z")).await.unwrap();
    assert_eq!(second.updated, 1);
    assert_eq!(second.hidden, 1);

    let visible = list_feed_entries(&store, &FeedQuery::default()).unwrap();
    assert_eq!(visible.total, 1);
    assert_eq!(visible.entries[0].entry_id, "blog:query-v5");

    let hidden = list_feed_entries(
        &store,
        &FeedQuery {
            visibility: Visibility::Hidden,
            ..FeedQuery::default()
        },
    )
    .unwrap();
    assert_eq!(hidden.total, 1);
    assert_eq!(hidden.entries[0].entry_id, "blog:router-v1");
}

#[tokio::test]
async fn test_http_blog_index_sync() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/blog/index.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "slug": "form-v1",
                "title": "Announcing Form v1",
                "published": "2024-03-03T09:00:00Z",
                "excerpt": "Form is stable.",
                "authors": ["Corbin Crutchley"],
                "headerImage": "/blog-assets/form-v1.png"
            }
        ])))
        .mount(&server)
        .await;

    let source = ContentSource::from_config(
        &BlogSourceConfig::Http {
            url: format!("{}/blog/index.json", server.uri()),
        },
        &http(),
        Utf8Path::new("."),
    )
    .unwrap();

    let store = CacheStore::in_memory();
    let result = synchronizer(&server.uri(), &store, source).sync_blog_posts(at("2024-03-04T00:00:00Z")).await.unwrap();
    assert_eq!(result.created, 1);

    let entry: FeedEntry = store.get(&FeedEntry::blog_id("form-v1")).found().unwrap();
    assert_eq!(entry.excerpt.as_deref(), Some("Form is stable."));
    assert_eq!(entry.published_at, at("2024-03-03T09:00:00Z"));
}

#[tokio::test]
async fn test_http_blog_index_isolates_bad_posts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/blog/index.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "slug": "good", "title": "Good post", "published": "2024-03-01" },
            { "slug": "bad", "title": "Bad post", "published": "not a date" }
        ])))
        .mount(&server)
        .await;

    let source = ContentSource::from_config(
        &BlogSourceConfig::Http {
            url: format!("{}/blog/index.json", server.uri()),
        },
        &http(),
        Utf8Path::new("."),
    )
    .unwrap();

    let store = CacheStore::in_memory();
    let result = synchronizer(&server.uri(), &store, source).sync_blog_posts(at("2024-03-02T00:00:00Z")).await.unwrap();

    assert!(!result.success());
    assert_eq!(result.created, 1);
    assert_eq!(result.error_count, 1);
    assert_eq!(result.errors[0].item, "bad");
    assert_eq!(list_feed_entries(&store, &FeedQuery::default()).unwrap().total, 1);
    assert!(store.get::<FeedEntry>(&FeedEntry::blog_id("good")).found().is_some());
}

#[tokio::test]
async fn test_unreachable_blog_index_fails_without_hiding() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/blog/index.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = CacheStore::in_memory();
    let existing = synchronizer(
        &server.uri(),
        &store,
        ContentSource::Static(vec![oss_stats_lib::feed::parse_post(
            "---\ntitle: Old post\npublished: 2022-01-01\n---\nBody\n",
            "old-post",
        )
        .unwrap()]),
    );
    assert_eq!(existing.sync_blog_posts(at("2024-03-01T00:00:00Z")).await.unwrap().created, 1);

    let source = ContentSource::from_config(
        &BlogSourceConfig::Http {
            url: format!("{}/blog/index.json", server.uri()),
        },
        &http(),
        Utf8Path::new("."),
    )
    .unwrap();

    let _ = synchronizer(&server.uri(), &store, source)
        .sync_blog_posts(at("2024-03-02T00:00:00Z"))
        .await
        .unwrap_err();

    let entry: FeedEntry = store.get(&FeedEntry::blog_id("old-post")).found().unwrap();
    assert!(entry.is_visible);
}
