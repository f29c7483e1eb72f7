//! Blog post enumeration.

use crate::Result;
use crate::config::{BlogSourceConfig, HttpConfig};
use crate::error::{FailureKind, ItemError};
use crate::http::{ApiResult, RetryPolicy, build_client, classify_response, resilient_get};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, NaiveDate, Utc};
use ohno::{IntoAppError, app_err};
use serde::{Deserialize, Deserializer};
use std::fs;

const LOG_TARGET: &str = "      feed";

/// A blog post as published by the content source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPost {
    pub slug: String,
    pub title: String,
    #[serde(deserialize_with = "deserialize_published")]
    pub published: DateTime<Utc>,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub header_image: Option<String>,
}

/// YAML front matter of a markdown post. The slug defaults to the file stem.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrontMatter {
    #[serde(default)]
    slug: Option<String>,
    title: String,
    #[serde(deserialize_with = "deserialize_published")]
    published: DateTime<Utc>,
    #[serde(default)]
    excerpt: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default, alias = "header_image")]
    header_image: Option<String>,
}

/// Posts enumerated from a source, plus the posts that could not be read.
#[derive(Debug, Default)]
pub struct PostListing {
    pub posts: Vec<BlogPost>,

    /// Unreadable posts, keyed by slug.
    pub errors: Vec<ItemError>,
}

/// Where blog posts come from.
#[derive(Debug, Clone)]
pub enum ContentSource {
    /// A JSON array of posts served over HTTP.
    Http {
        client: reqwest::Client,
        url: String,
        retry: RetryPolicy,
    },

    /// A directory of markdown files with YAML front matter.
    Directory(Utf8PathBuf),

    /// A fixed list of posts.
    Static(Vec<BlogPost>),

    /// No blog configured.
    None,
}

impl ContentSource {
    /// Build the source described by the configuration. Relative directories resolve against `base_dir`.
    pub fn from_config(config: &BlogSourceConfig, http: &HttpConfig, base_dir: &Utf8Path) -> Result<Self> {
        Ok(match config {
            BlogSourceConfig::Http { url } => Self::Http {
                client: build_client(http, None)?,
                url: url.clone(),
                retry: RetryPolicy::from(http),
            },
            BlogSourceConfig::Directory { path } => Self::Directory(base_dir.join(path)),
            BlogSourceConfig::None => Self::None,
        })
    }

    #[must_use]
    pub const fn is_configured(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Enumerate every post. Fails only when the source as a whole cannot be read.
    pub async fn list_posts(&self) -> Result<PostListing> {
        match self {
            Self::Http { client, url, retry } => {
                log::info!(target: LOG_TARGET, "Querying '{url}' for blog posts");
                let resp = match classify_response(resilient_get(client, url, retry).await?, Utc::now()) {
                    ApiResult::Success(resp) => resp,
                    ApiResult::RateLimited(info) => return Err(app_err!("blog index rate limited until {}", info.reset_at)),
                    ApiResult::NotFound => return Err(app_err!("blog index '{url}' not found")),
                    ApiResult::Failed(e) => return Err(e),
                };

                let values: Vec<serde_json::Value> = resp.json().await.into_app_err_with(|| format!("parsing blog index '{url}'"))?;
                Ok(decode_index(values))
            }
            Self::Directory(dir) => list_directory(dir),
            Self::Static(posts) => Ok(PostListing {
                posts: posts.clone(),
                errors: Vec::new(),
            }),
            Self::None => Ok(PostListing::default()),
        }
    }
}

/// Decode each index element on its own so one malformed post does not hide the rest.
fn decode_index(values: Vec<serde_json::Value>) -> PostListing {
    let mut listing = PostListing::default();
    for (index, value) in values.into_iter().enumerate() {
        let item = value
            .get("slug")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| format!("#{index}"), str::to_string);

        match serde_json::from_value::<BlogPost>(value) {
            Ok(post) => listing.posts.push(post),
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Could not read blog post '{item}' from the index: {e}");
                listing.errors.push(ItemError::new(item, FailureKind::Validation, e.to_string()));
            }
        }
    }

    listing
}

fn list_directory(dir: &Utf8Path) -> Result<PostListing> {
    log::info!(target: LOG_TARGET, "Reading blog posts from '{dir}'");

    let mut paths: Vec<Utf8PathBuf> = fs::read_dir(dir)
        .into_app_err_with(|| format!("reading blog directory '{dir}'"))?
        .filter_map(core::result::Result::ok)
        .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.path()).ok())
        .filter(|path| matches!(path.extension(), Some("md" | "mdx")))
        .collect();
    paths.sort();

    let mut listing = PostListing::default();
    for path in paths {
        let stem = path.file_stem().unwrap_or_default().to_string();
        match read_post(&path, &stem) {
            Ok(post) => listing.posts.push(post),
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Could not read blog post '{path}': {e:#}");
                listing.errors.push(ItemError::from_app_err(stem, FailureKind::Validation, &e));
            }
        }
    }

    Ok(listing)
}

fn read_post(path: &Utf8Path, stem: &str) -> Result<BlogPost> {
    let text = fs::read_to_string(path).into_app_err_with(|| format!("reading '{path}'"))?;
    parse_post(&text, stem)
}

/// Parse a markdown post with YAML front matter.
pub fn parse_post(text: &str, default_slug: &str) -> Result<BlogPost> {
    let (yaml, body) = split_front_matter(text).ok_or_else(|| app_err!("missing front matter"))?;
    let front: FrontMatter = serde_yaml::from_str(yaml).into_app_err("parsing front matter")?;

    Ok(BlogPost {
        slug: front.slug.unwrap_or_else(|| default_slug.to_string()),
        title: front.title,
        published: front.published,
        excerpt: front.excerpt,
        content: body.trim().to_string(),
        authors: front.authors,
        header_image: front.header_image,
    })
}

fn split_front_matter(text: &str) -> Option<(&str, &str)> {
    let rest = text.trim_start_matches('\u{feff}').strip_prefix("---")?;
    let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))?;
    let (yaml, body) = rest.split_once("\n---")?;
    let body = body.split_once('\n').map_or("", |(_, body)| body);
    Some((yaml, body))
}

/// Accept either an RFC 3339 timestamp or a bare date, taken as midnight UTC.
fn deserialize_published<'de, D: Deserializer<'de>>(deserializer: D) -> core::result::Result<DateTime<Utc>, D::Error> {
    let s = String::deserialize(deserializer)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Ok(dt.to_utc());
    }

    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| serde::de::Error::custom(format!("invalid publish date '{s}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const POST: &str = "---\ntitle: Announcing TanStack Query v5\npublished: 2023-10-17\nauthors:\n  - Dominik Dorfmeister\nheaderImage: /blog-assets/v5.png\n---\n\n# Hello\n\nQuery v5 is here.\n";

    #[test]
    fn test_parse_post_with_front_matter() {
        let post = parse_post(POST, "announcing-tanstack-query-v5").unwrap();
        assert_eq!(post.slug, "announcing-tanstack-query-v5");
        assert_eq!(post.title, "Announcing TanStack Query v5");
        assert_eq!(post.published.to_rfc3339(), "2023-10-17T00:00:00+00:00");
        assert_eq!(post.authors, vec!["Dominik Dorfmeister"]);
        assert_eq!(post.header_image.as_deref(), Some("/blog-assets/v5.png"));
        assert_eq!(post.content, "# Hello\n\nQuery v5 is here.");
    }

    #[test]
    fn test_front_matter_slug_overrides_file_stem() {
        let text = "---\nslug: custom\ntitle: T\npublished: 2024-01-01T12:00:00Z\n---\nbody";
        let post = parse_post(text, "stem").unwrap();
        assert_eq!(post.slug, "custom");
        assert_eq!(post.content, "body");
    }

    #[test]
    fn test_missing_front_matter_is_rejected() {
        let _ = parse_post("# Just markdown", "x").unwrap_err();
        let _ = parse_post("---\npublished: 2024-01-01\n---\nno title", "x").unwrap_err();
    }

    #[test]
    fn test_index_json_deserializes() {
        let json = r#"[{"slug": "a", "title": "A", "published": "2024-03-01", "content": "Body", "authors": [], "headerImage": null}]"#;
        let posts: Vec<BlogPost> = serde_json::from_str(json).unwrap();
        assert_eq!(posts[0].slug, "a");
        assert!(posts[0].excerpt.is_none());
    }

    #[test]
    fn test_index_decoding_isolates_bad_posts() {
        let values: Vec<serde_json::Value> = serde_json::from_str(
            r#"[
                {"slug": "good", "title": "Good", "published": "2024-03-01"},
                {"slug": "bad", "title": "Bad", "published": "not a date"},
                {"title": "No slug"}
            ]"#,
        )
        .unwrap();

        let listing = decode_index(values);
        assert_eq!(listing.posts.len(), 1);
        assert_eq!(listing.posts[0].slug, "good");
        assert_eq!(listing.errors.len(), 2);
        assert_eq!(listing.errors[0].item, "bad");
        assert_eq!(listing.errors[0].kind, FailureKind::Validation);
        assert_eq!(listing.errors[1].item, "#2");
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_directory_listing_reports_bad_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        fs::write(dir.join("good.md"), POST).unwrap();
        fs::write(dir.join("bad.md"), "no front matter").unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let listing = list_directory(&dir).unwrap();
        assert_eq!(listing.posts.len(), 1);
        assert_eq!(listing.posts[0].slug, "good");
        assert_eq!(listing.errors.len(), 1);
        assert_eq!(listing.errors[0].item, "bad");
    }

    #[test]
    fn test_missing_directory_fails_the_listing() {
        let _ = list_directory(Utf8Path::new("/definitely/not/here")).unwrap_err();
    }
}
