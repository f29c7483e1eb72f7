//! The registry of tracked orgs and libraries.
//!
//! Every refresher resolves its work list from here: which npm packages belong to which
//! library, which GitHub repository backs it, and which org a library rolls up into.

use crate::Result;
use ohno::bail;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An org whose libraries are tracked.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Org {
    /// Identifier used as the key of org-level stats rows.
    pub id: String,

    /// GitHub organization login.
    pub github: String,
}

/// A tracked library.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Library {
    pub id: String,

    /// Display name, defaults to the id.
    #[serde(default)]
    pub name: Option<String>,

    /// Id of the owning org.
    pub org: String,

    /// GitHub repository as `owner/name`.
    pub repo: String,

    /// npm packages published by this library, in registration order.
    #[serde(default)]
    pub packages: Vec<String>,

    /// Older package names (often unscoped) whose downloads still count toward the library.
    #[serde(default)]
    pub legacy_packages: Vec<String>,

    /// Whether GitHub releases of the repository flow into the feed.
    #[serde(default = "default_track_releases")]
    pub track_releases: bool,
}

const fn default_track_releases() -> bool {
    true
}

impl Library {
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Current and legacy packages, in registration order.
    pub fn all_packages(&self) -> impl Iterator<Item = &str> {
        self.packages.iter().chain(self.legacy_packages.iter()).map(String::as_str)
    }

    /// The repository split into owner and name.
    #[must_use]
    pub fn repo_ref(&self) -> Option<RepoRef> {
        RepoRef::parse(&self.repo)
    }
}

/// A GitHub repository reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// Parse `owner/name`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let (owner, name) = s.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }

        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl core::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A package to refresh, with the library it was first registered under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRef {
    pub name: String,
    pub library_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    orgs: Vec<Org>,
    libraries: Vec<Library>,
}

impl Registry {
    /// Build a registry, rejecting duplicate ids, dangling org references and malformed repositories.
    pub fn new(orgs: Vec<Org>, libraries: Vec<Library>) -> Result<Self> {
        let mut org_ids = HashSet::new();
        for org in &orgs {
            if org.id.is_empty() {
                bail!("org id must not be empty");
            }

            if !org_ids.insert(org.id.as_str()) {
                bail!("duplicate org id '{}'", org.id);
            }
        }

        let mut library_ids = HashSet::new();
        for library in &libraries {
            if library.id.is_empty() {
                bail!("library id must not be empty");
            }

            if !library_ids.insert(library.id.as_str()) {
                bail!("duplicate library id '{}'", library.id);
            }

            if !org_ids.contains(library.org.as_str()) {
                bail!("library '{}' refers to unknown org '{}'", library.id, library.org);
            }

            if library.repo_ref().is_none() {
                bail!("library '{}' has malformed repository '{}', expected 'owner/name'", library.id, library.repo);
            }
        }

        Ok(Self { orgs, libraries })
    }

    #[must_use]
    pub fn orgs(&self) -> &[Org] {
        &self.orgs
    }

    #[must_use]
    pub fn org(&self, id: &str) -> Option<&Org> {
        self.orgs.iter().find(|org| org.id == id)
    }

    #[must_use]
    pub fn libraries(&self) -> &[Library] {
        &self.libraries
    }

    #[must_use]
    pub fn library(&self, id: &str) -> Option<&Library> {
        self.libraries.iter().find(|library| library.id == id)
    }

    #[must_use]
    pub fn contains_library(&self, id: &str) -> bool {
        self.library(id).is_some()
    }

    /// Libraries of an org, in registration order.
    pub fn libraries_for_org<'a>(&'a self, org_id: &'a str) -> impl Iterator<Item = &'a Library> {
        self.libraries.iter().filter(move |library| library.org == org_id)
    }

    /// Every package of an org in registration order, each listed once.
    #[must_use]
    pub fn packages_for_org(&self, org_id: &str) -> Vec<PackageRef> {
        let mut seen = HashSet::new();
        let mut packages = Vec::new();

        for library in self.libraries_for_org(org_id) {
            for package in library.all_packages() {
                if seen.insert(package) {
                    packages.push(PackageRef {
                        name: package.to_string(),
                        library_id: library.id.clone(),
                    });
                }
            }
        }

        packages
    }

    /// Repositories whose releases are synced into the feed, each listed once, with the
    /// library they belong to.
    #[must_use]
    pub fn release_repos(&self) -> Vec<(RepoRef, &Library)> {
        let mut seen = HashSet::new();
        self.libraries
            .iter()
            .filter(|library| library.track_releases)
            .filter_map(|library| library.repo_ref().map(|repo| (repo, library)))
            .filter(|(repo, _)| seen.insert(repo.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org() -> Org {
        Org {
            id: "tanstack".into(),
            github: "TanStack".into(),
        }
    }

    fn library(id: &str, repo: &str, packages: &[&str], legacy: &[&str]) -> Library {
        Library {
            id: id.into(),
            name: None,
            org: "tanstack".into(),
            repo: repo.into(),
            packages: packages.iter().map(ToString::to_string).collect(),
            legacy_packages: legacy.iter().map(ToString::to_string).collect(),
            track_releases: true,
        }
    }

    #[test]
    fn packages_in_registration_order_without_duplicates() {
        let registry = Registry::new(
            vec![org()],
            vec![
                library("query", "TanStack/query", &["@tanstack/query-core", "@tanstack/react-query"], &["react-query"]),
                library("table", "TanStack/table", &["@tanstack/table-core", "@tanstack/query-core"], &[]),
            ],
        )
        .unwrap();

        let names: Vec<_> = registry.packages_for_org("tanstack").into_iter().map(|p| p.name).collect();
        assert_eq!(
            names,
            vec!["@tanstack/query-core", "@tanstack/react-query", "react-query", "@tanstack/table-core"]
        );
        assert!(registry.packages_for_org("other").is_empty());
    }

    #[test]
    fn rejects_duplicate_library() {
        let err = Registry::new(
            vec![org()],
            vec![library("query", "TanStack/query", &[], &[]), library("query", "TanStack/query", &[], &[])],
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate library id"));
    }

    #[test]
    fn rejects_unknown_org_and_bad_repo() {
        let mut lib = library("query", "TanStack/query", &[], &[]);
        lib.org = "nope".into();
        let _ = Registry::new(vec![org()], vec![lib]).unwrap_err();

        let _ = Registry::new(vec![org()], vec![library("query", "not-a-repo", &[], &[])]).unwrap_err();
    }

    #[test]
    fn repo_ref_parsing() {
        assert_eq!(
            RepoRef::parse("TanStack/query"),
            Some(RepoRef {
                owner: "TanStack".into(),
                name: "query".into()
            })
        );
        assert_eq!(RepoRef::parse("a/b/c"), None);
        assert_eq!(RepoRef::parse("/b"), None);
        assert_eq!(RepoRef::parse("TanStack/query").unwrap().to_string(), "TanStack/query");
    }

    #[test]
    fn release_repos_skip_untracked_and_duplicates() {
        let mut untracked = library("router", "TanStack/router", &[], &[]);
        untracked.track_releases = false;
        let registry = Registry::new(
            vec![org()],
            vec![
                library("query", "TanStack/query", &[], &[]),
                library("vue-query", "TanStack/query", &[], &[]),
                untracked,
            ],
        )
        .unwrap();

        let repos = registry.release_repos();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].1.id, "query");
    }
}
