// Profile Gate - Profile Store
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Read-only profile document: profile, projects, writing, experience,
// skills. Loaded once at startup from a JSON file, or the embedded sample.
// Queries keep document order; absent filters mean "no filtering".

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

const EMBEDDED_PROFILE: &str = include_str!("../data/profile.json");

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read profile document {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid profile document: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDocument {
    pub profile: Profile,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub writing: Vec<Writing>,
    #[serde(default)]
    pub experience: Vec<Experience>,
    #[serde(default)]
    pub skills: Vec<SkillGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub headline: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub links: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Writing {
    pub title: String,
    pub platform: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Experience {
    pub company: String,
    pub role: String,
    pub start: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default)]
    pub current: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillGroup {
    pub category: String,
    #[serde(default)]
    pub items: Vec<String>,
}

/// Case-insensitive text match
fn same_text(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// In-memory profile document
#[derive(Debug, Clone)]
pub struct ProfileStore {
    doc: ProfileDocument,
}

impl ProfileStore {
    pub fn from_document(doc: ProfileDocument) -> Self {
        Self { doc }
    }

    /// Sample document compiled into the binary
    pub fn embedded() -> Result<Self, ProfileError> {
        Ok(Self::from_document(serde_json::from_str(EMBEDDED_PROFILE)?))
    }

    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let content = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc: ProfileDocument = serde_json::from_str(&content)?;
        log::info!(
            "profile loaded from {:?}: {} projects, {} writing, {} roles, {} skill groups",
            path,
            doc.projects.len(),
            doc.writing.len(),
            doc.experience.len(),
            doc.skills.len()
        );
        Ok(Self::from_document(doc))
    }

    /// Configured path if given, embedded sample otherwise
    pub fn open(path: Option<&Path>) -> Result<Self, ProfileError> {
        match path {
            Some(p) => Self::load(p),
            None => Self::embedded(),
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.doc.profile
    }

    /// Projects whose tag set contains `tag` (case-insensitive)
    pub fn projects(&self, tag: Option<&str>, featured_only: bool) -> Vec<&Project> {
        self.doc
            .projects
            .iter()
            .filter(|p| !featured_only || p.featured)
            .filter(|p| tag.map_or(true, |t| p.tags.iter().any(|pt| same_text(pt, t))))
            .collect()
    }

    /// Writing from `platform`, first `limit` in document order
    pub fn writing(&self, platform: Option<&str>, limit: Option<usize>) -> Vec<&Writing> {
        self.doc
            .writing
            .iter()
            .filter(|w| platform.map_or(true, |p| same_text(&w.platform, p)))
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }

    pub fn experience(&self, current_only: bool) -> Vec<&Experience> {
        self.doc
            .experience
            .iter()
            .filter(|e| !current_only || e.current)
            .collect()
    }

    pub fn skills(&self, category: Option<&str>) -> Vec<&SkillGroup> {
        self.doc
            .skills
            .iter()
            .filter(|s| category.map_or(true, |c| same_text(&s.category, c)))
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> ProfileStore {
        ProfileStore::embedded().unwrap()
    }

    #[test]
    fn embedded_document_parses() {
        let store = store();
        assert!(!store.profile().name.is_empty());
        assert!(!store.projects(None, false).is_empty());
        assert!(!store.writing(None, None).is_empty());
        assert!(!store.experience(false).is_empty());
        assert!(!store.skills(None).is_empty());
    }

    #[test]
    fn tag_filter_is_case_insensitive_subsequence() {
        let store = store();
        let all = store.projects(None, false);
        let lower = store.projects(Some("rust"), false);
        let upper = store.projects(Some("RUST"), false);
        assert_eq!(lower, upper);
        assert!(!lower.is_empty());

        let expected: Vec<&Project> = all
            .iter()
            .copied()
            .filter(|p| p.tags.iter().any(|t| t.eq_ignore_ascii_case("rust")))
            .collect();
        assert_eq!(lower, expected);
    }

    #[test]
    fn unknown_tag_yields_empty() {
        assert!(store().projects(Some("cobol-on-mars"), false).is_empty());
    }

    #[test]
    fn featured_only_filters() {
        let store = store();
        let featured = store.projects(None, true);
        assert!(featured.iter().all(|p| p.featured));
        assert!(featured.len() < store.projects(None, false).len());
    }

    #[test]
    fn writing_limit_keeps_order() {
        let store = store();
        let all = store.writing(None, None);
        assert_eq!(store.writing(None, Some(2)), all[..2].to_vec());
        assert_eq!(store.writing(None, Some(0)), Vec::<&Writing>::new());
        assert_eq!(store.writing(None, Some(all.len() + 10)), all);
    }

    #[test]
    fn writing_platform_filter() {
        let store = store();
        let blog = store.writing(Some("Blog"), None);
        assert!(!blog.is_empty());
        assert!(blog.iter().all(|w| w.platform.eq_ignore_ascii_case("blog")));
    }

    #[test]
    fn experience_current_only() {
        let store = store();
        let current = store.experience(true);
        assert_eq!(current.len(), 1);
        assert!(current[0].current);
    }

    #[test]
    fn skills_category_filter() {
        let store = store();
        let langs = store.skills(Some("languages"));
        assert_eq!(langs.len(), 1);
        assert!(store.skills(Some("nope")).is_empty());
    }

    #[test]
    fn load_reports_missing_and_invalid_files() {
        let dir = tempdir().unwrap();
        let missing = ProfileStore::load(&dir.path().join("missing.json"));
        assert!(matches!(missing, Err(ProfileError::Io { .. })));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{\"profile\": 3}").unwrap();
        assert!(matches!(ProfileStore::load(&bad), Err(ProfileError::Parse(_))));
    }

    #[test]
    fn load_minimal_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p.json");
        std::fs::write(&path, r#"{"profile": {"name": "Ada", "headline": "Engineer"}}"#).unwrap();
        let store = ProfileStore::open(Some(&path)).unwrap();
        assert_eq!(store.profile().name, "Ada");
        assert!(store.projects(None, false).is_empty());
    }
}
