//! Relevance strategies for picking a search hit.
//!
//! The lookup service returns several loosely matching entities per query. A
//! strategy decides which of them plausibly describe the candidate; the resolver
//! takes the first hit the strategy accepts.

use serde::Deserialize;

use crate::domain::Candidate;

/// One entity returned by the search API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchHit {
    /// Entity id, e.g. "Q7889"
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl SearchHit {
    pub fn new(id: impl Into<String>, description: Option<&str>) -> Self {
        Self {
            id: id.into(),
            label: None,
            description: description.map(str::to_string),
        }
    }
}

/// Decides whether a search hit describes the candidate.
pub trait RelevanceStrategy: Send + Sync {
    fn is_relevant(&self, candidate: &Candidate, hit: &SearchHit) -> bool;
}

/// Accepts hits whose description contains any of the keywords (case-insensitive).
#[derive(Debug, Clone)]
pub struct DescriptionKeywords {
    keywords: Vec<String>,
}

impl DescriptionKeywords {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl Default for DescriptionKeywords {
    fn default() -> Self {
        Self::new(["video game", "game"])
    }
}

impl RelevanceStrategy for DescriptionKeywords {
    fn is_relevant(&self, _candidate: &Candidate, hit: &SearchHit) -> bool {
        let Some(description) = hit.description.as_deref() else {
            return false;
        };
        let description = description.to_lowercase();
        self.keywords.iter().any(|k| description.contains(k.as_str()))
    }
}

/// Accepts every hit; the search ranking alone decides.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptFirst;

impl RelevanceStrategy for AcceptFirst {
    fn is_relevant(&self, _candidate: &Candidate, _hit: &SearchHit) -> bool {
        true
    }
}
