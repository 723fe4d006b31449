//! External collaborator traits: web search and image generation
//! backends. Concrete providers live outside the orchestrator; the mock
//! implementations here back tests and local development.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ha_domain::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Web search
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        advanced: bool,
    ) -> Result<Vec<SearchResult>>;
}

/// Deterministic fake results for tests and offline development.
pub struct MockSearchProvider;

#[async_trait]
impl SearchProvider for MockSearchProvider {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        _advanced: bool,
    ) -> Result<Vec<SearchResult>> {
        Ok((0..max_results.min(3))
            .map(|i| SearchResult {
                title: format!("Result {} for {query}", i + 1),
                url: format!("https://example.com/{}/{}", query.replace(' ', "-"), i + 1),
                snippet: format!("Snippet {} about {query}", i + 1),
                relevance_score: Some(1.0 - 0.1 * i as f64),
            })
            .collect())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Image generation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedImage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub mime_type: String,
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        size: &str,
        n: usize,
        quality: &str,
    ) -> Result<Vec<GeneratedImage>>;
}

pub struct MockImageProvider;

#[async_trait]
impl ImageProvider for MockImageProvider {
    async fn generate(
        &self,
        _prompt: &str,
        _size: &str,
        n: usize,
        _quality: &str,
    ) -> Result<Vec<GeneratedImage>> {
        Ok((0..n.clamp(1, 4))
            .map(|_| GeneratedImage {
                data_base64: Some("iVBORw0KGgo=".into()),
                url: None,
                mime_type: "image/png".into(),
            })
            .collect())
    }
}
