//! Optional semantic classifier consulted during grading
//!
//! Best effort only: failures are logged and the fuzzy suggestion stands.

use crate::types::Categorization;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SemanticError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Classifier returned status {0}")]
    Status(u16),

    #[error("Classifier reported failure")]
    Unsuccessful,

    #[error("Response parsing failed: {0}")]
    Parse(String),
}

/// One classified response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemanticMatch {
    pub response: String,
    #[serde(default)]
    pub best_match: Option<String>,
    #[serde(default)]
    pub similarity: f64,
    /// 0-100
    #[serde(default)]
    pub confidence: f64,
}

#[async_trait]
pub trait SemanticMatcher: Send + Sync {
    async fn classify(
        &self,
        question: &str,
        accepted: &[String],
        responses: &[String],
    ) -> Result<Vec<SemanticMatch>, SemanticError>;
}

pub struct HttpSemanticMatcher {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSemanticMatcher {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, SemanticError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SemanticError::Request(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    question: &'a str,
    correct_answers: &'a [String],
    responses: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    success: bool,
    #[serde(default)]
    results: Vec<SemanticMatch>,
}

#[async_trait]
impl SemanticMatcher for HttpSemanticMatcher {
    async fn classify(
        &self,
        question: &str,
        accepted: &[String],
        responses: &[String],
    ) -> Result<Vec<SemanticMatch>, SemanticError> {
        let response = self
            .client
            .post(format!("{}/semantic-match", self.base_url))
            .json(&ClassifyRequest {
                question,
                correct_answers: accepted,
                responses,
            })
            .send()
            .await
            .map_err(|e| SemanticError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SemanticError::Status(response.status().as_u16()));
        }

        let body: ClassifyResponse = response
            .json()
            .await
            .map_err(|e| SemanticError::Parse(e.to_string()))?;

        if !body.success {
            return Err(SemanticError::Unsuccessful);
        }
        Ok(body.results)
    }
}

/// Move uncategorized answers into the bucket the classifier picked
///
/// Only matches at or above `min_confidence` whose `best_match` names an
/// existing bucket label are applied. Returns how many answers moved.
pub fn merge_matches(
    categorization: &mut Categorization,
    matches: &[SemanticMatch],
    min_confidence: f64,
) -> usize {
    let mut moved = 0;
    for m in matches {
        if m.confidence < min_confidence {
            continue;
        }
        let Some(target) = m.best_match.as_deref() else {
            continue;
        };
        let Some(position) = categorization
            .uncategorized
            .iter()
            .position(|a| *a == m.response)
        else {
            continue;
        };
        let Some(bucket) = categorization
            .buckets
            .iter_mut()
            .find(|b| b.label.eq_ignore_ascii_case(target))
        else {
            continue;
        };

        let answer = categorization.uncategorized.remove(position);
        bucket.answers.push(answer);
        moved += 1;
    }
    moved
}
