//! Question repository collaborator
//!
//! The engine only reads prompts. When no repository is configured, or it fails,
//! a small built-in prompt set is used instead.

use crate::types::Prompt;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Repository returned status {0}")]
    Status(u16),

    #[error("Response parsing failed: {0}")]
    Parse(String),
}

/// Read-only source of ordered prompts
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    async fn list_prompts(&self) -> Result<Vec<Prompt>, RepositoryError>;

    fn name(&self) -> &str;
}

/// Repository backed by an HTTP endpoint returning a JSON array of prompts
pub struct HttpQuestionRepository {
    url: String,
    client: reqwest::Client,
}

impl HttpQuestionRepository {
    pub fn new(url: String, timeout: Duration) -> Result<Self, RepositoryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RepositoryError::Request(e.to_string()))?;
        Ok(Self { url, client })
    }
}

/// Accepts both the engine's field names and the question table's column names
#[derive(Debug, Deserialize)]
struct PromptRow {
    #[serde(alias = "prompt")]
    text: String,
    #[serde(alias = "correct_answers", default)]
    accepted_answers: Vec<String>,
    #[serde(alias = "round", default = "default_round")]
    round_number: u32,
    #[serde(alias = "question_order", default)]
    order_in_round: u32,
}

fn default_round() -> u32 {
    1
}

impl From<PromptRow> for Prompt {
    fn from(row: PromptRow) -> Self {
        Prompt {
            text: row.text,
            accepted_answers: row.accepted_answers,
            round_number: row.round_number,
            order_in_round: row.order_in_round,
        }
    }
}

#[async_trait]
impl QuestionRepository for HttpQuestionRepository {
    async fn list_prompts(&self) -> Result<Vec<Prompt>, RepositoryError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| RepositoryError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RepositoryError::Status(response.status().as_u16()));
        }

        let rows: Vec<PromptRow> = response
            .json()
            .await
            .map_err(|e| RepositoryError::Parse(e.to_string()))?;

        let mut prompts: Vec<Prompt> = rows.into_iter().map(Prompt::from).collect();
        sort_prompts(&mut prompts);
        Ok(prompts)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Order by round, then position within the round
pub fn sort_prompts(prompts: &mut [Prompt]) {
    prompts.sort_by_key(|p| (p.round_number, p.order_in_round));
}

fn prompt(text: &str, answers: &[&str], round_number: u32, order_in_round: u32) -> Prompt {
    Prompt {
        text: text.to_string(),
        accepted_answers: answers.iter().map(|a| a.to_string()).collect(),
        round_number,
        order_in_round,
    }
}

/// Built-in prompt set used without a working repository
pub fn fallback_prompts() -> Vec<Prompt> {
    vec![
        prompt(
            "Name a food that starts with the letter 'P'",
            &["pizza", "pasta", "potato", "pear", "peach", "pineapple", "pancake", "popcorn"],
            1,
            1,
        ),
        prompt(
            "Name a movie that won an Oscar",
            &[
                "titanic",
                "forrest gump",
                "the godfather",
                "schindler's list",
                "casablanca",
                "gone with the wind",
            ],
            1,
            2,
        ),
        prompt(
            "Name a country in Europe",
            &["france", "germany", "italy", "spain", "england", "netherlands", "belgium", "switzerland"],
            1,
            3,
        ),
        prompt(
            "Name a famous scientist",
            &["einstein", "newton", "darwin", "curie", "tesla", "galileo", "hawking", "edison"],
            2,
            1,
        ),
        prompt(
            "Name a type of music genre",
            &["rock", "jazz", "pop", "classical", "hip hop", "country", "blues", "electronic"],
            2,
            2,
        ),
    ]
}

/// Fetch prompts, degrading to the built-in set on any failure or empty result
pub async fn load_prompts(repository: Option<&dyn QuestionRepository>) -> Vec<Prompt> {
    let Some(repository) = repository else {
        tracing::debug!("No question repository configured, using built-in prompts");
        return fallback_prompts();
    };

    match repository.list_prompts().await {
        Ok(prompts) if !prompts.is_empty() => {
            tracing::info!(
                "Loaded {} prompts from {} repository",
                prompts.len(),
                repository.name()
            );
            prompts
        }
        Ok(_) => {
            tracing::warn!("Question repository returned no prompts, using built-in prompts");
            fallback_prompts()
        }
        Err(e) => {
            let err = crate::error::SessionError::UpstreamUnavailable(e.to_string());
            tracing::warn!("{}, using built-in prompts", err);
            fallback_prompts()
        }
    }
}
