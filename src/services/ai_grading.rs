use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::config::Settings;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GradeOutcome {
    pub(crate) score: f64,
    pub(crate) feedback: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum GradingError {
    #[error("grader request failed: {0}")]
    Transport(String),
    #[error("grader returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("grader rejected attempt: {0}")]
    Rejected(String),
    #[error("grader response is malformed: {0}")]
    Malformed(String),
}

/// External evaluator for a submitted answer sheet.
#[async_trait]
pub(crate) trait Grader: Send + Sync {
    async fn grade(
        &self,
        attempt_id: &str,
        answer_artifact: &str,
    ) -> Result<GradeOutcome, GradingError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvaluateRequest<'a> {
    attempt_id: &'a str,
    answer_sheet_path: &'a str,
}

#[derive(Debug, Deserialize)]
struct EvaluateResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    feedback: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl EvaluateResponse {
    fn into_outcome(self) -> Result<GradeOutcome, GradingError> {
        if !self.success {
            return Err(GradingError::Rejected(
                self.message.unwrap_or_else(|| "no reason given".to_string()),
            ));
        }
        let score = self
            .score
            .filter(|score| score.is_finite())
            .ok_or_else(|| GradingError::Malformed("missing numeric score".to_string()))?;
        Ok(GradeOutcome { score, feedback: self.feedback })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct HttpGrader {
    client: Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
}

impl HttpGrader {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let grader = settings.grader();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(grader.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            api_key: grader.api_key.clone(),
            base_url: grader.base_url.trim_end_matches('/').to_string(),
            max_retries: grader.max_retries,
        })
    }

    async fn call_once(
        &self,
        url: &str,
        payload: &EvaluateRequest<'_>,
    ) -> Result<EvaluateResponse, GradingError> {
        let mut request = self.client.post(url).json(payload);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response =
            request.send().await.map_err(|err| GradingError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GradingError::Status { status: status.as_u16(), body });
        }

        response.json().await.map_err(|err| GradingError::Malformed(err.to_string()))
    }
}

fn is_retryable(err: &GradingError) -> bool {
    match err {
        GradingError::Transport(_) => true,
        GradingError::Status { status, .. } => *status >= 500 || *status == 429,
        GradingError::Rejected(_) | GradingError::Malformed(_) => false,
    }
}

#[async_trait]
impl Grader for HttpGrader {
    async fn grade(
        &self,
        attempt_id: &str,
        answer_artifact: &str,
    ) -> Result<GradeOutcome, GradingError> {
        let url = format!("{}/evaluate", self.base_url);
        let payload = EvaluateRequest { attempt_id, answer_sheet_path: answer_artifact };
        let timer = Instant::now();

        tracing::info!(attempt_id, "Sending grading request");

        let mut attempt = 0;
        let result = loop {
            match self.call_once(&url, &payload).await {
                Err(err) if is_retryable(&err) && attempt < self.max_retries => {
                    tracing::warn!(attempt_id, retry = attempt + 1, error = %err, "Grader call failed; retrying");
                    tokio::time::sleep(Duration::from_secs(2_u64.pow(attempt))).await;
                    attempt += 1;
                }
                other => break other,
            }
        };

        let outcome = result?.into_outcome()?;
        tracing::info!(
            attempt_id,
            score = outcome.score,
            duration_seconds = timer.elapsed().as_secs_f64(),
            "Grading completed"
        );
        Ok(outcome)
    }
}
