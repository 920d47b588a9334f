use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::config::Settings;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct PaperStudent {
    pub(crate) student_id: String,
    pub(crate) name: String,
    pub(crate) reg_no: String,
}

/// One exam's worth of papers: a personalised paper per listed student.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct PaperRequest {
    pub(crate) exam_id: String,
    pub(crate) class_id: String,
    pub(crate) custom_title: String,
    pub(crate) section: String,
    pub(crate) total_marks: i32,
    pub(crate) sets_per_student: u32,
    pub(crate) student_count: usize,
    pub(crate) student_details: Vec<PaperStudent>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GeneratedPaper {
    pub(crate) student_id: String,
    pub(crate) set_number: u32,
    pub(crate) paper_ref: String,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum PaperGenerationError {
    #[error("paper generator is not configured")]
    NotConfigured,
    #[error("paper generator request failed: {0}")]
    Transport(String),
    #[error("paper generator returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("paper generator rejected exam: {0}")]
    Rejected(String),
    #[error("paper generator response is malformed: {0}")]
    Malformed(String),
}

/// External service that lays out question papers for an exam.
#[async_trait]
pub(crate) trait PaperGenerator: Send + Sync {
    async fn generate(&self, request: &PaperRequest)
        -> Result<Vec<GeneratedPaper>, PaperGenerationError>;
}

#[derive(Debug, Deserialize)]
struct GeneratedPaperBody {
    student_id: String,
    #[serde(default = "first_set")]
    set_number: u32,
    #[serde(default)]
    pdf_path: Option<String>,
}

fn first_set() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct GeneratePapersResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    papers: Vec<GeneratedPaperBody>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl GeneratePapersResponse {
    /// Papers without a file reference are skipped; an empty result is an error.
    fn into_papers(self, exam_id: &str) -> Result<Vec<GeneratedPaper>, PaperGenerationError> {
        if !self.success {
            return Err(PaperGenerationError::Rejected(
                self.error.or(self.message).unwrap_or_else(|| "no reason given".to_string()),
            ));
        }

        let papers: Vec<GeneratedPaper> = self
            .papers
            .into_iter()
            .filter_map(|paper| match paper.pdf_path {
                Some(paper_ref) if !paper_ref.trim().is_empty() => Some(GeneratedPaper {
                    student_id: paper.student_id,
                    set_number: paper.set_number,
                    paper_ref,
                }),
                _ => {
                    tracing::warn!(
                        exam_id,
                        student_id = %paper.student_id,
                        "Generated paper has no file reference; skipping"
                    );
                    None
                }
            })
            .collect();

        if papers.is_empty() {
            return Err(PaperGenerationError::Malformed("no usable papers returned".to_string()));
        }
        Ok(papers)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct HttpPaperGenerator {
    client: Client,
    base_url: String,
}

impl HttpPaperGenerator {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let papers = settings.paper_generator();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(papers.request_timeout_seconds))
            .build()?;

        Ok(Self { client, base_url: papers.base_url.trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl PaperGenerator for HttpPaperGenerator {
    async fn generate(
        &self,
        request: &PaperRequest,
    ) -> Result<Vec<GeneratedPaper>, PaperGenerationError> {
        if self.base_url.is_empty() {
            return Err(PaperGenerationError::NotConfigured);
        }

        let url = format!("{}/api/generate-papers", self.base_url);
        let timer = Instant::now();
        tracing::info!(
            exam_id = %request.exam_id,
            students = request.student_count,
            "Sending paper generation request"
        );

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|err| PaperGenerationError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaperGenerationError::Status { status: status.as_u16(), body });
        }

        let body: GeneratePapersResponse =
            response.json().await.map_err(|err| PaperGenerationError::Malformed(err.to_string()))?;
        let papers = body.into_papers(&request.exam_id)?;

        tracing::info!(
            exam_id = %request.exam_id,
            papers = papers.len(),
            duration_seconds = timer.elapsed().as_secs_f64(),
            "Paper generation completed"
        );
        Ok(papers)
    }
}
