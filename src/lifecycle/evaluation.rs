use serde::Serialize;

use super::attempt_machine::ensure_score_in_range;
use super::exam_machine::ensure_owner;
use super::transitions::ensure_transition;
use super::{ExamEngine, LifecycleError, LifecycleResult};
use crate::db::models::{Attempt, Exam};
use crate::db::types::{AttemptStatus, EvaluationMode, ExamStatus};
use crate::store::AttemptFilter;

pub(super) const EVALUATION_JOB: &str = "evaluation";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct EvaluationFailure {
    pub(crate) attempt_id: String,
    pub(crate) error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub(crate) struct EvaluationSummary {
    pub(crate) total: usize,
    pub(crate) evaluated: usize,
    pub(crate) failed: usize,
    pub(crate) errors: Vec<EvaluationFailure>,
}

impl EvaluationSummary {
    fn fail(&mut self, attempt_id: &str, error: impl ToString) {
        self.failed += 1;
        self.errors.push(EvaluationFailure {
            attempt_id: attempt_id.to_string(),
            error: error.to_string(),
        });
    }
}

impl ExamEngine {
    /// Hands every submitted answer sheet of a closed exam to the grader.
    ///
    /// The exam moves to `evaluating` before any grading call, so a partial run stays
    /// visible. Per-attempt failures are collected in the summary and never abort the batch.
    /// Results cannot be published until the batch returns.
    pub(crate) async fn trigger_evaluation(
        &self,
        exam_id: &str,
        actor_id: Option<&str>,
    ) -> LifecycleResult<EvaluationSummary> {
        let (exam, batch, _job) = {
            let _guard = self.locks().exam(exam_id).await;
            let mut exam = self.load_exam(exam_id).await?;
            if let Some(actor_id) = actor_id {
                ensure_owner(&exam, actor_id)?;
            }
            if exam.evaluation_mode == EvaluationMode::Manual {
                return Err(LifecycleError::Validation(format!(
                    "exam {exam_id} is graded manually"
                )));
            }
            ensure_transition(exam.status, ExamStatus::Evaluating)?;

            let submitted = AttemptFilter::for_exam(exam_id).with_status(AttemptStatus::Submitted);
            let batch: Vec<Attempt> = self
                .store()
                .list_attempts(&submitted)
                .await?
                .into_iter()
                .filter(|attempt| attempt.answer_artifact.is_some())
                .collect();
            if batch.is_empty() {
                return Err(LifecycleError::EmptyBatch(exam_id.to_string()));
            }

            let job = self.begin_job(EVALUATION_JOB, exam_id).ok_or_else(|| {
                LifecycleError::Conflict(format!("evaluation of exam {exam_id} is already running"))
            })?;
            self.advance(&mut exam, ExamStatus::Evaluating, actor_id).await?;
            (exam, batch, job)
        };

        let mut summary = EvaluationSummary { total: batch.len(), ..EvaluationSummary::default() };
        for attempt in &batch {
            match self.evaluate_one(&exam, attempt).await {
                Ok(()) => summary.evaluated += 1,
                Err(error) => {
                    tracing::warn!(
                        exam_id = %exam.id,
                        attempt_id = %attempt.id,
                        error = %error,
                        "Attempt evaluation failed"
                    );
                    summary.fail(&attempt.id, error);
                }
            }
        }

        metrics::counter!("evaluations_total", "status" => "success")
            .increment(summary.evaluated as u64);
        metrics::counter!("evaluations_total", "status" => "failed").increment(summary.failed as u64);
        tracing::info!(
            exam_id = %exam.id,
            total = summary.total,
            evaluated = summary.evaluated,
            failed = summary.failed,
            action = "exam_evaluate",
            "Evaluation batch finished"
        );
        Ok(summary)
    }

    async fn evaluate_one(&self, exam: &Exam, candidate: &Attempt) -> Result<(), String> {
        let artifact = candidate
            .answer_artifact
            .as_deref()
            .ok_or_else(|| "attempt has no answer sheet".to_string())?;

        let outcome =
            self.inner.grader.grade(&candidate.id, artifact).await.map_err(|err| err.to_string())?;
        ensure_score_in_range(exam, outcome.score).map_err(|err| err.to_string())?;

        let _guard = self.locks().attempt(&candidate.id).await;
        let mut attempt = self.load_attempt(&candidate.id).await.map_err(|err| err.to_string())?;
        self.record_score(&mut attempt, outcome.score, outcome.feedback)
            .await
            .map_err(|err| err.to_string())?;

        tracing::info!(
            exam_id = %exam.id,
            attempt_id = %attempt.id,
            score = outcome.score,
            action = "attempt_evaluate",
            "Attempt evaluated"
        );
        Ok(())
    }
}
