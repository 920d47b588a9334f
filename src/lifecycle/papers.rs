use sqlx::types::Json;

use super::exam_machine::ensure_owner;
use super::{ExamEngine, LifecycleError, LifecycleResult};
use crate::db::models::{Exam, QuestionPaper};
use crate::db::types::{EnrollmentStatus, ExamStatus};
use crate::services::paper_generation::{PaperRequest, PaperStudent};

pub(super) const PAPERS_JOB: &str = "papers";
const SETS_PER_STUDENT: u32 = 1;

fn ensure_papers_allowed(exam: &Exam) -> LifecycleResult<()> {
    if !matches!(exam.status, ExamStatus::Draft | ExamStatus::Published) {
        return Err(LifecycleError::InvalidState(format!(
            "papers for exam {} cannot be generated once it is {}",
            exam.id, exam.status
        )));
    }
    if exam.papers_generated_at.is_some() {
        return Err(LifecycleError::InvalidState(format!(
            "papers for exam {} were already generated",
            exam.id
        )));
    }
    Ok(())
}

impl ExamEngine {
    /// Requests one question paper per active student and stores the returned references.
    ///
    /// Allowed once, while the exam is draft or published. The generator is called
    /// outside the exam lock; a second request for the same exam meanwhile is a conflict.
    pub(crate) async fn generate_papers(
        &self,
        exam_id: &str,
        actor_id: &str,
    ) -> LifecycleResult<Exam> {
        let (request, _job) = {
            let _guard = self.locks().exam(exam_id).await;
            let exam = self.load_exam(exam_id).await?;
            ensure_owner(&exam, actor_id)?;
            ensure_papers_allowed(&exam)?;
            let job = self.begin_job(PAPERS_JOB, exam_id).ok_or_else(|| {
                LifecycleError::Conflict(format!(
                    "paper generation for exam {exam_id} is already running"
                ))
            })?;
            (self.paper_request(&exam).await?, job)
        };

        let generated = self.inner.papers.generate(&request).await.map_err(|err| {
            tracing::warn!(exam_id, error = %err, "Paper generation failed");
            LifecycleError::Unavailable(err.to_string())
        })?;

        let _guard = self.locks().exam(exam_id).await;
        let mut exam = self.load_exam(exam_id).await?;
        let now = self.now();
        exam.papers = Json(
            generated
                .into_iter()
                .map(|paper| QuestionPaper {
                    student_id: paper.student_id,
                    set_number: paper.set_number,
                    paper_ref: paper.paper_ref,
                })
                .collect(),
        );
        exam.papers_generated_at = Some(now);
        exam.updated_at = now;
        self.store().save_exam(&exam).await?;

        metrics::counter!("papers_generated_total").increment(exam.papers.len() as u64);
        tracing::info!(
            teacher_id = %actor_id,
            exam_id = %exam.id,
            papers = exam.papers.len(),
            action = "exam_generate_papers",
            "Question papers generated"
        );
        Ok(exam)
    }

    /// The caller's own paper, for anyone allowed to view the exam.
    pub(crate) async fn paper_for_student(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> LifecycleResult<QuestionPaper> {
        let exam = self.view_exam(exam_id, student_id).await?;
        let paper = exam.papers.0.into_iter().find(|paper| paper.student_id == student_id);
        paper.ok_or_else(|| LifecycleError::NotFound {
            entity: "paper",
            id: format!("{exam_id}/{student_id}"),
        })
    }

    async fn paper_request(&self, exam: &Exam) -> LifecycleResult<PaperRequest> {
        let class = self.store().find_class(&exam.class_id).await?.ok_or_else(|| {
            LifecycleError::NotFound { entity: "class", id: exam.class_id.clone() }
        })?;

        let mut students = Vec::new();
        for enrollment in self.store().list_enrollments(&class.id).await? {
            if enrollment.status != EnrollmentStatus::Active {
                continue;
            }
            let Some(user) = self.store().find_user(&enrollment.student_id).await? else {
                continue;
            };
            if user.is_active {
                students.push(PaperStudent {
                    student_id: user.id,
                    name: user.full_name,
                    reg_no: user.email,
                });
            }
        }
        if students.is_empty() {
            return Err(LifecycleError::Validation(format!(
                "no students are enrolled in class {}",
                class.id
            )));
        }

        Ok(PaperRequest {
            exam_id: exam.id.clone(),
            class_id: class.id,
            custom_title: exam.title.clone(),
            section: class.title,
            total_marks: exam.total_marks,
            sets_per_student: SETS_PER_STUDENT,
            student_count: students.len(),
            student_details: students,
        })
    }
}
