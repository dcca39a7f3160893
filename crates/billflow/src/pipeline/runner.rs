//! Whole-job execution around the per-page processor.

use std::sync::Arc;

use crate::config::ReasoningConfig;
use crate::db::{job_repo, Database};
use crate::pages;
use crate::reasoning::ReasoningClient;
use crate::sanitize;
use crate::storage::StorageGateway;

use super::{PageProcessor, PipelineError};

/// Longest failure reason persisted on a job row.
const MAX_ERROR_LEN: usize = 500;

pub struct JobPipeline {
    db: Database,
    storage: Arc<dyn StorageGateway>,
    processor: PageProcessor,
}

impl JobPipeline {
    pub fn new(
        db: Database,
        storage: Arc<dyn StorageGateway>,
        reasoning: Arc<dyn ReasoningClient>,
        config: ReasoningConfig,
    ) -> Self {
        let processor = PageProcessor::new(db.clone(), storage.clone(), reasoning, config);
        Self {
            db,
            storage,
            processor,
        }
    }

    /// Claims and runs one queued job to a terminal status.
    ///
    /// A failed claim (another worker won, or the job is terminal) returns
    /// the transition error untouched; the job's state is not disturbed.
    /// After a successful claim every other failure marks the job `error`
    /// with a clipped reason before propagating.
    pub fn process_job(&self, job_id: &str) -> Result<(), PipelineError> {
        let _span = tracing::info_span!("pipeline.job", job_id).entered();

        let now = chrono::Utc::now().to_rfc3339();
        let job = job_repo::claim(&self.db, job_id, &now)?;
        tracing::info!(file_name = %job.file_name, "claimed job");

        match self.run(&job) {
            Ok(note) => {
                let now = chrono::Utc::now().to_rfc3339();
                job_repo::complete(&self.db, job_id, &now, note.as_deref())?;
                tracing::info!(contained = note.is_some(), "job processed");
                Ok(())
            }
            Err(e) => {
                let reason = sanitize::clip_message(&e.to_string(), MAX_ERROR_LEN);
                let now = chrono::Utc::now().to_rfc3339();
                if let Err(mark) = job_repo::fail(&self.db, job_id, &reason, &now) {
                    tracing::error!(error = %mark, "failed to mark job as errored");
                }
                tracing::error!(error = %e, "job failed");
                Err(e)
            }
        }
    }

    /// Fetches, splits, and processes every page. Returns the joined notes
    /// of contained per-page problems, if any.
    fn run(&self, job: &job_repo::JobRow) -> Result<Option<String>, PipelineError> {
        let storage_uri = job
            .storage_uri
            .as_deref()
            .ok_or_else(|| PipelineError::MissingStorageUri {
                id: job.id.clone(),
            })?;

        let bytes = self.storage.fetch(storage_uri)?;
        let pages = pages::split_document(&bytes, &job.file_name)?;
        tracing::info!(pages = pages.len(), "split upload into pages");

        let mut notes = Vec::new();
        for page in &pages {
            let outcome = self.processor.process_page(&job.id, &job.user_id, page)?;
            if let Some(note) = outcome.note {
                notes.push(note);
            }
        }

        Ok(if notes.is_empty() {
            None
        } else {
            Some(notes.join("; "))
        })
    }
}
