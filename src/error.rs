use crate::identity::IdentityError;
use thiserror::Error;

/// Failure of an ingestion run. The failing batch has already been rolled back
/// when this is returned.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("stage {stage} failed")]
    Stage {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Identity resolution error: {0}")]
    Identity(#[from] IdentityError),
}

impl IngestError {
    pub fn stage(stage: &'static str) -> impl FnOnce(anyhow::Error) -> IngestError {
        move |source| IngestError::Stage { stage, source }
    }

    /// Name of the failed stage, if the failure happened while writing.
    pub fn failed_stage(&self) -> Option<&'static str> {
        match self {
            IngestError::Stage { stage, .. } => Some(stage),
            IngestError::Identity(_) => None,
        }
    }
}
