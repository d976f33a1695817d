use std::time::Duration;

use thiserror::Error;

use crate::step::StepError;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Driver pool exhausted after waiting {0:?}")]
    PoolExhausted(Duration),

    #[error("Task generation failed: {0}")]
    TaskGeneration(#[source] anyhow::Error),

    #[error("Step error: {0}")]
    Step(#[from] StepError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, HarvestError>;
