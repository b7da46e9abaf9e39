// src/error.rs
use thiserror::Error;

use crate::application::ports::output::scheduler_port::SchedulerError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Authentication required: the notification API rejected the credentials")]
    AuthenticationRequired,
}

pub type EngineResult<T> = Result<T, EngineError>;
