//! Errores del dominio de jobs.
//!
//! Todas las operaciones públicas devuelven `JobResult`; los mensajes de
//! transición de estado y de argumentos llevan el unique name del job para
//! que el log cuente la historia completa sin contexto extra.

use thiserror::Error;

use crate::engine::registry::RunState;

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Error)]
pub enum JobError {
    /// El objeto job está en un estado que no admite la operación pedida.
    #[error("{0}")]
    JobState(String),

    #[error("Error in job \"{job}\": transitioning from state {from} to state {to} is not allowed")]
    InvalidStateTransition { job: String, from: RunState, to: RunState },

    #[error("Error in job \"{job}\": initial state must be INITIALIZED, not {state}")]
    InvalidInitialState { job: String, state: RunState },

    #[error("No job registered under unique name \"{0}\"")]
    UnknownJob(String),

    #[error("No datetime registered for job \"{job}\" in state {state}")]
    UnknownStateDatetime { job: String, state: RunState },

    #[error("No persisted output for job \"{0}\"")]
    NoPersistedOutput(String),

    #[error("No serializer could handle the output of job \"{0}\"")]
    SerializerNotFound(String),

    #[error("Error in job \"{job}\": {reason}")]
    InvalidArguments { job: String, reason: String },

    #[error("template \"{0}\" is not directly callable outside a flow context. Try the .run() method")]
    NotDirectlyCallable(String),

    #[error("engine \"{engine}\" does not support running {kind} jobs")]
    MissingEngineCapability { engine: String, kind: &'static str },

    #[error("job \"{0}\" returned an asynchronous result inside a synchronous flow body")]
    UnsupportedAsyncTask(String),

    /// Falla propia del cuerpo de la función; el mensaje viaja tal cual.
    #[error("{message}")]
    FuncFailed { job: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Data(#[from] jobflow_data::DataError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl JobError {
    pub fn func_failed(job: impl Into<String>, message: impl Into<String>) -> Self {
        JobError::FuncFailed { job: job.into(),
                               message: message.into() }
    }

    pub fn invalid_arguments(job: impl Into<String>, reason: impl Into<String>) -> Self {
        JobError::InvalidArguments { job: job.into(),
                                     reason: reason.into() }
    }
}
