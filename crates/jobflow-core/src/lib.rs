//! jobflow-core: orquestación de jobs por templates.
//!
//! Los templates (tasks y flows) son definiciones inmutables; aplicarlos
//! contra un `JobCreator` produce jobs atados a un engine, con registro de
//! estados de corrida y persistencia/restauración de resultados opcional.

pub mod compute;
pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod macros;
pub mod merge;

pub use compute::{CallArgs, CallFunc, DagFlow, DagFlowTemplate, FlowCallable, FlowKernel,
                  FlowScope, FuncFlow, FuncFlowTemplate, FuncSignature, JobCreator, JobFunc,
                  JobKind, JobOutput, LinearFlow, LinearFlowTemplate, Refine, Task, TaskTemplate};
pub use config::{ConfigOutputStorageProtocolOptions, ConfigPersistOutputsOptions,
                 ConfigRestoreOutputsOptions, EngineChoice, JobConfig,
                 OutputStorageProtocolOptions, PersistOutputsOptions, RestoreOutputsOptions};
pub use engine::{Engine, EngineCapabilities, EngineConfig, LocalRunner, RunState,
                 RunStateRegistry};
pub use errors::{JobError, JobResult};
