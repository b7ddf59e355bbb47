//! Engines de ejecución: contrato, maquinaria de decoración, registro de
//! estados y el engine local por defecto.

pub mod base;
pub mod job_runner;
pub mod local;
pub mod registry;

pub use base::{DagFlowRunner, Engine, EngineCapabilities, EngineConfig, EngineJobState,
               FuncFlowRunner, LinearFlowRunner, TaskRunner};
pub use local::LocalRunner;
pub use registry::{RunState, RunStateRegistry};
