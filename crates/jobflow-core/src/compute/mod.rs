//! Capa de cómputo: funciones de job, templates, jobs aplicados y el creador
//! que los ata a un engine.

pub mod creator;
pub mod flow;
pub mod func;
pub mod job;
pub(crate) mod mixins;
pub mod task;

pub use creator::{JobCreator, NestedContext};
pub use flow::{DagFlow, DagFlowTemplate, FlowCallable, FlowKernel, FlowScope, FuncFlow,
               FuncFlowTemplate, LinearFlow, LinearFlowTemplate};
pub use func::{extract_param, extract_param_opt, CallArgs, CallFunc, FuncBody, FuncSignature,
               JobFunc, JobOutput, ValueFuture, ValueStream};
pub use job::{JobKind, JobSpec, JobView, Refine};
pub use task::{Task, TaskTemplate};
