//! Contrato de engines de ejecución.
//!
//! Un engine declara qué clases de job sabe correr exponiendo runners por
//! capacidad (task, linear flow, dag flow, func flow). Cada runner tiene un
//! hook de inicialización, que corre al aplicar el template y puede devolver
//! estado propio del engine, y un hook de ejecución que recibe ese estado en
//! cada llamada. La maquinaria común de decoración vive en `job_runner`.

use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compute::flow::FlowKernel;
use crate::compute::func::{CallArgs, CallFunc, JobOutput};
use crate::compute::job::JobView;
use crate::engine::registry::RunStateRegistry;
use crate::errors::JobResult;

/// Configuración común a todos los engines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub verbose: bool,
}

/// Qué clases de job puede correr un engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineCapabilities {
    pub task: bool,
    pub linear_flow: bool,
    pub dag_flow: bool,
    pub func_flow: bool,
}

/// Estado opaco que el hook de inicialización entrega al hook de ejecución.
pub type EngineJobState = Box<dyn Any + Send + Sync>;

pub trait Engine: Send + Sync {
    fn name(&self) -> &'static str;

    fn set_config(&self, config: EngineConfig);

    fn set_registry(&self, registry: Option<Arc<RunStateRegistry>>);

    fn registry(&self) -> Option<Arc<RunStateRegistry>>;

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities { task: self.task_runner().is_some(),
                             linear_flow: self.linear_flow_runner().is_some(),
                             dag_flow: self.dag_flow_runner().is_some(),
                             func_flow: self.func_flow_runner().is_some() }
    }

    fn task_runner(&self) -> Option<&dyn TaskRunner> {
        None
    }

    fn linear_flow_runner(&self) -> Option<&dyn LinearFlowRunner> {
        None
    }

    fn dag_flow_runner(&self) -> Option<&dyn DagFlowRunner> {
        None
    }

    fn func_flow_runner(&self) -> Option<&dyn FuncFlowRunner> {
        None
    }
}

pub trait TaskRunner: Send + Sync {
    fn init_task(&self, task: &JobView) -> JobResult<EngineJobState>;

    fn run_task(&self,
                state: &EngineJobState,
                task: &JobView,
                call_func: &CallFunc,
                call: CallArgs)
                -> JobResult<JobOutput>;
}

pub trait LinearFlowRunner: Send + Sync {
    fn init_linear_flow(&self, flow: &FlowKernel) -> JobResult<EngineJobState>;

    fn run_linear_flow(&self,
                       state: &EngineJobState,
                       flow: &Arc<FlowKernel>,
                       call: CallArgs)
                       -> JobResult<JobOutput>;
}

pub trait DagFlowRunner: Send + Sync {
    fn init_dag_flow(&self, flow: &FlowKernel) -> JobResult<EngineJobState>;

    fn run_dag_flow(&self,
                    state: &EngineJobState,
                    flow: &Arc<FlowKernel>,
                    call: CallArgs)
                    -> JobResult<JobOutput>;
}

pub trait FuncFlowRunner: Send + Sync {
    fn init_func_flow(&self, flow: &FlowKernel) -> JobResult<EngineJobState>;

    fn run_func_flow(&self,
                     state: &EngineJobState,
                     flow: &Arc<FlowKernel>,
                     call: CallArgs)
                     -> JobResult<JobOutput>;
}
