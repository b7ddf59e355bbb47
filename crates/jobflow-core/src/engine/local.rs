//! Engine local: corre los jobs en el proceso, sin backend externo.
//!
//! Soporta las cuatro clases de job. Las tasks ejecutan su cadena tal cual;
//! los flows usan los cuerpos por defecto de `job_runner`. No guarda estado
//! por job más allá del que la maquinaria común ya lleva al registro.

use std::sync::{Arc, RwLock};

use crate::compute::flow::FlowKernel;
use crate::compute::func::{CallArgs, CallFunc, JobOutput};
use crate::compute::job::JobView;
use crate::config::{lock_read, lock_write};
use crate::engine::base::{DagFlowRunner, Engine, EngineConfig, EngineJobState, FuncFlowRunner,
                          LinearFlowRunner, TaskRunner};
use crate::engine::job_runner::{default_dag_flow_run, default_func_flow_run,
                                default_linear_flow_run};
use crate::engine::registry::RunStateRegistry;
use crate::errors::JobResult;

#[derive(Default)]
pub struct LocalRunner {
    config: RwLock<EngineConfig>,
    registry: RwLock<Option<Arc<RunStateRegistry>>>,
}

impl LocalRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn verbose(&self) -> bool {
        lock_read(&self.config).verbose
    }

    fn trace(&self, phase: &str, job: &JobView) {
        if self.verbose() {
            log::debug!("local engine: {phase} {} \"{}\"", job.kind, job.unique_name);
        }
    }
}

impl Engine for LocalRunner {
    fn name(&self) -> &'static str {
        "local"
    }

    fn set_config(&self, config: EngineConfig) {
        *lock_write(&self.config) = config;
    }

    fn set_registry(&self, registry: Option<Arc<RunStateRegistry>>) {
        *lock_write(&self.registry) = registry;
    }

    fn registry(&self) -> Option<Arc<RunStateRegistry>> {
        lock_read(&self.registry).clone()
    }

    fn task_runner(&self) -> Option<&dyn TaskRunner> {
        Some(self)
    }

    fn linear_flow_runner(&self) -> Option<&dyn LinearFlowRunner> {
        Some(self)
    }

    fn dag_flow_runner(&self) -> Option<&dyn DagFlowRunner> {
        Some(self)
    }

    fn func_flow_runner(&self) -> Option<&dyn FuncFlowRunner> {
        Some(self)
    }
}

impl TaskRunner for LocalRunner {
    fn init_task(&self, task: &JobView) -> JobResult<EngineJobState> {
        self.trace("init", task);
        Ok(Box::new(()))
    }

    fn run_task(&self,
                _state: &EngineJobState,
                task: &JobView,
                call_func: &CallFunc,
                call: CallArgs)
                -> JobResult<JobOutput> {
        self.trace("run", task);
        call_func(call)
    }
}

impl LinearFlowRunner for LocalRunner {
    fn init_linear_flow(&self, flow: &FlowKernel) -> JobResult<EngineJobState> {
        self.trace("init", &flow.view);
        Ok(Box::new(()))
    }

    fn run_linear_flow(&self,
                       _state: &EngineJobState,
                       flow: &Arc<FlowKernel>,
                       call: CallArgs)
                       -> JobResult<JobOutput> {
        self.trace("run", &flow.view);
        default_linear_flow_run(flow, call)
    }
}

impl DagFlowRunner for LocalRunner {
    fn init_dag_flow(&self, flow: &FlowKernel) -> JobResult<EngineJobState> {
        self.trace("init", &flow.view);
        Ok(Box::new(()))
    }

    fn run_dag_flow(&self,
                    _state: &EngineJobState,
                    flow: &Arc<FlowKernel>,
                    call: CallArgs)
                    -> JobResult<JobOutput> {
        self.trace("run", &flow.view);
        default_dag_flow_run(flow, call)
    }
}

impl FuncFlowRunner for LocalRunner {
    fn init_func_flow(&self, flow: &FlowKernel) -> JobResult<EngineJobState> {
        self.trace("init", &flow.view);
        Ok(Box::new(()))
    }

    fn run_func_flow(&self,
                     _state: &EngineJobState,
                     flow: &Arc<FlowKernel>,
                     call: CallArgs)
                     -> JobResult<JobOutput> {
        self.trace("run", &flow.view);
        default_func_flow_run(flow, call)
    }
}
