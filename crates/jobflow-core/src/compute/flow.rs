//! Flows: jobs que orquestan otros jobs.
//!
//! Tres estrategias de ejecución. Un linear flow encadena sus tasks como
//! tubería: la primera recibe los argumentos del flow, cada siguiente el
//! resultado anterior. Un dag flow rutea por nombre desde un pozo de
//! resultados. Un func flow corre una función arbitraria que recibe un
//! `FlowScope` para disparar templates desde adentro.
//!
//! Los templates de flow son definiciones inmutables igual que las tasks;
//! aplicar produce el job junto con su `FlowKernel`, la porción que los
//! cuerpos del engine retienen en vez del job entero.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jobflow_data::SerializerRegistry;
use serde_json::{Map, Value};

use crate::compute::creator::JobCreator;
use crate::compute::func::{CallArgs, CallFunc, JobFunc, JobOutput};
use crate::compute::job::{JobCore, JobKind, JobSpec, JobView, Refine};
use crate::compute::mixins::name as name_mixin;
use crate::compute::task::TaskTemplate;
use crate::engine::base::Engine;
use crate::engine::job_runner;
use crate::engine::registry::RunState;
use crate::errors::{JobError, JobResult};

/// Lo que un cuerpo de flow necesita del job aplicado: vista, creador,
/// subtasks y la función del flow. Vive en un `Arc` propio para que las
/// closures decoradas no retengan al job completo.
pub struct FlowKernel {
    pub view: JobView,
    pub creator: Arc<JobCreator>,
    pub task_templates: Vec<TaskTemplate>,
    pub func: JobFunc,
}

impl fmt::Debug for FlowKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowKernel")
         .field("unique_name", &self.view.unique_name)
         .field("kind", &self.view.kind)
         .field("task_templates", &self.task_templates.len())
         .finish()
    }
}

/// Manija que reciben los cuerpos de func flow: corre templates dentro del
/// contexto del flow en curso.
#[derive(Clone)]
pub struct FlowScope {
    creator: Arc<JobCreator>,
}

impl FlowScope {
    pub(crate) fn new(creator: Arc<JobCreator>) -> Self {
        Self { creator }
    }

    pub fn creator(&self) -> &Arc<JobCreator> {
        &self.creator
    }

    /// Corre un template y exige resultado ya completo; futures y streams en
    /// un cuerpo síncrono son un error.
    pub fn call(&self, callable: &impl FlowCallable, call: CallArgs) -> JobResult<Value> {
        let out = callable.call_in_flow(&self.creator, call)?;
        match out {
            JobOutput::Value(value) => Ok(value),
            JobOutput::Future(_) | JobOutput::Stream(_) => {
                Err(JobError::UnsupportedAsyncTask(callable.label().to_owned()))
            }
        }
    }

    /// Variante asíncrona: espera futures y agota streams.
    pub async fn call_async(&self,
                            callable: &impl FlowCallable,
                            call: CallArgs)
                            -> JobResult<Value> {
        callable.call_in_flow(&self.creator, call)?.resolve().await
    }
}

/// Templates que un cuerpo de flow puede disparar: tasks y flows por igual.
pub trait FlowCallable {
    fn label(&self) -> &str;

    fn call_in_flow(&self, creator: &Arc<JobCreator>, call: CallArgs) -> JobResult<JobOutput>;
}

impl FlowCallable for TaskTemplate {
    fn label(&self) -> &str {
        self.name()
    }

    fn call_in_flow(&self, creator: &Arc<JobCreator>, call: CallArgs) -> JobResult<JobOutput> {
        self.call(creator, call)
    }
}

type FlowDecorator = fn(&Arc<dyn Engine>, &Arc<FlowKernel>) -> JobResult<CallFunc>;

fn reject_scoped_func(func: &JobFunc, kind: JobKind) -> JobResult<()> {
    if func.is_scoped() {
        return Err(JobError::JobState(format!(
            "function \"{}\" takes a flow scope and can only back a func flow, not a {kind}",
            func.name()
        )));
    }
    Ok(())
}

fn check_flow_spec(spec: &JobSpec) -> JobResult<()> {
    spec.validate()?;
    if spec.iterate_over_data_files() {
        return Err(JobError::JobState(format!("flow \"{}\" cannot iterate over data files",
                                              spec.name())));
    }
    Ok(())
}

fn build_flow_job(spec: JobSpec,
                  kind: JobKind,
                  task_templates: Vec<TaskTemplate>,
                  creator: &Arc<JobCreator>,
                  decorate: FlowDecorator)
                  -> JobResult<(Arc<JobCore>, Arc<FlowKernel>)> {
    let unique_name = name_mixin::generate_unique_name(kind, spec.name());
    let view = JobView { unique_name,
                         name: spec.name().to_owned(),
                         kind,
                         has_coroutine_func: spec.func().has_coroutine_func() };
    let kernel = Arc::new(FlowKernel { view: view.clone(),
                                       creator: creator.clone(),
                                       task_templates,
                                       func: spec.func().clone() });
    let call_func = decorate(&creator.engine(), &kernel)?;
    let core = Arc::new(JobCore { spec,
                                  view,
                                  creator: creator.clone(),
                                  call_func,
                                  serializers: Arc::new(SerializerRegistry::with_defaults()) });
    Ok((core, kernel))
}

macro_rules! impl_applied_flow {
    ($job:ident) => {
        impl $job {
            pub fn call(&self, call: CallArgs) -> JobResult<JobOutput> {
                self.core.call(call)
            }

            pub fn unique_name(&self) -> &str {
                &self.core.view.unique_name
            }

            pub fn name(&self) -> &str {
                self.core.spec.name()
            }

            pub fn kind(&self) -> JobKind {
                self.core.view.kind
            }

            pub fn run_state(&self) -> JobResult<RunState> {
                self.core.run_state()
            }

            pub fn time_of_last_run(&self) -> Option<DateTime<Utc>> {
                self.core.time_of_last_run()
            }
        }

        impl PartialEq for $job {
            fn eq(&self, other: &Self) -> bool {
                self.core.spec == other.core.spec
                && self.kernel.task_templates == other.kernel.task_templates
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Linear flow
// ---------------------------------------------------------------------------

/// Template de linear flow: una firma propia más la tubería de tasks, en
/// orden de ejecución. El cuerpo de la función del flow nunca se invoca.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearFlowTemplate {
    spec: JobSpec,
    task_templates: Vec<TaskTemplate>,
}

impl LinearFlowTemplate {
    pub fn new(func: JobFunc, task_templates: Vec<TaskTemplate>) -> JobResult<Self> {
        reject_scoped_func(&func, JobKind::LinearFlow)?;
        let spec = JobSpec::new(func);
        check_flow_spec(&spec)?;
        Ok(Self { spec,
                  task_templates })
    }

    pub fn with(func: JobFunc,
                task_templates: Vec<TaskTemplate>,
                refine: Refine)
                -> JobResult<Self> {
        Self::new(func, task_templates)?.refine(refine)
    }

    /// Deriva un template nuevo; una lista de task templates en el `Refine`
    /// reemplaza la tubería entera, ausente se conserva la vigente.
    pub fn refine(&self, refine: Refine) -> JobResult<Self> {
        let task_templates = match &refine.task_templates {
            Some(templates) => templates.clone(),
            None => self.task_templates.clone(),
        };
        let spec = self.spec.refined(&refine)?;
        check_flow_spec(&spec)?;
        Ok(Self { spec,
                  task_templates })
    }

    pub fn apply(&self, creator: &Arc<JobCreator>) -> JobResult<LinearFlow> {
        LinearFlow::from_parts(self.spec.clone(), self.task_templates.clone(), creator)
    }

    pub fn run(&self, creator: &Arc<JobCreator>, call: CallArgs) -> JobResult<JobOutput> {
        self.apply(creator)?.call(call)
    }

    pub fn call(&self, creator: &Arc<JobCreator>, call: CallArgs) -> JobResult<JobOutput> {
        if !creator.in_flow_context() {
            return Err(JobError::NotDirectlyCallable(self.name().to_owned()));
        }
        self.run(creator, call)
    }

    pub fn get_call_args(&self, call: &CallArgs) -> JobResult<Map<String, Value>> {
        self.spec.func().signature().bind(self.name(), call)
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    pub fn func(&self) -> &JobFunc {
        self.spec.func()
    }

    pub fn task_templates(&self) -> &[TaskTemplate] {
        &self.task_templates
    }

    pub fn fixed_params(&self) -> &Map<String, Value> {
        self.spec.fixed_params()
    }

    pub fn result_key(&self) -> Option<&str> {
        self.spec.result_key()
    }

    pub(crate) fn spec(&self) -> &JobSpec {
        &self.spec
    }
}

impl FlowCallable for LinearFlowTemplate {
    fn label(&self) -> &str {
        self.name()
    }

    fn call_in_flow(&self, creator: &Arc<JobCreator>, call: CallArgs) -> JobResult<JobOutput> {
        self.call(creator, call)
    }
}

/// Linear flow aplicado.
#[derive(Debug, Clone)]
pub struct LinearFlow {
    core: Arc<JobCore>,
    kernel: Arc<FlowKernel>,
}

impl LinearFlow {
    pub(crate) fn from_parts(spec: JobSpec,
                             task_templates: Vec<TaskTemplate>,
                             creator: &Arc<JobCreator>)
                             -> JobResult<Self> {
        let (core, kernel) = build_flow_job(spec,
                                            JobKind::LinearFlow,
                                            task_templates,
                                            creator,
                                            job_runner::apply_linear_flow_decorator)?;
        Ok(Self { core, kernel })
    }

    /// Vuelve al mundo template con la definición de este flow.
    pub fn revise(&self) -> LinearFlowTemplate {
        LinearFlowTemplate { spec: self.core.spec.clone(),
                             task_templates: self.kernel.task_templates.clone() }
    }

    /// La misma definición re-aplicada bajo un unique name nuevo.
    pub fn regenerate_unique_name(&self) -> JobResult<LinearFlow> {
        LinearFlow::from_parts(self.core.spec.clone(),
                               self.kernel.task_templates.clone(),
                               &self.core.creator)
    }

    pub fn task_templates(&self) -> &[TaskTemplate] {
        &self.kernel.task_templates
    }
}

impl_applied_flow!(LinearFlow);

impl PartialEq<LinearFlowTemplate> for LinearFlow {
    fn eq(&self, other: &LinearFlowTemplate) -> bool {
        self.core.spec == *other.spec() && self.kernel.task_templates == other.task_templates
    }
}

// ---------------------------------------------------------------------------
// Dag flow
// ---------------------------------------------------------------------------

/// Template de dag flow: las tasks toman sus argumentos por nombre de un pozo
/// de resultados que arranca con los argumentos del flow y se alimenta con
/// cada resultado. El cuerpo de la función del flow nunca se invoca.
#[derive(Debug, Clone, PartialEq)]
pub struct DagFlowTemplate {
    spec: JobSpec,
    task_templates: Vec<TaskTemplate>,
}

impl DagFlowTemplate {
    pub fn new(func: JobFunc, task_templates: Vec<TaskTemplate>) -> JobResult<Self> {
        reject_scoped_func(&func, JobKind::DagFlow)?;
        let spec = JobSpec::new(func);
        check_flow_spec(&spec)?;
        Ok(Self { spec,
                  task_templates })
    }

    pub fn with(func: JobFunc,
                task_templates: Vec<TaskTemplate>,
                refine: Refine)
                -> JobResult<Self> {
        Self::new(func, task_templates)?.refine(refine)
    }

    pub fn refine(&self, refine: Refine) -> JobResult<Self> {
        let task_templates = match &refine.task_templates {
            Some(templates) => templates.clone(),
            None => self.task_templates.clone(),
        };
        let spec = self.spec.refined(&refine)?;
        check_flow_spec(&spec)?;
        Ok(Self { spec,
                  task_templates })
    }

    pub fn apply(&self, creator: &Arc<JobCreator>) -> JobResult<DagFlow> {
        DagFlow::from_parts(self.spec.clone(), self.task_templates.clone(), creator)
    }

    pub fn run(&self, creator: &Arc<JobCreator>, call: CallArgs) -> JobResult<JobOutput> {
        self.apply(creator)?.call(call)
    }

    pub fn call(&self, creator: &Arc<JobCreator>, call: CallArgs) -> JobResult<JobOutput> {
        if !creator.in_flow_context() {
            return Err(JobError::NotDirectlyCallable(self.name().to_owned()));
        }
        self.run(creator, call)
    }

    pub fn get_call_args(&self, call: &CallArgs) -> JobResult<Map<String, Value>> {
        self.spec.func().signature().bind(self.name(), call)
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    pub fn func(&self) -> &JobFunc {
        self.spec.func()
    }

    pub fn task_templates(&self) -> &[TaskTemplate] {
        &self.task_templates
    }

    pub fn fixed_params(&self) -> &Map<String, Value> {
        self.spec.fixed_params()
    }

    pub fn result_key(&self) -> Option<&str> {
        self.spec.result_key()
    }

    pub(crate) fn spec(&self) -> &JobSpec {
        &self.spec
    }
}

impl FlowCallable for DagFlowTemplate {
    fn label(&self) -> &str {
        self.name()
    }

    fn call_in_flow(&self, creator: &Arc<JobCreator>, call: CallArgs) -> JobResult<JobOutput> {
        self.call(creator, call)
    }
}

/// Dag flow aplicado.
#[derive(Debug, Clone)]
pub struct DagFlow {
    core: Arc<JobCore>,
    kernel: Arc<FlowKernel>,
}

impl DagFlow {
    pub(crate) fn from_parts(spec: JobSpec,
                             task_templates: Vec<TaskTemplate>,
                             creator: &Arc<JobCreator>)
                             -> JobResult<Self> {
        let (core, kernel) = build_flow_job(spec,
                                            JobKind::DagFlow,
                                            task_templates,
                                            creator,
                                            job_runner::apply_dag_flow_decorator)?;
        Ok(Self { core, kernel })
    }

    pub fn revise(&self) -> DagFlowTemplate {
        DagFlowTemplate { spec: self.core.spec.clone(),
                          task_templates: self.kernel.task_templates.clone() }
    }

    pub fn regenerate_unique_name(&self) -> JobResult<DagFlow> {
        DagFlow::from_parts(self.core.spec.clone(),
                            self.kernel.task_templates.clone(),
                            &self.core.creator)
    }

    pub fn task_templates(&self) -> &[TaskTemplate] {
        &self.kernel.task_templates
    }
}

impl_applied_flow!(DagFlow);

impl PartialEq<DagFlowTemplate> for DagFlow {
    fn eq(&self, other: &DagFlowTemplate) -> bool {
        self.core.spec == *other.spec() && self.kernel.task_templates == other.task_templates
    }
}

// ---------------------------------------------------------------------------
// Func flow
// ---------------------------------------------------------------------------

/// Template de func flow: el cuerpo de la función ES el flow. Acepta
/// funciones scoped (reciben el `FlowScope`) y también funciones comunes, que
/// simplemente corren dentro del contexto del flow.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncFlowTemplate {
    spec: JobSpec,
}

impl FuncFlowTemplate {
    pub fn new(func: JobFunc) -> JobResult<Self> {
        let spec = JobSpec::new(func);
        check_flow_spec(&spec)?;
        Ok(Self { spec })
    }

    pub fn with(func: JobFunc, refine: Refine) -> JobResult<Self> {
        Self::new(func)?.refine(refine)
    }

    pub fn refine(&self, refine: Refine) -> JobResult<Self> {
        let spec = self.spec.refined(&refine)?;
        check_flow_spec(&spec)?;
        Ok(Self { spec })
    }

    pub fn apply(&self, creator: &Arc<JobCreator>) -> JobResult<FuncFlow> {
        FuncFlow::from_parts(self.spec.clone(), creator)
    }

    pub fn run(&self, creator: &Arc<JobCreator>, call: CallArgs) -> JobResult<JobOutput> {
        self.apply(creator)?.call(call)
    }

    pub fn call(&self, creator: &Arc<JobCreator>, call: CallArgs) -> JobResult<JobOutput> {
        if !creator.in_flow_context() {
            return Err(JobError::NotDirectlyCallable(self.name().to_owned()));
        }
        self.run(creator, call)
    }

    pub fn get_call_args(&self, call: &CallArgs) -> JobResult<Map<String, Value>> {
        self.spec.func().signature().bind(self.name(), call)
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    pub fn func(&self) -> &JobFunc {
        self.spec.func()
    }

    pub fn fixed_params(&self) -> &Map<String, Value> {
        self.spec.fixed_params()
    }

    pub fn result_key(&self) -> Option<&str> {
        self.spec.result_key()
    }

    pub(crate) fn spec(&self) -> &JobSpec {
        &self.spec
    }
}

impl FlowCallable for FuncFlowTemplate {
    fn label(&self) -> &str {
        self.name()
    }

    fn call_in_flow(&self, creator: &Arc<JobCreator>, call: CallArgs) -> JobResult<JobOutput> {
        self.call(creator, call)
    }
}

/// Func flow aplicado.
#[derive(Debug, Clone)]
pub struct FuncFlow {
    core: Arc<JobCore>,
    kernel: Arc<FlowKernel>,
}

impl FuncFlow {
    pub(crate) fn from_parts(spec: JobSpec, creator: &Arc<JobCreator>) -> JobResult<Self> {
        let (core, kernel) = build_flow_job(spec,
                                            JobKind::FuncFlow,
                                            Vec::new(),
                                            creator,
                                            job_runner::apply_func_flow_decorator)?;
        Ok(Self { core, kernel })
    }

    pub fn revise(&self) -> FuncFlowTemplate {
        FuncFlowTemplate { spec: self.core.spec.clone() }
    }

    pub fn regenerate_unique_name(&self) -> JobResult<FuncFlow> {
        FuncFlow::from_parts(self.core.spec.clone(), &self.core.creator)
    }
}

impl_applied_flow!(FuncFlow);

impl PartialEq<FuncFlowTemplate> for FuncFlow {
    fn eq(&self, other: &FuncFlowTemplate) -> bool {
        self.core.spec == *other.spec()
    }
}
