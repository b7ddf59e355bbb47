//! Tasks: la unidad atómica de trabajo.
//!
//! `TaskTemplate` es la definición inmutable; `apply` la ata a un creador y
//! devuelve una `Task` con unique name y cadena decorada por el engine.
//! `run` es el atajo aplicar-y-llamar; la llamada directa del template solo
//! vale dentro de un contexto de flow.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jobflow_data::SerializerRegistry;
use serde_json::{Map, Value};

use crate::compute::creator::JobCreator;
use crate::compute::func::{CallArgs, JobFunc, JobOutput};
use crate::compute::job::{build_inner_chain, JobCore, JobKind, JobSpec, JobView, Refine};
use crate::compute::mixins::name as name_mixin;
use crate::engine::job_runner;
use crate::engine::registry::RunState;
use crate::errors::{JobError, JobResult};

#[derive(Debug, Clone, PartialEq)]
pub struct TaskTemplate {
    spec: JobSpec,
}

impl TaskTemplate {
    /// Crea el template para una función de job. Las funciones scoped quedan
    /// para los func flows.
    pub fn new(func: JobFunc) -> JobResult<Self> {
        if func.is_scoped() {
            return Err(JobError::JobState(format!(
                "function \"{}\" takes a flow scope and can only back a func flow",
                func.name()
            )));
        }
        let spec = JobSpec::new(func);
        spec.validate()?;
        Ok(Self { spec })
    }

    /// Crear y refinar en un paso.
    pub fn with(func: JobFunc, refine: Refine) -> JobResult<Self> {
        Self::new(func)?.refine(refine)
    }

    /// Deriva un template nuevo con los ajustes dados; el receptor queda como
    /// estaba.
    pub fn refine(&self, refine: Refine) -> JobResult<Self> {
        Ok(Self { spec: self.spec.refined(&refine)? })
    }

    pub fn apply(&self, creator: &Arc<JobCreator>) -> JobResult<Task> {
        Task::from_spec(self.spec.clone(), creator)
    }

    /// Aplicar y llamar en un paso.
    pub fn run(&self, creator: &Arc<JobCreator>, call: CallArgs) -> JobResult<JobOutput> {
        self.apply(creator)?.call(call)
    }

    /// Llamada directa del template, válida solo dentro de un contexto de
    /// flow; cada llamada aplica una instancia fresca.
    pub fn call(&self, creator: &Arc<JobCreator>, call: CallArgs) -> JobResult<JobOutput> {
        if !creator.in_flow_context() {
            return Err(JobError::NotDirectlyCallable(self.name().to_owned()));
        }
        self.run(creator, call)
    }

    /// Liga una llamada contra la firma, sin ejecutar.
    pub fn get_call_args(&self, call: &CallArgs) -> JobResult<Map<String, Value>> {
        self.spec.func().signature().bind(self.name(), call)
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    pub fn func(&self) -> &JobFunc {
        self.spec.func()
    }

    pub fn param_names(&self) -> &[String] {
        self.spec.func().signature().param_names()
    }

    pub fn fixed_params(&self) -> &Map<String, Value> {
        self.spec.fixed_params()
    }

    pub fn param_key_map(&self) -> &indexmap::IndexMap<String, String> {
        self.spec.param_key_map()
    }

    pub fn result_key(&self) -> Option<&str> {
        self.spec.result_key()
    }

    pub fn iterate_over_data_files(&self) -> bool {
        self.spec.iterate_over_data_files()
    }

    pub(crate) fn spec(&self) -> &JobSpec {
        &self.spec
    }
}

/// Task aplicada: definición + engine + unique name. Clonarla comparte el
/// mismo job.
#[derive(Debug, Clone)]
pub struct Task {
    core: Arc<JobCore>,
}

impl Task {
    pub(crate) fn from_spec(spec: JobSpec, creator: &Arc<JobCreator>) -> JobResult<Self> {
        let unique_name = name_mixin::generate_unique_name(JobKind::Task, spec.name());
        let view = JobView { unique_name,
                             name: spec.name().to_owned(),
                             kind: JobKind::Task,
                             has_coroutine_func: spec.func().has_coroutine_func() };
        let inner = build_inner_chain(&spec, &view);
        let call_func = job_runner::apply_task_decorator(&creator.engine(), &view, inner)?;

        Ok(Self { core: Arc::new(JobCore { spec,
                                           view,
                                           creator: creator.clone(),
                                           call_func,
                                           serializers:
                                               Arc::new(SerializerRegistry::with_defaults()) }) })
    }

    pub fn call(&self, call: CallArgs) -> JobResult<JobOutput> {
        self.core.call(call)
    }

    /// Vuelve al mundo template con la definición de este job.
    pub fn revise(&self) -> TaskTemplate {
        TaskTemplate { spec: self.core.spec.clone() }
    }

    /// La misma definición re-aplicada bajo un unique name nuevo.
    pub fn regenerate_unique_name(&self) -> JobResult<Task> {
        Task::from_spec(self.core.spec.clone(), &self.core.creator)
    }

    pub fn unique_name(&self) -> &str {
        &self.core.view.unique_name
    }

    pub fn name(&self) -> &str {
        self.core.spec.name()
    }

    pub fn kind(&self) -> JobKind {
        JobKind::Task
    }

    pub fn run_state(&self) -> JobResult<RunState> {
        self.core.run_state()
    }

    pub fn time_of_last_run(&self) -> Option<DateTime<Utc>> {
        self.core.time_of_last_run()
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.core.spec == other.core.spec
    }
}

impl PartialEq<TaskTemplate> for Task {
    fn eq(&self, other: &TaskTemplate) -> bool {
        self.core.spec == *other.spec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::config::{ConfigPersistOutputsOptions, JobConfig};
    use crate::{call_args, task_fn};

    fn quiet_creator() -> Arc<JobCreator> {
        let mut config = JobConfig::default();
        config.output_storage.persist_outputs = ConfigPersistOutputsOptions::Disabled;
        JobCreator::new(config)
    }

    fn double_template() -> TaskTemplate {
        TaskTemplate::new(task_fn!(fn double(number: i64) -> i64 { number * 2 })).unwrap()
    }

    #[test]
    fn apply_then_revise_round_trips_the_definition() {
        let creator = quiet_creator();
        let template = double_template();
        let job = template.apply(&creator).unwrap();

        assert_eq!(job.revise(), template);
        assert_eq!(job, template);
        assert!(job.unique_name().starts_with("task-double-"));
    }

    #[test]
    fn equality_tracks_definition_not_unique_name() {
        let creator = quiet_creator();
        let template = double_template();
        let a = template.apply(&creator).unwrap();
        let b = template.apply(&creator).unwrap();

        assert_ne!(a.unique_name(), b.unique_name());
        assert_eq!(a, b);

        let renamed = template.refine(Refine::new().name("dup")).unwrap();
        assert_ne!(renamed, template);
        assert_eq!(renamed.apply(&creator).unwrap().revise(), renamed);
    }

    #[test]
    fn run_goes_through_the_whole_chain_and_registry() {
        let creator = quiet_creator();
        let job = double_template().apply(&creator).unwrap();
        assert_eq!(job.run_state().unwrap(), RunState::Initialized);

        let out = job.call(call_args!(number = 21)).unwrap();
        assert_eq!(out.expect_value("double").unwrap(), json!(42));
        assert_eq!(job.run_state().unwrap(), RunState::Finished);
        assert!(job.time_of_last_run().is_some());
    }

    #[test]
    fn direct_template_call_outside_a_flow_suggests_run() {
        let creator = quiet_creator();
        let err = double_template().call(&creator, call_args!(number = 1)).unwrap_err();
        assert!(err.to_string().contains("Try the .run() method"));

        let out = double_template().run(&creator, call_args!(number = 4)).unwrap();
        assert_eq!(out.expect_value("double").unwrap(), json!(8));
    }

    #[test]
    fn fixed_params_and_key_map_shape_the_call() {
        let creator = quiet_creator();
        let template = TaskTemplate::new(
            task_fn!(fn scale(number: i64, factor: i64) -> i64 { number * factor })
        ).unwrap()
         .refine(Refine::new().fixed_param("factor", json!(10)).map_param("number", "n"))
         .unwrap();

        let out = template.run(&creator, call_args!(n = 3)).unwrap();
        assert_eq!(out.expect_value("scale").unwrap(), json!(30));

        // el nombre interno renombrado ya no es aceptado
        let err = template.run(&creator, call_args!(number = 3)).unwrap_err();
        assert!(err.to_string().contains("parameter key map inversely"));

        // fijar y pasar el mismo parámetro es un error de argumentos
        let err = template.run(&creator, call_args!(n = 3, factor = 2)).unwrap_err();
        assert!(err.to_string().contains("got multiple values"));
    }

    #[test]
    fn result_key_wraps_the_task_output() {
        let creator = quiet_creator();
        let template = double_template().refine(Refine::new().result_key("doubled")).unwrap();
        let out = template.run(&creator, call_args!(number = 5)).unwrap();
        assert_eq!(out.expect_value("double").unwrap(), json!({ "doubled": 10 }));
    }

    #[test]
    fn scoped_functions_cannot_back_a_task() {
        let scoped = crate::flow_fn!(fn pipeline(scope, x: i64) -> i64 {
            let _ = &scope;
            x
        });
        assert!(TaskTemplate::new(scoped).is_err());
    }

    #[test]
    fn regenerate_unique_name_keeps_the_definition() {
        let creator = quiet_creator();
        let job = double_template().apply(&creator).unwrap();
        let renewed = job.regenerate_unique_name().unwrap();
        assert_eq!(job, renewed);
        assert_ne!(job.unique_name(), renewed.unique_name());
    }
}
