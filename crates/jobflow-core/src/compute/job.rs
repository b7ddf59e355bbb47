//! Núcleo compartido de templates y jobs.
//!
//! Un template es la definición inmutable (función + modificadores); aplicar
//! un template contra un creador produce un job: la misma definición atada a
//! un engine, con unique name propio y la cadena de llamada ya decorada. La
//! igualdad compara definiciones, nunca unique names, así que un job y el
//! template del que salió por `revise` describen lo mismo.
//!
//! La cadena de llamada tiene orden fijo: logging de errores por fuera,
//! después restauración/persistencia, mapeo de parámetros, envoltura del
//! resultado y la cadena decorada por el engine, que adentro lleva la
//! iteración por data files y la función cruda.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use jobflow_data::SerializerRegistry;
use serde_json::{Map, Value};

use crate::compute::creator::JobCreator;
use crate::compute::func::{CallArgs, CallFunc, JobFunc, JobOutput};
use crate::compute::mixins::{iterate, name as name_mixin, params, result_key};
use crate::compute::mixins::serialize::SerializeContext;
use crate::config::{OutputStorageProtocolOptions, PersistOutputsOptions, RestoreOutputsOptions};
use crate::engine::registry::RunState;
use crate::errors::JobResult;
use crate::merge::merge_maps;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Task,
    LinearFlow,
    DagFlow,
    FuncFlow,
}

impl JobKind {
    pub fn is_flow(self) -> bool {
        !matches!(self, JobKind::Task)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Task => "task",
            JobKind::LinearFlow => "linear-flow",
            JobKind::DagFlow => "dag-flow",
            JobKind::FuncFlow => "func-flow",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vista liviana de un job aplicado, lo que engines y logs necesitan saber.
#[derive(Debug, Clone)]
pub struct JobView {
    pub unique_name: String,
    pub name: String,
    pub kind: JobKind,
    pub has_coroutine_func: bool,
}

/// Definición de un job: la función más todos los modificadores declarativos.
/// Es lo que se compara en la igualdad y lo que `revise` devuelve al mundo
/// template.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    func: JobFunc,
    name: String,
    fixed_params: Map<String, Value>,
    param_key_map: IndexMap<String, String>,
    result_key: Option<String>,
    iterate_over_data_files: bool,
    persist_outputs: PersistOutputsOptions,
    restore_outputs: RestoreOutputsOptions,
    output_storage_protocol: OutputStorageProtocolOptions,
}

impl JobSpec {
    pub(crate) fn new(func: JobFunc) -> Self {
        Self { name: func.name().to_owned(),
               func,
               fixed_params: Map::new(),
               param_key_map: IndexMap::new(),
               result_key: None,
               iterate_over_data_files: false,
               persist_outputs: PersistOutputsOptions::default(),
               restore_outputs: RestoreOutputsOptions::default(),
               output_storage_protocol: OutputStorageProtocolOptions::default() }
    }

    pub(crate) fn validate(&self) -> JobResult<()> {
        name_mixin::check_not_empty(self.func.name(), "name", &self.name)?;
        result_key::check_result_key(&self.name, self.result_key.as_deref())?;
        params::check_param_keys_in_signature(&self.name,
                                              self.func.signature(),
                                              self.fixed_params.keys(),
                                              "fixed_params")?;
        params::check_param_keys_in_signature(&self.name,
                                              self.func.signature(),
                                              self.param_key_map.keys(),
                                              "param_key_map")?;
        iterate::check_iterate_signature(&self.name,
                                         self.iterate_over_data_files,
                                         self.func.signature())?;
        Ok(())
    }

    /// Aplica un `Refine`: en modo update los modificadores dados se funden
    /// con los vigentes (mapas clave a clave, escalares pisados); en modo
    /// replace la definición parte de cero y solo toma lo dado.
    pub(crate) fn refined(&self, refine: &Refine) -> JobResult<JobSpec> {
        let mut next = if refine.update {
            self.clone()
        } else {
            JobSpec::new(self.func.clone())
        };

        if let Some(name) = &refine.name {
            next.name = name.clone();
        }
        if let Some(fixed) = &refine.fixed_params {
            next.fixed_params = if refine.update {
                merge_maps(&next.fixed_params, fixed)
            } else {
                fixed.clone()
            };
        }
        if let Some(map) = &refine.param_key_map {
            if refine.update {
                for (internal, external) in map {
                    next.param_key_map.insert(internal.clone(), external.clone());
                }
            } else {
                next.param_key_map = map.clone();
            }
        }
        if let Some(key) = &refine.result_key {
            next.result_key = Some(key.clone());
        }
        if let Some(iterate) = refine.iterate_over_data_files {
            next.iterate_over_data_files = iterate;
        }
        if let Some(persist) = refine.persist_outputs {
            next.persist_outputs = persist;
        }
        if let Some(restore) = refine.restore_outputs {
            next.restore_outputs = restore;
        }
        if let Some(protocol) = refine.output_storage_protocol {
            next.output_storage_protocol = protocol;
        }

        next.validate()?;
        Ok(next)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn func(&self) -> &JobFunc {
        &self.func
    }

    pub fn fixed_params(&self) -> &Map<String, Value> {
        &self.fixed_params
    }

    pub fn param_key_map(&self) -> &IndexMap<String, String> {
        &self.param_key_map
    }

    pub fn result_key(&self) -> Option<&str> {
        self.result_key.as_deref()
    }

    pub fn iterate_over_data_files(&self) -> bool {
        self.iterate_over_data_files
    }

    pub fn persist_outputs(&self) -> PersistOutputsOptions {
        self.persist_outputs
    }

    pub fn restore_outputs(&self) -> RestoreOutputsOptions {
        self.restore_outputs
    }

    pub fn output_storage_protocol(&self) -> OutputStorageProtocolOptions {
        self.output_storage_protocol
    }
}

/// Ajustes declarativos para construir o refinar templates.
///
/// En modo update (el default) lo dado se funde con la definición vigente;
/// `Refine::replace()` arma la definición de cero con solo lo dado.
#[derive(Debug, Clone)]
pub struct Refine {
    update: bool,
    name: Option<String>,
    fixed_params: Option<Map<String, Value>>,
    param_key_map: Option<IndexMap<String, String>>,
    result_key: Option<String>,
    iterate_over_data_files: Option<bool>,
    persist_outputs: Option<PersistOutputsOptions>,
    restore_outputs: Option<RestoreOutputsOptions>,
    output_storage_protocol: Option<OutputStorageProtocolOptions>,
    pub(crate) task_templates: Option<Vec<crate::compute::task::TaskTemplate>>,
}

impl Default for Refine {
    fn default() -> Self {
        Self::new()
    }
}

impl Refine {
    pub fn new() -> Self {
        Self { update: true,
               name: None,
               fixed_params: None,
               param_key_map: None,
               result_key: None,
               iterate_over_data_files: None,
               persist_outputs: None,
               restore_outputs: None,
               output_storage_protocol: None,
               task_templates: None }
    }

    pub fn replace() -> Self {
        Self { update: false,
               ..Self::new() }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn fixed_params(mut self, fixed: Map<String, Value>) -> Self {
        self.fixed_params = Some(fixed);
        self
    }

    pub fn fixed_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fixed_params
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }

    pub fn param_key_map(mut self, map: IndexMap<String, String>) -> Self {
        self.param_key_map = Some(map);
        self
    }

    /// Renombra un parámetro hacia afuera: `internal` en la firma, `external`
    /// para los callers.
    pub fn map_param(mut self, internal: impl Into<String>, external: impl Into<String>) -> Self {
        self.param_key_map
            .get_or_insert_with(IndexMap::new)
            .insert(internal.into(), external.into());
        self
    }

    pub fn result_key(mut self, key: impl Into<String>) -> Self {
        self.result_key = Some(key.into());
        self
    }

    pub fn iterate_over_data_files(mut self, iterate: bool) -> Self {
        self.iterate_over_data_files = Some(iterate);
        self
    }

    pub fn persist_outputs(mut self, opt: PersistOutputsOptions) -> Self {
        self.persist_outputs = Some(opt);
        self
    }

    pub fn restore_outputs(mut self, opt: RestoreOutputsOptions) -> Self {
        self.restore_outputs = Some(opt);
        self
    }

    pub fn output_storage_protocol(mut self, opt: OutputStorageProtocolOptions) -> Self {
        self.output_storage_protocol = Some(opt);
        self
    }

    /// Reemplaza la lista de task templates de un flow.
    pub fn task_templates(mut self,
                          templates: Vec<crate::compute::task::TaskTemplate>)
                          -> Self {
        self.task_templates = Some(templates);
        self
    }
}

/// Cadena cruda de una definición: liga argumentos a la firma e invoca la
/// función, con el loop de iteración por data files si está habilitado. Es lo
/// que el decorador del engine envuelve.
pub(crate) fn build_inner_chain(spec: &JobSpec, view: &JobView) -> CallFunc {
    let func = spec.func().clone();
    let label = view.unique_name.clone();
    let raw: CallFunc = Arc::new(move |call: CallArgs| {
        let kwargs = func.signature().bind(&label, &call)?;
        func.invoke(None, kwargs)
    });

    if spec.iterate_over_data_files() {
        let first_param = spec.func().signature().param_names()[0].clone();
        iterate::decorate(view, &first_param, raw)
    } else {
        raw
    }
}

/// Estado compartido de cualquier job aplicado; los tipos concretos lo
/// envuelven en `Arc`.
pub(crate) struct JobCore {
    pub(crate) spec: JobSpec,
    pub(crate) view: JobView,
    pub(crate) creator: Arc<JobCreator>,
    pub(crate) call_func: CallFunc,
    pub(crate) serializers: Arc<SerializerRegistry>,
}

impl JobCore {
    pub(crate) fn call(&self, call: CallArgs) -> JobResult<JobOutput> {
        match self.call_inner(call) {
            Ok(out) => Ok(self.wrap_error_logging(out)),
            Err(err) => {
                log::error!("Error in job \"{}\": {}", self.view.unique_name, err);
                Err(err)
            }
        }
    }

    fn call_inner(&self, call: CallArgs) -> JobResult<JobOutput> {
        let config = self.creator.config_snapshot();
        let ctx = SerializeContext { view: self.view.clone(),
                                     persist: self.spec.persist_outputs(),
                                     restore: self.spec.restore_outputs(),
                                     protocol: self.spec.output_storage_protocol(),
                                     serializers: self.serializers.clone(),
                                     run_time: self.run_dir_time(),
                                     config };

        let spec = &self.spec;
        let view = &self.view;
        let call_func = &self.call_func;
        ctx.around(|| {
               let cooked = params::map_call(&view.unique_name,
                                             spec.fixed_params(),
                                             spec.param_key_map(),
                                             call)?;
               let out = call_func(cooked)?;
               Ok(result_key::wrap_output(spec.result_key(), out))
           })
    }

    /// Hora que fecha el directorio de persistencia: la del flow raíz en
    /// curso, o la del último arranque propio, o ahora.
    fn run_dir_time(&self) -> DateTime<Utc> {
        self.creator
            .time_of_cur_toplevel_flow_run()
            .or_else(|| self.time_of_last_run())
            .unwrap_or_else(Utc::now)
    }

    pub(crate) fn time_of_last_run(&self) -> Option<DateTime<Utc>> {
        self.creator
            .registry()
            .get_job_state_datetime(&self.view.unique_name, RunState::Running)
            .ok()
    }

    pub(crate) fn run_state(&self) -> JobResult<RunState> {
        self.creator.registry().get_job_state(&self.view.unique_name)
    }

    fn wrap_error_logging(&self, out: JobOutput) -> JobOutput {
        match out {
            JobOutput::Future(fut) => {
                let unique_name = self.view.unique_name.clone();
                JobOutput::Future(Box::pin(async move {
                                      match fut.await {
                                          Ok(value) => Ok(value),
                                          Err(err) => {
                                              log::error!("Error in job \"{unique_name}\": {err}");
                                              Err(err)
                                          }
                                      }
                                  }))
            }
            other => other,
        }
    }
}

impl fmt::Debug for JobCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobCore")
         .field("unique_name", &self.view.unique_name)
         .field("kind", &self.view.kind)
         .field("name", &self.spec.name)
         .finish()
    }
}
