//! Maquinaria común de decoración de jobs.
//!
//! Al aplicar un template, el engine envuelve la cadena de llamada del job:
//! registra `INITIALIZED`, corre su hook de inicialización y devuelve un
//! `CallFunc` que en cada llamada marca `RUNNING`, delega en el hook de
//! ejecución y le cuelga al resultado el detector de finalización. Un valor
//! ya completo marca `FINISHED` en el acto; un future lo marca al resolverse;
//! un stream recién al agotarse. Un future que se descarta sin esperar queda
//! en `RUNNING`, que es exactamente lo que pasó.
//!
//! Acá viven también los cuerpos por defecto de linear y dag flow, y el de
//! func flow, para que cualquier engine con esas capacidades los reutilice.

use std::sync::Arc;
use std::task::Poll;

use futures::StreamExt;
use serde_json::{Map, Value};

use crate::compute::flow::{FlowKernel, FlowScope};
use crate::compute::func::{CallArgs, CallFunc, FuncBody, JobOutput};
use crate::compute::job::JobView;
use crate::compute::task::TaskTemplate;
use crate::engine::base::Engine;
use crate::engine::registry::{RunState, RunStateRegistry};
use crate::errors::{JobError, JobResult};

fn register_state(registry: &Option<Arc<RunStateRegistry>>,
                  unique_name: &str,
                  state: RunState)
                  -> JobResult<()> {
    match registry {
        Some(registry) => registry.set_job_state(unique_name, state),
        None => Ok(()),
    }
}

fn missing_capability(engine: &Arc<dyn Engine>, kind: &'static str) -> JobError {
    JobError::MissingEngineCapability { engine: engine.name().to_owned(),
                                        kind }
}

/// Marca `FINISHED` según la forma del resultado: valores al acto, futures al
/// resolver, streams al agotarse.
fn detect_finalization(registry: Option<Arc<RunStateRegistry>>,
                       unique_name: String,
                       out: JobOutput)
                       -> JobResult<JobOutput> {
    match out {
        JobOutput::Value(value) => {
            register_state(&registry, &unique_name, RunState::Finished)?;
            Ok(JobOutput::Value(value))
        }
        JobOutput::Future(fut) => {
            Ok(JobOutput::Future(Box::pin(async move {
                                     let value = fut.await?;
                                     register_state(&registry, &unique_name, RunState::Finished)?;
                                     Ok(value)
                                 })))
        }
        JobOutput::Stream(stream) => {
            // el tail se pollea una sola vez, cuando el stream de adelante
            // terminó; un stream abandonado a mitad queda en RUNNING
            let mut pending = Some((registry, unique_name));
            let tail = futures::stream::poll_fn(move |_cx| {
                if let Some((registry, unique_name)) = pending.take() {
                    if let Err(err) = register_state(&registry, &unique_name, RunState::Finished) {
                        log::warn!("Could not finalize \"{unique_name}\": {err}");
                    }
                }
                Poll::Ready(None)
            });
            Ok(JobOutput::Stream(Box::pin(stream.chain(tail))))
        }
    }
}

/// Decora la cadena de una task con el runner del engine.
pub(crate) fn apply_task_decorator(engine: &Arc<dyn Engine>,
                                   view: &JobView,
                                   inner: CallFunc)
                                   -> JobResult<CallFunc> {
    let runner = engine.task_runner()
                       .ok_or_else(|| missing_capability(engine, "task"))?;
    register_state(&engine.registry(), &view.unique_name, RunState::Initialized)?;
    let state = Arc::new(runner.init_task(view)?);

    let engine = engine.clone();
    let view = view.clone();
    Ok(Arc::new(move |call: CallArgs| {
           let registry = engine.registry();
           register_state(&registry, &view.unique_name, RunState::Running)?;
           let runner = engine.task_runner()
                              .ok_or_else(|| missing_capability(&engine, "task"))?;
           let out = runner.run_task(state.as_ref(), &view, &inner, call)?;
           detect_finalization(registry, view.unique_name.clone(), out)
       }))
}

/// Decora un linear flow; el runner suele delegar en
/// [`default_linear_flow_run`].
pub(crate) fn apply_linear_flow_decorator(engine: &Arc<dyn Engine>,
                                          kernel: &Arc<FlowKernel>)
                                          -> JobResult<CallFunc> {
    let runner = engine.linear_flow_runner()
                       .ok_or_else(|| missing_capability(engine, "linear-flow"))?;
    register_state(&engine.registry(), &kernel.view.unique_name, RunState::Initialized)?;
    let state = Arc::new(runner.init_linear_flow(kernel)?);

    let engine = engine.clone();
    let kernel = kernel.clone();
    Ok(Arc::new(move |call: CallArgs| {
           let registry = engine.registry();
           register_state(&registry, &kernel.view.unique_name, RunState::Running)?;
           let runner = engine.linear_flow_runner()
                              .ok_or_else(|| missing_capability(&engine, "linear-flow"))?;
           let out = runner.run_linear_flow(state.as_ref(), &kernel, call)?;
           detect_finalization(registry, kernel.view.unique_name.clone(), out)
       }))
}

pub(crate) fn apply_dag_flow_decorator(engine: &Arc<dyn Engine>,
                                       kernel: &Arc<FlowKernel>)
                                       -> JobResult<CallFunc> {
    let runner = engine.dag_flow_runner()
                       .ok_or_else(|| missing_capability(engine, "dag-flow"))?;
    register_state(&engine.registry(), &kernel.view.unique_name, RunState::Initialized)?;
    let state = Arc::new(runner.init_dag_flow(kernel)?);

    let engine = engine.clone();
    let kernel = kernel.clone();
    Ok(Arc::new(move |call: CallArgs| {
           let registry = engine.registry();
           register_state(&registry, &kernel.view.unique_name, RunState::Running)?;
           let runner = engine.dag_flow_runner()
                              .ok_or_else(|| missing_capability(&engine, "dag-flow"))?;
           let out = runner.run_dag_flow(state.as_ref(), &kernel, call)?;
           detect_finalization(registry, kernel.view.unique_name.clone(), out)
       }))
}

pub(crate) fn apply_func_flow_decorator(engine: &Arc<dyn Engine>,
                                        kernel: &Arc<FlowKernel>)
                                        -> JobResult<CallFunc> {
    let runner = engine.func_flow_runner()
                       .ok_or_else(|| missing_capability(engine, "func-flow"))?;
    register_state(&engine.registry(), &kernel.view.unique_name, RunState::Initialized)?;
    let state = Arc::new(runner.init_func_flow(kernel)?);

    let engine = engine.clone();
    let kernel = kernel.clone();
    Ok(Arc::new(move |call: CallArgs| {
           let registry = engine.registry();
           register_state(&registry, &kernel.view.unique_name, RunState::Running)?;
           let runner = engine.func_flow_runner()
                              .ok_or_else(|| missing_capability(&engine, "func-flow"))?;
           let out = runner.run_func_flow(state.as_ref(), &kernel, call)?;
           detect_finalization(registry, kernel.view.unique_name.clone(), out)
       }))
}

fn expect_subtask_value(template: &TaskTemplate, out: JobOutput) -> JobResult<Value> {
    match out {
        JobOutput::Value(value) => Ok(value),
        JobOutput::Future(_) | JobOutput::Stream(_) => {
            Err(JobError::UnsupportedAsyncTask(template.name().to_owned()))
        }
    }
}

/// Cuerpo por defecto de un linear flow: la primera task recibe los
/// argumentos del flow, cada una de las siguientes recibe el resultado
/// anterior como único posicional.
pub fn default_linear_flow_run(kernel: &Arc<FlowKernel>, call: CallArgs) -> JobResult<JobOutput> {
    if kernel.view.has_coroutine_func {
        let kernel = kernel.clone();
        return Ok(JobOutput::Future(Box::pin(async move {
            let _ctx = kernel.creator.nested_context();
            let mut result = Value::Null;
            for (i, template) in kernel.task_templates.iter().enumerate() {
                let task_call = if i == 0 {
                    call.clone()
                } else {
                    CallArgs::positional(vec![result])
                };
                let out = template.call(&kernel.creator, task_call)?;
                result = out.resolve().await?;
            }
            Ok(result)
        })));
    }

    let _ctx = kernel.creator.nested_context();
    let mut result = Value::Null;
    for (i, template) in kernel.task_templates.iter().enumerate() {
        let task_call = if i == 0 {
            call.clone()
        } else {
            CallArgs::positional(vec![result])
        };
        let out = template.call(&kernel.creator, task_call)?;
        result = expect_subtask_value(template, out)?;
    }
    Ok(JobOutput::Value(result))
}

/// Nombres externos que una task quiere del pozo de resultados: su firma, con
/// los nombres mapeados reemplazados por el nombre externo y los parámetros
/// fijados excluidos.
fn wanted_result_keys(template: &TaskTemplate) -> Vec<String> {
    let mut wanted: Vec<String> = template.param_names().to_vec();
    for (internal, external) in template.param_key_map() {
        if let Some(pos) = wanted.iter().position(|p| p == internal) {
            wanted.remove(pos);
            wanted.push(external.clone());
        }
    }
    for fixed_key in template.fixed_params().keys() {
        if let Some(pos) = wanted.iter().position(|p| p == fixed_key) {
            wanted.remove(pos);
        }
    }
    wanted
}

fn select_results(results: &Map<String, Value>, wanted: &[String]) -> Map<String, Value> {
    results.iter()
           .filter(|(key, _)| wanted.iter().any(|w| w == *key))
           .map(|(key, value)| (key.clone(), value.clone()))
           .collect()
}

fn merge_into_results(results: &mut Map<String, Value>, template: &TaskTemplate, value: &Value) {
    match value {
        Value::Object(map) => results.extend(map.clone()),
        Value::Null => {}
        other => {
            results.insert(template.name().to_owned(), other.clone());
        }
    }
}

/// Cuerpo por defecto de un dag flow: un pozo de resultados arranca con los
/// argumentos del flow ligados por nombre; cada task toma del pozo lo que su
/// firma pide y vuelca su resultado (los objetos se funden clave a clave, el
/// resto se guarda bajo el nombre de la task). Devuelve el último resultado.
pub fn default_dag_flow_run(kernel: &Arc<FlowKernel>, call: CallArgs) -> JobResult<JobOutput> {
    if kernel.view.has_coroutine_func {
        let kernel = kernel.clone();
        return Ok(JobOutput::Future(Box::pin(async move {
            let _ctx = kernel.creator.nested_context();
            let mut results = kernel.func.signature().bind(&kernel.view.name, &call)?;
            let mut result = Value::Null;
            for template in &kernel.task_templates {
                let kwargs = select_results(&results, &wanted_result_keys(template));
                let out = template.call(&kernel.creator, CallArgs::keyword(kwargs))?;
                result = out.resolve().await?;
                merge_into_results(&mut results, template, &result);
            }
            Ok(result)
        })));
    }

    let _ctx = kernel.creator.nested_context();
    let mut results = kernel.func.signature().bind(&kernel.view.name, &call)?;
    let mut result = Value::Null;
    for template in &kernel.task_templates {
        let kwargs = select_results(&results, &wanted_result_keys(template));
        let out = template.call(&kernel.creator, CallArgs::keyword(kwargs))?;
        result = expect_subtask_value(template, out)?;
        merge_into_results(&mut results, template, &result);
    }
    Ok(JobOutput::Value(result))
}

/// Cuerpo por defecto de un func flow: liga los argumentos a la firma del
/// flow y ejecuta la función con un `FlowScope`, dentro del contexto anidado.
pub fn default_func_flow_run(kernel: &Arc<FlowKernel>, call: CallArgs) -> JobResult<JobOutput> {
    let kwargs = kernel.func.signature().bind(&kernel.view.name, &call)?;
    let scope = FlowScope::new(kernel.creator.clone());

    match kernel.func.body() {
        FuncBody::Async(_) | FuncBody::ScopedAsync(_) => {
            let out = kernel.func.invoke(Some(scope), kwargs)?;
            match out {
                // el guard entra recién cuando el future se pollea, que es
                // cuando el cuerpo del flow efectivamente corre
                JobOutput::Future(fut) => {
                    let creator = kernel.creator.clone();
                    Ok(JobOutput::Future(Box::pin(async move {
                           let _ctx = creator.nested_context();
                           fut.await
                       })))
                }
                other => Ok(other),
            }
        }
        _ => {
            let _ctx = kernel.creator.nested_context();
            kernel.func.invoke(Some(scope), kwargs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde_json::json;

    #[test]
    fn finalization_for_values_is_immediate() {
        let registry = Arc::new(RunStateRegistry::new());
        registry.set_job_state("task-j-11112222", RunState::Initialized)
                .unwrap();
        registry.set_job_state("task-j-11112222", RunState::Running)
                .unwrap();

        let out = detect_finalization(Some(registry.clone()),
                                      "task-j-11112222".to_owned(),
                                      JobOutput::Value(json!(1))).unwrap();
        assert!(out.is_value());
        assert_eq!(registry.get_job_state("task-j-11112222").unwrap(),
                   RunState::Finished);
    }

    #[test]
    fn finalization_for_futures_waits_for_resolution() {
        let registry = Arc::new(RunStateRegistry::new());
        registry.set_job_state("task-k-33334444", RunState::Initialized)
                .unwrap();
        registry.set_job_state("task-k-33334444", RunState::Running)
                .unwrap();

        let out = detect_finalization(Some(registry.clone()),
                                      "task-k-33334444".to_owned(),
                                      JobOutput::Future(Box::pin(async { Ok(json!(2)) }))).unwrap();

        // todavía no se esperó: sigue RUNNING
        assert_eq!(registry.get_job_state("task-k-33334444").unwrap(),
                   RunState::Running);

        let value = tokio_test::block_on(out.resolve()).unwrap();
        assert_eq!(value, json!(2));
        assert_eq!(registry.get_job_state("task-k-33334444").unwrap(),
                   RunState::Finished);
    }

    #[test]
    fn finalization_for_streams_fires_on_exhaustion() {
        let registry = Arc::new(RunStateRegistry::new());
        registry.set_job_state("task-l-55556666", RunState::Initialized)
                .unwrap();
        registry.set_job_state("task-l-55556666", RunState::Running)
                .unwrap();

        let items = stream::iter(vec![Ok(json!(1)), Ok(json!(2))]);
        let out = detect_finalization(Some(registry.clone()),
                                      "task-l-55556666".to_owned(),
                                      JobOutput::Stream(Box::pin(items))).unwrap();

        let JobOutput::Stream(mut stream) = out else {
            panic!("expected stream output");
        };
        tokio_test::block_on(async {
            assert_eq!(stream.next().await.unwrap().unwrap(), json!(1));
            assert_eq!(registry.get_job_state("task-l-55556666").unwrap(),
                       RunState::Running);
            assert_eq!(stream.next().await.unwrap().unwrap(), json!(2));
            assert!(stream.next().await.is_none());
        });
        assert_eq!(registry.get_job_state("task-l-55556666").unwrap(),
                   RunState::Finished);
    }

    #[test]
    fn failed_futures_leave_the_job_running() {
        let registry = Arc::new(RunStateRegistry::new());
        registry.set_job_state("task-m-9999aaaa", RunState::Initialized)
                .unwrap();
        registry.set_job_state("task-m-9999aaaa", RunState::Running)
                .unwrap();

        let out = detect_finalization(
            Some(registry.clone()),
            "task-m-9999aaaa".to_owned(),
            JobOutput::Future(Box::pin(async {
                                  Err(JobError::func_failed("task-m-9999aaaa", "boom"))
                              })),
        ).unwrap();

        assert!(tokio_test::block_on(out.resolve()).is_err());
        assert_eq!(registry.get_job_state("task-m-9999aaaa").unwrap(),
                   RunState::Running);
    }
}
