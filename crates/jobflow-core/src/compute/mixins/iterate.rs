//! Iteración por data files: una llamada por item del dataset de entrada.
//!
//! El primer parámetro de la función recibe cada item; el resto de los
//! argumentos se repite por llamada. La salida es un dataset con las mismas
//! claves. Con función asíncrona los items corren como tareas tokio en
//! paralelo: la salida arranca pre-poblada con marcadores de pendiente y cada
//! tarea va dejando su resultado, o un marcador de falla con el error (una
//! tarea cancelada queda como `Task was cancelled`). Una falla no voltea al
//! resto.

use std::sync::Arc;

use jobflow_data::{Dataset, FailedData, PendingData};
use serde_json::Value;

use crate::compute::func::{CallArgs, CallFunc, FuncSignature, JobOutput};
use crate::compute::job::JobView;
use crate::errors::{JobError, JobResult};

pub(crate) fn check_iterate_signature(job: &str,
                                      iterate: bool,
                                      signature: &FuncSignature)
                                      -> JobResult<()> {
    if iterate && signature.param_names().is_empty() {
        return Err(JobError::invalid_arguments(
            job,
            "iterate_over_data_files is enabled, but the job function has no first parameter to \
             receive each data file",
        ));
    }
    Ok(())
}

/// Envuelve la cadena interna con el loop por item. Se cuelga del lado de
/// adentro del decorador del engine.
pub(crate) fn decorate(view: &JobView, first_param: &str, inner: CallFunc) -> CallFunc {
    let view = view.clone();
    let first_param = first_param.to_owned();
    Arc::new(move |mut call: CallArgs| {
        let dataset_value = if call.args.is_empty() {
            call.kwargs.remove(&first_param).ok_or_else(|| {
                JobError::invalid_arguments(&view.unique_name,
                                            format!("missing parameter \"{first_param}\""))
            })?
        } else {
            call.args.remove(0)
        };
        let dataset = Dataset::from_data(&dataset_value)?;

        if view.has_coroutine_func {
            Ok(run_items_concurrently(&view, dataset, call, inner.clone()))
        } else {
            run_items_sequentially(&view, dataset, call, &inner)
        }
    })
}

fn item_call(item: Value, rest: &CallArgs) -> CallArgs {
    let mut args = Vec::with_capacity(rest.args.len() + 1);
    args.push(item);
    args.extend(rest.args.iter().cloned());
    CallArgs { args,
               kwargs: rest.kwargs.clone() }
}

fn run_items_sequentially(view: &JobView,
                          dataset: Dataset,
                          rest: CallArgs,
                          inner: &CallFunc)
                          -> JobResult<JobOutput> {
    let mut output = Dataset::new();
    for (title, item) in dataset {
        let out = inner(item_call(item, &rest))?;
        output.insert(title, out.expect_value(&view.unique_name)?);
    }
    Ok(JobOutput::Value(output.to_data()))
}

fn run_items_concurrently(view: &JobView,
                          dataset: Dataset,
                          rest: CallArgs,
                          inner: CallFunc)
                          -> JobOutput {
    let unique_name = view.unique_name.clone();
    JobOutput::Future(Box::pin(async move {
        let mut output = Dataset::new();
        for title in dataset.keys() {
            output.insert(title.clone(), PendingData::new(&unique_name).to_value());
        }

        let mut handles = Vec::with_capacity(dataset.len());
        for (title, item) in dataset {
            let call = item_call(item, &rest);
            let inner = inner.clone();
            handles.push((title, tokio::spawn(async move {
                             let out = inner(call)?;
                             out.resolve().await
                         })));
        }

        for (title, handle) in handles {
            let slot = match handle.await {
                Ok(Ok(value)) => value,
                Ok(Err(err)) => FailedData::new(&unique_name, err.to_string()).to_value(),
                Err(join_err) if join_err.is_cancelled() => {
                    FailedData::new(&unique_name, "Task was cancelled").to_value()
                }
                Err(join_err) => {
                    FailedData::new(&unique_name, format!("Task panicked: {join_err}")).to_value()
                }
            };
            output.insert(title, slot);
        }

        Ok(output.to_data())
    }))
}
