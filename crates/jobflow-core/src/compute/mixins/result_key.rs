//! Envoltura del resultado bajo una clave fija.
//!
//! Con `result_key` presente, el valor de salida se entrega como objeto de un
//! solo item `{clave: valor}`; para futures la envoltura viaja adentro. Los
//! streams pasan de largo, item a item no hay objeto único que envolver.

use serde_json::{Map, Value};

use crate::compute::func::JobOutput;
use crate::errors::JobResult;

use super::name::check_not_empty;

pub(crate) fn check_result_key(job: &str, result_key: Option<&str>) -> JobResult<()> {
    match result_key {
        Some(key) => check_not_empty(job, "result_key", key),
        None => Ok(()),
    }
}

fn keyed(key: &str, value: Value) -> Value {
    let mut wrapped = Map::new();
    wrapped.insert(key.to_owned(), value);
    Value::Object(wrapped)
}

pub(crate) fn wrap_output(result_key: Option<&str>, out: JobOutput) -> JobOutput {
    let Some(key) = result_key else {
        return out;
    };
    match out {
        JobOutput::Value(value) => JobOutput::Value(keyed(key, value)),
        JobOutput::Future(fut) => {
            let key = key.to_owned();
            JobOutput::Future(Box::pin(async move { Ok(keyed(&key, fut.await?)) }))
        }
        JobOutput::Stream(stream) => JobOutput::Stream(stream),
    }
}
