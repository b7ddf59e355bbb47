//! Modelo de valores neutral para funciones de job.
//!
//! Los parámetros y resultados viajan como JSON (`serde_json::Value`); los
//! argumentos posicionales se ligan por nombre contra la firma declarada
//! (`FuncSignature`). Una `JobFunc` encapsula nombre + firma + cuerpo, donde
//! el cuerpo puede ser síncrono, asíncrono (future), incremental (stream) o
//! "scoped" (recibe un `FlowScope` para orquestar templates desde adentro,
//! la forma que usan los func flows).

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::compute::flow::FlowScope;
use crate::errors::{JobError, JobResult};

pub type ValueFuture = BoxFuture<'static, JobResult<Value>>;
pub type ValueStream = BoxStream<'static, JobResult<Value>>;

/// Eslabón de la cadena de llamada de un job ya construida.
pub type CallFunc = Arc<dyn Fn(CallArgs) -> JobResult<JobOutput> + Send + Sync>;

/// Carga uniforme de una llamada: posicionales + keyword args.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl CallArgs {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn positional(args: Vec<Value>) -> Self {
        Self { args,
               kwargs: Map::new() }
    }

    pub fn keyword(kwargs: Map<String, Value>) -> Self {
        Self { args: Vec::new(),
               kwargs }
    }

    #[inline]
    pub fn with_arg(mut self, value: Value) -> Self {
        self.args.push(value);
        self
    }

    #[inline]
    pub fn with_kwarg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(name.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

/// Firma declarada de una función de job: nombres de parámetros en orden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncSignature {
    param_names: Vec<String>,
}

impl FuncSignature {
    pub fn new<I, S>(names: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        Self { param_names: names.into_iter().map(Into::into).collect() }
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.param_names.iter().any(|p| p == name)
    }

    /// Liga posicionales + kwargs a un mapa por nombre. Falla con exceso de
    /// posicionales, kwargs desconocidos o valores duplicados para un mismo
    /// parámetro. Parámetros ausentes se resuelven recién en el cuerpo (ahí
    /// viven los defaults).
    pub fn bind(&self, job: &str, call: &CallArgs) -> JobResult<Map<String, Value>> {
        if call.args.len() > self.param_names.len() {
            return Err(JobError::invalid_arguments(
                job,
                format!("takes {} parameters but {} positional arguments were given",
                        self.param_names.len(),
                        call.args.len()),
            ));
        }

        let mut bound = Map::new();
        for (name, value) in self.param_names.iter().zip(call.args.iter()) {
            bound.insert(name.clone(), value.clone());
        }

        for (key, value) in call.kwargs.iter() {
            if !self.has_param(key) {
                return Err(JobError::invalid_arguments(
                    job,
                    format!("unexpected keyword argument \"{key}\""),
                ));
            }
            if bound.contains_key(key) {
                return Err(JobError::invalid_arguments(
                    job,
                    format!("got multiple values for parameter \"{key}\""),
                ));
            }
            bound.insert(key.clone(), value.clone());
        }

        Ok(bound)
    }
}

pub type SyncFn = Arc<dyn Fn(Map<String, Value>) -> JobResult<Value> + Send + Sync>;
pub type AsyncFn = Arc<dyn Fn(Map<String, Value>) -> ValueFuture + Send + Sync>;
pub type StreamFn = Arc<dyn Fn(Map<String, Value>) -> ValueStream + Send + Sync>;
pub type ScopedSyncFn = Arc<dyn Fn(FlowScope, Map<String, Value>) -> JobResult<Value> + Send + Sync>;
pub type ScopedAsyncFn = Arc<dyn Fn(FlowScope, Map<String, Value>) -> ValueFuture + Send + Sync>;

#[derive(Clone)]
pub enum FuncBody {
    Sync(SyncFn),
    Async(AsyncFn),
    Stream(StreamFn),
    ScopedSync(ScopedSyncFn),
    ScopedAsync(ScopedAsyncFn),
}

impl FuncBody {
    fn kind_str(&self) -> &'static str {
        match self {
            FuncBody::Sync(_) => "sync",
            FuncBody::Async(_) => "async",
            FuncBody::Stream(_) => "stream",
            FuncBody::ScopedSync(_) => "scoped",
            FuncBody::ScopedAsync(_) => "scoped async",
        }
    }

    /// Identidad de función: mismo puntero de cuerpo.
    fn ptr_eq(&self, other: &FuncBody) -> bool {
        match (self, other) {
            (FuncBody::Sync(a), FuncBody::Sync(b)) => Arc::ptr_eq(a, b),
            (FuncBody::Async(a), FuncBody::Async(b)) => Arc::ptr_eq(a, b),
            (FuncBody::Stream(a), FuncBody::Stream(b)) => Arc::ptr_eq(a, b),
            (FuncBody::ScopedSync(a), FuncBody::ScopedSync(b)) => Arc::ptr_eq(a, b),
            (FuncBody::ScopedAsync(a), FuncBody::ScopedAsync(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Función envuelta por un job: nombre + firma + cuerpo.
///
/// La igualdad compara nombre, firma e identidad del cuerpo (puntero), de modo
/// que clones de la misma `JobFunc` comparan iguales y dos funciones distintas
/// nunca lo hacen.
#[derive(Clone)]
pub struct JobFunc {
    name: String,
    signature: FuncSignature,
    body: FuncBody,
}

impl JobFunc {
    pub fn new_sync<F>(name: impl Into<String>, params: &[&str], func: F) -> Self
        where F: Fn(Map<String, Value>) -> JobResult<Value> + Send + Sync + 'static
    {
        Self { name: name.into(),
               signature: FuncSignature::new(params.iter().copied()),
               body: FuncBody::Sync(Arc::new(func)) }
    }

    pub fn new_async<F>(name: impl Into<String>, params: &[&str], func: F) -> Self
        where F: Fn(Map<String, Value>) -> ValueFuture + Send + Sync + 'static
    {
        Self { name: name.into(),
               signature: FuncSignature::new(params.iter().copied()),
               body: FuncBody::Async(Arc::new(func)) }
    }

    pub fn new_stream<F>(name: impl Into<String>, params: &[&str], func: F) -> Self
        where F: Fn(Map<String, Value>) -> ValueStream + Send + Sync + 'static
    {
        Self { name: name.into(),
               signature: FuncSignature::new(params.iter().copied()),
               body: FuncBody::Stream(Arc::new(func)) }
    }

    pub fn new_scoped<F>(name: impl Into<String>, params: &[&str], func: F) -> Self
        where F: Fn(FlowScope, Map<String, Value>) -> JobResult<Value> + Send + Sync + 'static
    {
        Self { name: name.into(),
               signature: FuncSignature::new(params.iter().copied()),
               body: FuncBody::ScopedSync(Arc::new(func)) }
    }

    pub fn new_scoped_async<F>(name: impl Into<String>, params: &[&str], func: F) -> Self
        where F: Fn(FlowScope, Map<String, Value>) -> ValueFuture + Send + Sync + 'static
    {
        Self { name: name.into(),
               signature: FuncSignature::new(params.iter().copied()),
               body: FuncBody::ScopedAsync(Arc::new(func)) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &FuncSignature {
        &self.signature
    }

    pub fn body(&self) -> &FuncBody {
        &self.body
    }

    /// Si el cuerpo es asíncrono; decide la maquinaria que el engine envuelve.
    pub fn has_coroutine_func(&self) -> bool {
        matches!(self.body, FuncBody::Async(_) | FuncBody::ScopedAsync(_))
    }

    pub fn is_scoped(&self) -> bool {
        matches!(self.body, FuncBody::ScopedSync(_) | FuncBody::ScopedAsync(_))
    }

    pub(crate) fn invoke(&self,
                         scope: Option<FlowScope>,
                         kwargs: Map<String, Value>)
                         -> JobResult<JobOutput> {
        match &self.body {
            FuncBody::Sync(f) => f(kwargs).map(JobOutput::Value),
            FuncBody::Async(f) => Ok(JobOutput::Future(f(kwargs))),
            FuncBody::Stream(f) => Ok(JobOutput::Stream(f(kwargs))),
            FuncBody::ScopedSync(f) => {
                let scope = self.require_scope(scope)?;
                f(scope, kwargs).map(JobOutput::Value)
            }
            FuncBody::ScopedAsync(f) => {
                let scope = self.require_scope(scope)?;
                Ok(JobOutput::Future(f(scope, kwargs)))
            }
        }
    }

    fn require_scope(&self, scope: Option<FlowScope>) -> JobResult<FlowScope> {
        scope.ok_or_else(|| {
                 JobError::JobState(format!("flow function \"{}\" invoked outside a flow scope",
                                            self.name))
             })
    }
}

impl fmt::Debug for JobFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobFunc")
         .field("name", &self.name)
         .field("params", &self.signature.param_names)
         .field("kind", &self.body.kind_str())
         .finish()
    }
}

impl PartialEq for JobFunc {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
        && self.signature == other.signature
        && self.body.ptr_eq(&other.body)
    }
}

/// Resultado crudo de una llamada: valor ya completo, future o stream.
pub enum JobOutput {
    Value(Value),
    Future(ValueFuture),
    Stream(ValueStream),
}

impl JobOutput {
    pub fn is_value(&self) -> bool {
        matches!(self, JobOutput::Value(_))
    }

    pub fn is_future(&self) -> bool {
        matches!(self, JobOutput::Future(_))
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, JobOutput::Stream(_))
    }

    /// Exige un valor ya completo; futures/streams son un error en contextos
    /// síncronos (nunca se entra a un runtime a escondidas).
    pub fn expect_value(self, job: &str) -> JobResult<Value> {
        match self {
            JobOutput::Value(value) => Ok(value),
            JobOutput::Future(_) | JobOutput::Stream(_) => {
                Err(JobError::UnsupportedAsyncTask(job.to_owned()))
            }
        }
    }

    /// Resuelve a un valor final: un future se espera, un stream se agota y
    /// sus items quedan en un arreglo JSON.
    pub async fn resolve(self) -> JobResult<Value> {
        match self {
            JobOutput::Value(value) => Ok(value),
            JobOutput::Future(fut) => fut.await,
            JobOutput::Stream(stream) => {
                let items: Vec<JobResult<Value>> = stream.collect().await;
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(item?);
                }
                Ok(Value::Array(values))
            }
        }
    }
}

impl fmt::Debug for JobOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutput::Value(value) => f.debug_tuple("Value").field(value).finish(),
            JobOutput::Future(_) => f.write_str("Future(..)"),
            JobOutput::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Extrae y deserializa un parámetro obligatorio del mapa ya ligado.
pub fn extract_param<T: DeserializeOwned>(job: &str,
                                          kwargs: &mut Map<String, Value>,
                                          name: &str)
                                          -> JobResult<T> {
    let value = kwargs.remove(name).ok_or_else(|| {
                    JobError::invalid_arguments(job, format!("missing parameter \"{name}\""))
                })?;
    serde_json::from_value(value)
        .map_err(|e| JobError::invalid_arguments(job, format!("parameter \"{name}\": {e}")))
}

/// Variante opcional: `None` cuando el parámetro no vino (el default lo pone
/// el cuerpo de la función).
pub fn extract_param_opt<T: DeserializeOwned>(job: &str,
                                              kwargs: &mut Map<String, Value>,
                                              name: &str)
                                              -> JobResult<Option<T>> {
    match kwargs.remove(name) {
        None => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| JobError::invalid_arguments(job, format!("parameter \"{name}\": {e}"))),
    }
}
