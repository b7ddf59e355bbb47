//! Macros de conveniencia para declarar funciones de job y armar llamadas.
//!
//! Una función de job es en el fondo una `JobFunc` (nombre + firma + cuerpo
//! JSON); estas macros dejan escribirla con aspecto de función común, con
//! parámetros tipados y defaults opcionales, sin tocar `serde_json` a mano.

/// Declara una `JobFunc` para tareas.
///
/// Uso:
/// ```ignore
/// let double = task_fn!(fn double(number: i64) -> i64 { number * 2 });
///
/// // defaults por parámetro
/// let power = task_fn!(fn power(base: i64, exp: u32 = 2) -> i64 { base.pow(exp) });
///
/// // cuerpos async; la lista entre corchetes se clona en cada llamada,
/// // para estado capturado que el bloque async se llevaría puesto
/// let fetch = task_fn!(async fn fetch[client](url: String) -> String {
///     client.get(&url).await
/// });
/// ```
///
/// El cuerpo evalúa al tipo de retorno declarado y puede usar `?` con
/// `JobError`; el valor se serializa a JSON al salir.
#[macro_export]
macro_rules! task_fn {
    (fn $name:ident ( $($p:ident : $t:ty $(= $d:expr)?),* $(,)? ) -> $ret:ty $body:block) => {
        $crate::task_fn!(fn $name [] ( $($p : $t $(= $d)?),* ) -> $ret $body)
    };
    (fn $name:ident [ $($cap:ident),* $(,)? ] ( $($p:ident : $t:ty $(= $d:expr)?),* $(,)? ) -> $ret:ty $body:block) => {{
        $(let $cap = $cap.clone();)*
        $crate::compute::func::JobFunc::new_sync(
            stringify!($name),
            &[$(stringify!($p)),*],
            move |mut __kwargs| {
                $($crate::__jf_extract!(stringify!($name), &mut __kwargs, $p : $t $(= $d)?);)*
                let __out: $ret = $body;
                ::serde_json::to_value(__out).map_err($crate::errors::JobError::from)
            },
        )
    }};
    (async fn $name:ident ( $($p:ident : $t:ty $(= $d:expr)?),* $(,)? ) -> $ret:ty $body:block) => {
        $crate::task_fn!(async fn $name [] ( $($p : $t $(= $d)?),* ) -> $ret $body)
    };
    (async fn $name:ident [ $($cap:ident),* $(,)? ] ( $($p:ident : $t:ty $(= $d:expr)?),* $(,)? ) -> $ret:ty $body:block) => {{
        $(let $cap = $cap.clone();)*
        $crate::compute::func::JobFunc::new_async(
            stringify!($name),
            &[$(stringify!($p)),*],
            move |mut __kwargs| {
                $(let $cap = $cap.clone();)*
                ::std::boxed::Box::pin(async move {
                    $($crate::__jf_extract!(stringify!($name), &mut __kwargs, $p : $t $(= $d)?);)*
                    let __out: $ret = $body;
                    ::serde_json::to_value(__out).map_err($crate::errors::JobError::from)
                })
            },
        )
    }};
}

/// Declara una `JobFunc` "scoped" para func flows: el primer parámetro es el
/// `FlowScope`, con el que el cuerpo corre templates dentro del contexto.
///
/// Uso:
/// ```ignore
/// let pipeline = flow_fn!(fn pipeline[double_t](scope, number: i64) -> i64 {
///     let doubled = scope.call(&double_t, call_args!(number))?;
///     doubled.as_i64().unwrap_or(0) + 1
/// });
///
/// let pipeline = flow_fn!(async fn pipeline[fetch_t](scope, url: String) -> Value {
///     scope.call_async(&fetch_t, call_args!(url)).await?
/// });
/// ```
#[macro_export]
macro_rules! flow_fn {
    (fn $name:ident ( $scope:ident $(, $p:ident : $t:ty $(= $d:expr)?)* $(,)? ) -> $ret:ty $body:block) => {
        $crate::flow_fn!(fn $name [] ( $scope $(, $p : $t $(= $d)?)* ) -> $ret $body)
    };
    (fn $name:ident [ $($cap:ident),* $(,)? ] ( $scope:ident $(, $p:ident : $t:ty $(= $d:expr)?)* $(,)? ) -> $ret:ty $body:block) => {{
        $(let $cap = $cap.clone();)*
        $crate::compute::func::JobFunc::new_scoped(
            stringify!($name),
            &[$(stringify!($p)),*],
            move |$scope, mut __kwargs| {
                $($crate::__jf_extract!(stringify!($name), &mut __kwargs, $p : $t $(= $d)?);)*
                let __out: $ret = $body;
                ::serde_json::to_value(__out).map_err($crate::errors::JobError::from)
            },
        )
    }};
    (async fn $name:ident ( $scope:ident $(, $p:ident : $t:ty $(= $d:expr)?)* $(,)? ) -> $ret:ty $body:block) => {
        $crate::flow_fn!(async fn $name [] ( $scope $(, $p : $t $(= $d)?)* ) -> $ret $body)
    };
    (async fn $name:ident [ $($cap:ident),* $(,)? ] ( $scope:ident $(, $p:ident : $t:ty $(= $d:expr)?)* $(,)? ) -> $ret:ty $body:block) => {{
        $(let $cap = $cap.clone();)*
        $crate::compute::func::JobFunc::new_scoped_async(
            stringify!($name),
            &[$(stringify!($p)),*],
            move |$scope, mut __kwargs| {
                $(let $cap = $cap.clone();)*
                ::std::boxed::Box::pin(async move {
                    $($crate::__jf_extract!(stringify!($name), &mut __kwargs, $p : $t $(= $d)?);)*
                    let __out: $ret = $body;
                    ::serde_json::to_value(__out).map_err($crate::errors::JobError::from)
                })
            },
        )
    }};
}

/// Arma un `CallArgs` con literales JSON.
///
/// Uso:
/// ```ignore
/// call_args!()                     // sin argumentos
/// call_args!(number = 3)           // keyword args
/// call_args!(1, 2)                 // posicionales
/// call_args!(1, 2; scale = 10)     // mixto, posicionales primero
/// ```
#[macro_export]
macro_rules! call_args {
    () => {
        $crate::compute::func::CallArgs::none()
    };
    ($($k:ident = $v:expr),+ $(,)?) => {{
        let mut __kwargs = ::serde_json::Map::new();
        $(__kwargs.insert(stringify!($k).to_owned(), ::serde_json::json!($v));)+
        $crate::compute::func::CallArgs::keyword(__kwargs)
    }};
    ($($a:expr),+ $(,)?) => {
        $crate::compute::func::CallArgs::positional(vec![$(::serde_json::json!($a)),+])
    };
    ($($a:expr),+ ; $($k:ident = $v:expr),+ $(,)?) => {{
        let mut __call = $crate::compute::func::CallArgs::positional(vec![$(::serde_json::json!($a)),+]);
        $(__call.kwargs.insert(stringify!($k).to_owned(), ::serde_json::json!($v));)+
        __call
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __jf_extract {
    ($job:expr, $kwargs:expr, $p:ident : $t:ty = $d:expr) => {
        let $p: $t = match $crate::compute::func::extract_param_opt::<$t>($job, $kwargs,
                                                                          stringify!($p))? {
            Some(v) => v,
            None => $d,
        };
    };
    ($job:expr, $kwargs:expr, $p:ident : $t:ty) => {
        let $p: $t =
            $crate::compute::func::extract_param::<$t>($job, $kwargs, stringify!($p))?;
    };
}
