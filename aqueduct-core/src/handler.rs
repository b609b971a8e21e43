//! Handler model shared by endpoints and filters.
//!
//! A handler is either a direct callable or a deferred binding: a name to be
//! resolved inside a named evaluation environment the first time it is
//! needed, then cached. Environments give deferred handlers lexical access
//! to a set of value bindings supplied at load time.
//!
//! # Key Components
//!
//! - [`HandlerSpec`]: a callable plus the formal parameter names the
//!   argument binder consults.
//! - [`Handler`] / [`FilterHandler`]: the direct-or-deferred variants.
//! - [`Env`] / [`EnvRegistry`]: named evaluation environments.
//! - [`Outcome`]: the three-valued result of a filter stage.
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, OnceLock},
};

use serde_json::Value;

use crate::{
    http::{Request, Response},
    AnyError, AnyResult,
};

/// Bound argument set passed to an endpoint handler, keyed by the handler's
/// formal parameter names.
pub type Args = BTreeMap<String, Value>;

/// An endpoint callable. The request and response views are always in
/// scope; everything else arrives through the bound argument set.
pub type HandlerFn =
    Arc<dyn Fn(&mut Request, &mut Response, &Args) -> AnyResult<Value> + Send + Sync>;

/// A filter callable.
pub type FilterFn = Arc<dyn Fn(&mut Request, &mut Response) -> Outcome + Send + Sync>;

/// Result of one filter stage.
///
/// A filter must state its outcome explicitly; there is no implicit
/// pass-through. `Reply` short-circuits the pipeline and its value flows
/// through the remaining stages exactly as an endpoint value would, even
/// when the filter set no status.
pub enum Outcome {
    /// Hand the request to the next pipeline stage.
    Forward,
    /// Short-circuit with this value.
    Reply(Value),
    /// Divert to the error handler.
    Fail(AnyError),
}

/// A callable wrapped with the formal parameter names the argument binder
/// forwards to it. Binding never inspects the callable itself.
#[derive(Clone)]
pub struct HandlerSpec {
    params: Vec<String>,
    variadic: bool,
    func: HandlerFn,
}

impl HandlerSpec {
    pub fn new<F>(params: impl IntoIterator<Item = impl Into<String>>, func: F) -> Self
    where
        F: Fn(&mut Request, &mut Response, &Args) -> AnyResult<Value> + Send + Sync + 'static,
    {
        HandlerSpec {
            params: params.into_iter().map(Into::into).collect(),
            variadic: false,
            func: Arc::new(func),
        }
    }

    /// A handler with a variadic sink: every bound argument is forwarded.
    pub fn variadic<F>(func: F) -> Self
    where
        F: Fn(&mut Request, &mut Response, &Args) -> AnyResult<Value> + Send + Sync + 'static,
    {
        HandlerSpec {
            params: Vec::new(),
            variadic: true,
            func: Arc::new(func),
        }
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    pub fn invoke(&self, req: &mut Request, res: &mut Response, args: &Args) -> AnyResult<Value> {
        (self.func)(req, res, args)
    }
}

impl std::fmt::Debug for HandlerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSpec")
            .field("params", &self.params)
            .field("variadic", &self.variadic)
            .finish_non_exhaustive()
    }
}

/// Expression producing an endpoint callable from an environment.
pub type HandlerExpr = Arc<dyn Fn(&Env) -> AnyResult<HandlerSpec> + Send + Sync>;

/// Expression producing a filter callable from an environment.
pub type FilterExpr = Arc<dyn Fn(&Env) -> AnyResult<FilterFn> + Send + Sync>;

/// A named evaluation environment: value bindings plus handler and filter
/// expressions that close over them.
#[derive(Default)]
pub struct Env {
    values: HashMap<String, Value>,
    handlers: HashMap<String, HandlerExpr>,
    filters: HashMap<String, FilterExpr>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_value(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn bind_handler<F>(&mut self, name: impl Into<String>, expr: F)
    where
        F: Fn(&Env) -> AnyResult<HandlerSpec> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(expr));
    }

    pub fn bind_filter<F>(&mut self, name: impl Into<String>, expr: F)
    where
        F: Fn(&Env) -> AnyResult<FilterFn> + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(expr));
    }

    fn eval_handler(&self, name: &str) -> AnyResult<HandlerSpec> {
        match self.handlers.get(name) {
            Some(expr) => expr(self),
            None => bail_into!("no handler binding named `{name}`"),
        }
    }

    fn eval_filter(&self, name: &str) -> AnyResult<FilterFn> {
        match self.filters.get(name) {
            Some(expr) => expr(self),
            None => bail_into!("no filter binding named `{name}`"),
        }
    }
}

/// Mapping from environment id to environment, owned by the router.
#[derive(Default, Clone)]
pub struct EnvRegistry {
    envs: HashMap<String, Arc<Env>>,
}

impl EnvRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, env: Env) {
        self.envs.insert(name.into(), Arc::new(env));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Env>> {
        self.envs.get(name)
    }
}

/// An endpoint handler: direct, or deferred into an environment.
///
/// Deferred handlers materialize once, the first time they are needed, and
/// the resolved form is cached for the life of the endpoint.
#[derive(Clone)]
pub enum Handler {
    Direct(HandlerSpec),
    Deferred {
        env: String,
        name: String,
        cell: Arc<OnceLock<HandlerSpec>>,
    },
}

impl Handler {
    pub fn direct(spec: HandlerSpec) -> Self {
        Handler::Direct(spec)
    }

    pub fn deferred(env: impl Into<String>, name: impl Into<String>) -> Self {
        Handler::Deferred {
            env: env.into(),
            name: name.into(),
            cell: Arc::new(OnceLock::new()),
        }
    }

    pub fn resolve(&self, envs: &EnvRegistry) -> AnyResult<HandlerSpec> {
        match self {
            Handler::Direct(spec) => Ok(spec.clone()),
            Handler::Deferred { env, name, cell } => {
                if let Some(spec) = cell.get() {
                    return Ok(spec.clone());
                }
                let Some(environment) = envs.get(env) else {
                    bail_into!("no evaluation environment named `{env}`");
                };
                let spec = environment.eval_handler(name)?;
                let _ = cell.set(spec.clone());
                Ok(spec)
            }
        }
    }
}

/// A filter handler: direct, or deferred into an environment.
#[derive(Clone)]
pub enum FilterHandler {
    Direct(FilterFn),
    Deferred {
        env: String,
        name: String,
        cell: Arc<OnceLock<FilterFn>>,
    },
}

impl FilterHandler {
    pub fn direct<F>(func: F) -> Self
    where
        F: Fn(&mut Request, &mut Response) -> Outcome + Send + Sync + 'static,
    {
        FilterHandler::Direct(Arc::new(func))
    }

    pub fn deferred(env: impl Into<String>, name: impl Into<String>) -> Self {
        FilterHandler::Deferred {
            env: env.into(),
            name: name.into(),
            cell: Arc::new(OnceLock::new()),
        }
    }

    pub fn resolve(&self, envs: &EnvRegistry) -> AnyResult<FilterFn> {
        match self {
            FilterHandler::Direct(func) => Ok(func.clone()),
            FilterHandler::Deferred { env, name, cell } => {
                if let Some(func) = cell.get() {
                    return Ok(func.clone());
                }
                let Some(environment) = envs.get(env) else {
                    bail_into!("no evaluation environment named `{env}`");
                };
                let func = environment.eval_filter(name)?;
                let _ = cell.set(func.clone());
                Ok(func)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use http::Method;
    use serde_json::json;

    use super::*;

    fn constant(value: Value) -> HandlerSpec {
        HandlerSpec::new(Vec::<String>::new(), move |_req, _res, _args| {
            Ok(value.clone())
        })
    }

    #[test]
    fn test_direct_resolve() {
        let handler = Handler::direct(constant(json!(1)));
        let envs = EnvRegistry::new();
        let spec = handler.resolve(&envs).unwrap();
        let mut req = Request::new(Method::GET, "/");
        let mut res = Response::new();
        assert_eq!(spec.invoke(&mut req, &mut res, &Args::new()).unwrap(), json!(1));
    }

    #[test]
    fn test_deferred_sees_environment_values() {
        let mut env = Env::new();
        env.insert_value("greeting", json!("hello"));
        env.bind_handler("greet", |env| {
            let greeting = env.value("greeting").cloned().unwrap_or(Value::Null);
            Ok(HandlerSpec::new(Vec::<String>::new(), move |_req, _res, _args| {
                Ok(greeting.clone())
            }))
        });
        let mut envs = EnvRegistry::new();
        envs.insert("app", env);

        let handler = Handler::deferred("app", "greet");
        let spec = handler.resolve(&envs).unwrap();
        let mut req = Request::new(Method::GET, "/");
        let mut res = Response::new();
        assert_eq!(
            spec.invoke(&mut req, &mut res, &Args::new()).unwrap(),
            json!("hello")
        );
    }

    #[test]
    fn test_deferred_resolves_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static EVALS: AtomicUsize = AtomicUsize::new(0);

        let mut env = Env::new();
        env.bind_handler("counted", |_env| {
            EVALS.fetch_add(1, Ordering::SeqCst);
            Ok(HandlerSpec::new(Vec::<String>::new(), |_req, _res, _args| {
                Ok(Value::Null)
            }))
        });
        let mut envs = EnvRegistry::new();
        envs.insert("app", env);

        let handler = Handler::deferred("app", "counted");
        handler.resolve(&envs).unwrap();
        handler.resolve(&envs).unwrap();
        assert_eq!(EVALS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_environment() {
        let handler = Handler::deferred("nowhere", "f");
        let err = handler.resolve(&EnvRegistry::new()).unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn test_unknown_binding() {
        let mut envs = EnvRegistry::new();
        envs.insert("app", Env::new());
        let handler = FilterHandler::deferred("app", "missing");
        assert!(handler.resolve(&envs).is_err());
    }
}
