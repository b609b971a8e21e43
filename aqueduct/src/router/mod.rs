//! The dispatch core and builder facade.
//!
//! A router owns an ordered filter chain, a route tree, a mount list, a
//! hook registry, and a serializer registry. Mutation happens through
//! `&mut self` builder methods; dispatch through `&self`. Sharing the
//! router (for example in an `Arc` handed to a transport) is therefore the
//! freeze point: once shared it can no longer be mutated, and concurrent
//! dispatch only reads router-owned structures.
//!
//! # Dispatch order
//!
//! Within one request the stages run strictly in order: preroute hooks,
//! the filter chain, the matched endpoint (or mount delegation, or the
//! 404/405 handlers), postroute hooks, preserialize hooks, the serializer,
//! postserialize hooks. Failures at any stage divert to the error hook and
//! error handler, whose value is serialized normally.
use std::sync::Arc;

use aqueduct_core::{
    config::RouterOptions,
    handler::{Env, EnvRegistry, Handler, HandlerSpec, Outcome},
    http::{Request, Response},
    AnyError,
};
use http::{header, HeaderValue, Method, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;

use crate::{
    endpoint::{Endpoint, EndpointDef, RESERVED_ARG_NAMES},
    filter::{Filter, RESERVED_FILTER_NAMES},
    hooks::{Hook, HookError, HookRegistry},
    pattern::{normalize, Pattern},
    serialize::SerializerRegistry,
    static_mount::StaticService,
    tree::{Lookup, RouteTree},
};

pub use aqueduct_core::config::TrailingSlash;

/// Verbs an endpoint may accept.
pub const SUPPORTED_VERBS: [Method; 7] = [
    Method::GET,
    Method::PUT,
    Method::POST,
    Method::DELETE,
    Method::HEAD,
    Method::OPTIONS,
    Method::PATCH,
];

/// Replaceable handler for requests nothing matched.
pub type PlainHandler = Arc<dyn Fn(&mut Request, &mut Response) -> Value + Send + Sync>;

/// Replaceable handler for captured pipeline failures.
pub type ErrorHandler = Arc<dyn Fn(&mut Request, &mut Response, &AnyError) -> Value + Send + Sync>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no path specified")]
    MissingPath,
    #[error("no handler specified")]
    MissingHandler,
    #[error("both a prebuilt endpoint and inline route parts were supplied")]
    ConflictingArgs,
    #[error("argument name `{0}` is reserved")]
    ForbiddenArg(String),
    #[error("endpoint requires at least one verb")]
    EmptyVerbs,
    #[error("verb `{0}` is not supported")]
    UnsupportedVerb(String),
    #[error("filter `{0}` is already registered")]
    DuplicateFilterName(String),
    #[error("filter name `{0}` is reserved")]
    ReservedFilterName(String),
    #[error("pre-empted filter `{0}` is not in the chain")]
    UnknownPreempt(String),
    #[error(transparent)]
    Pattern(#[from] crate::pattern::PatternError),
}

/// Failure captured at a pipeline stage boundary, funneled to the error
/// handler. Never leaks past [`Router::call`].
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("filter `{name}` failed: {cause}")]
    Filter { name: String, cause: AnyError },
    #[error("handler failed: {cause}")]
    Handler { cause: AnyError },
    #[error("{stage} hook failed: {cause}")]
    Hook {
        stage: &'static str,
        cause: AnyError,
    },
    #[error("static mount `{prefix}` failed: {cause}")]
    Static { prefix: String, cause: AnyError },
    #[error("serialization failed: {cause}")]
    Serialize { cause: AnyError },
    #[error("no serializer registered under `{0}`")]
    UnknownSerializer(String),
}

/// A child attached under a path prefix.
pub enum MountChild {
    Router(Router),
    Static(Arc<dyn StaticService>),
}

struct Mount {
    prefix: String,
    child: MountChild,
    seq: u64,
}

enum Target<'r> {
    Endpoint {
        endpoint: &'r Arc<Endpoint>,
        captures: Vec<(String, String)>,
    },
    Mount(&'r Mount),
    Redirect {
        location: String,
    },
    MethodNotAllowed {
        allow: Vec<Method>,
    },
    NotFound,
}

/// The routing and pipeline core.
pub struct Router {
    options: RouterOptions,
    filters: Vec<Filter>,
    hooks: HookRegistry,
    tree: RouteTree,
    mounts: Vec<Mount>,
    serializers: SerializerRegistry,
    envs: EnvRegistry,
    not_found: PlainHandler,
    method_not_allowed: PlainHandler,
    error_handler: ErrorHandler,
    next_seq: u64,
}

impl Default for Router {
    fn default() -> Self {
        Self::with_options(RouterOptions::default())
    }
}

macro_rules! verb_sugar {
    ($($(#[$meta:meta])* $name:ident => $verb:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            pub fn $name(
                &mut self,
                path: &str,
                handler: HandlerSpec,
            ) -> Result<(), BuildError> {
                self.handle(
                    EndpointDef::new()
                        .verb(Method::$verb)
                        .path(path)
                        .handler(Handler::direct(handler)),
                )
            }
        )*
    };
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: RouterOptions) -> Self {
        Router {
            options,
            filters: Vec::new(),
            hooks: HookRegistry::new(),
            tree: RouteTree::new(),
            mounts: Vec::new(),
            serializers: SerializerRegistry::new(),
            envs: EnvRegistry::new(),
            not_found: Arc::new(default_not_found),
            method_not_allowed: Arc::new(default_method_not_allowed),
            error_handler: Arc::new(default_error_handler),
            next_seq: 0,
        }
    }

    pub fn set_options(&mut self, options: RouterOptions) {
        self.options = options;
    }

    /// Registers an endpoint assembled from an [`EndpointDef`].
    pub fn handle(&mut self, def: EndpointDef) -> Result<(), BuildError> {
        let endpoint = self.build_endpoint(def)?;
        let seq = self.bump_seq();
        self.tree.insert(Arc::new(endpoint), seq);
        Ok(())
    }

    verb_sugar! {
        /// Registers a `GET` endpoint.
        get => GET,
        /// Registers a `PUT` endpoint.
        put => PUT,
        /// Registers a `POST` endpoint.
        post => POST,
        /// Registers a `DELETE` endpoint.
        delete => DELETE,
        /// Registers a `HEAD` endpoint.
        head => HEAD,
        /// Registers an `OPTIONS` endpoint.
        options => OPTIONS,
        /// Registers a `PATCH` endpoint.
        patch => PATCH,
    }

    /// Appends a filter to the chain. Names are unique per router and the
    /// pipeline stage names are reserved.
    pub fn filter<F>(&mut self, name: &str, func: F) -> Result<(), BuildError>
    where
        F: Fn(&mut Request, &mut Response) -> Outcome + Send + Sync + 'static,
    {
        self.add_filter(Filter::new(
            name,
            aqueduct_core::handler::FilterHandler::direct(func),
        ))
    }

    /// Appends a filter whose handler resolves lazily inside a named
    /// evaluation environment.
    pub fn filter_deferred(
        &mut self,
        name: &str,
        env: &str,
        binding: &str,
    ) -> Result<(), BuildError> {
        self.add_filter(Filter::new(
            name,
            aqueduct_core::handler::FilterHandler::deferred(env, binding),
        ))
    }

    /// Mounts a child router under a prefix. The prefix is normalized to
    /// end with `/`; the root prefix `/` is allowed.
    pub fn mount(&mut self, prefix: &str, child: Router) {
        self.push_mount(prefix, MountChild::Router(child));
    }

    /// Mounts a static handler under a prefix.
    pub fn mount_static(&mut self, prefix: &str, service: Arc<dyn StaticService>) {
        self.push_mount(prefix, MountChild::Static(service));
    }

    /// Removes mounts registered under the normalized prefix. Silently
    /// succeeds when absent.
    pub fn unmount(&mut self, prefix: &str) {
        let prefix = normalize_prefix(prefix);
        self.mounts.retain(|mount| mount.prefix != prefix);
    }

    /// Removes the endpoint registered for (verb, path). Silently succeeds
    /// when absent.
    pub fn remove_handle(&mut self, verb: &Method, path: &str) {
        self.tree.remove(verb, path);
    }

    /// Appends a callback to a named hook bucket.
    pub fn register_hook(&mut self, name: &str, hook: Hook) -> Result<(), HookError> {
        self.hooks.register(name, hook)
    }

    pub fn register_serializer<F>(&mut self, name: &str, serializer: F)
    where
        F: Fn(&Value, &mut Response) -> aqueduct_core::AnyResult<()> + Send + Sync + 'static,
    {
        self.serializers.register(name, serializer);
    }

    /// Registers a named evaluation environment for deferred handlers.
    pub fn register_env(&mut self, name: &str, env: Env) {
        self.envs.insert(name, env);
    }

    pub fn set_envs(&mut self, envs: EnvRegistry) {
        self.envs = envs;
    }

    pub fn set_404_handler<F>(&mut self, handler: F)
    where
        F: Fn(&mut Request, &mut Response) -> Value + Send + Sync + 'static,
    {
        self.not_found = Arc::new(handler);
    }

    pub fn set_405_handler<F>(&mut self, handler: F)
    where
        F: Fn(&mut Request, &mut Response) -> Value + Send + Sync + 'static,
    {
        self.method_not_allowed = Arc::new(handler);
    }

    pub fn set_error_handler<F>(&mut self, handler: F)
    where
        F: Fn(&mut Request, &mut Response, &AnyError) -> Value + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(handler);
    }

    /// Lists the next path segment of every registered child under
    /// `prefix`, sorted; see the route-tree listing semantics.
    pub fn keys_at(&self, prefix: &str) -> Vec<String> {
        self.tree.keys_at(prefix)
    }

    /// Routes one request, returning the handler value. Hook, filter, and
    /// handler failures are captured here and replaced by the error
    /// handler's value.
    pub fn route(&self, req: &mut Request, res: &mut Response) -> Value {
        match self.dispatch(req, res) {
            Ok(value) => value,
            Err(err) => self.capture_error(req, res, err),
        }
    }

    /// Runs the full pipeline: routes the request, then runs the
    /// serialization chain and returns the finished response.
    pub fn call(&self, req: &mut Request) -> Response {
        let mut res = Response::new();
        let value = self.route(req, &mut res);
        self.serialize_chain(req, res, value)
    }

    fn dispatch(&self, req: &mut Request, res: &mut Response) -> Result<Value, DispatchError> {
        self.hooks
            .run_preroute(req, res)
            .map_err(|cause| DispatchError::Hook {
                stage: "preroute",
                cause,
            })?;

        let target = self.resolve_target(req);

        let preempt = match &target {
            Target::Endpoint { endpoint, .. } => endpoint.preempt(),
            _ => None,
        };
        if let Some(value) = self.run_filters(req, res, preempt)? {
            return self.finish_route(req, res, value);
        }

        let value = match target {
            Target::Endpoint { endpoint, captures } => {
                let selector = endpoint
                    .serializer()
                    .unwrap_or(&self.options.default_serializer);
                res.set_serializer(selector);
                if req.cancel_token().is_cancelled() {
                    res.set_status(
                        StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                    );
                    Value::Null
                } else {
                    endpoint
                        .exec(&captures, req, res, &self.envs, self.options.parse_post_body)
                        .map_err(|cause| DispatchError::Handler { cause })?
                }
            }
            Target::Mount(mount) => {
                let rest = req.path()[mount.prefix.len() - 1..].to_string();
                match &mount.child {
                    MountChild::Router(child) => {
                        tracing::debug!(
                            prefix = mount.prefix.as_str(),
                            rest = rest.as_str(),
                            "delegating to mounted router"
                        );
                        req.set_path(rest);
                        child.route(req, res)
                    }
                    MountChild::Static(service) => service
                        .serve(&rest, req, res)
                        .map_err(|cause| DispatchError::Static {
                            prefix: mount.prefix.clone(),
                            cause,
                        })?,
                }
            }
            Target::Redirect { location } => {
                res.set_status(StatusCode::TEMPORARY_REDIRECT);
                if let Ok(value) = HeaderValue::from_str(&location) {
                    res.insert_header(header::LOCATION, value);
                }
                Value::Null
            }
            Target::MethodNotAllowed { allow } => {
                let list = allow
                    .iter()
                    .map(Method::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                if let Ok(value) = HeaderValue::from_str(&list) {
                    res.insert_header(header::ALLOW, value);
                }
                res.set_status(StatusCode::METHOD_NOT_ALLOWED);
                (self.method_not_allowed)(req, res)
            }
            Target::NotFound => {
                tracing::debug!(path = req.path(), "no route matched");
                res.set_status(StatusCode::NOT_FOUND);
                (self.not_found)(req, res)
            }
        };
        self.finish_route(req, res, value)
    }

    fn finish_route(
        &self,
        req: &mut Request,
        res: &mut Response,
        value: Value,
    ) -> Result<Value, DispatchError> {
        self.hooks
            .run_postroute(req, res, value)
            .map_err(|cause| DispatchError::Hook {
                stage: "postroute",
                cause,
            })
    }

    /// Decides whether this router owns a matching endpoint, defers to a
    /// mount, reconciles a trailing slash, or falls through to 404/405.
    /// When both an endpoint and a mount claim the path, the later
    /// registration wins.
    fn resolve_target(&self, req: &Request) -> Target<'_> {
        let path = req.path();
        let lookup = self.tree.lookup(req.method(), path);
        let mount = self
            .mounts
            .iter()
            .find(|mount| path.starts_with(&mount.prefix));

        match lookup {
            Lookup::Hit {
                endpoint,
                seq,
                captures,
            } => match mount {
                Some(mount) if mount.seq > seq => Target::Mount(mount),
                _ => Target::Endpoint { endpoint, captures },
            },
            Lookup::VerbMismatch { allow } => match mount {
                Some(mount) => Target::Mount(mount),
                None => Target::MethodNotAllowed { allow },
            },
            Lookup::Miss => match mount {
                Some(mount) => Target::Mount(mount),
                None => self.reconcile_trailing_slash(req),
            },
        }
    }

    fn reconcile_trailing_slash(&self, req: &Request) -> Target<'_> {
        if self.options.trailing_slash != TrailingSlash::Redirect {
            return Target::NotFound;
        }
        let canonical = toggle_trailing_slash(req.path());
        if !self.tree.would_hit(req.method(), &canonical) {
            return Target::NotFound;
        }
        let location = if req.query_raw().is_empty() {
            canonical
        } else {
            format!("{canonical}?{}", req.query_raw())
        };
        Target::Redirect { location }
    }

    /// Runs the filter chain. Pre-emption skips the named filter and every
    /// filter registered before it.
    fn run_filters(
        &self,
        req: &mut Request,
        res: &mut Response,
        preempt: Option<&str>,
    ) -> Result<Option<Value>, DispatchError> {
        let start = match preempt {
            Some(name) => match self.filters.iter().position(|f| f.name() == name) {
                Some(idx) => idx + 1,
                None => {
                    tracing::warn!(filter = name, "pre-empted filter vanished from the chain");
                    0
                }
            },
            None => 0,
        };
        for filter in &self.filters[start..] {
            match filter.run(req, res, &self.envs) {
                Outcome::Forward => continue,
                Outcome::Reply(value) => return Ok(Some(value)),
                Outcome::Fail(cause) => {
                    return Err(DispatchError::Filter {
                        name: filter.name().to_string(),
                        cause,
                    })
                }
            }
        }
        Ok(None)
    }

    fn capture_error(&self, req: &mut Request, res: &mut Response, err: DispatchError) -> Value {
        tracing::error!("request pipeline failed: {err}");
        let cause: AnyError = err.into();
        self.hooks.run_error(req, res, &cause);
        res.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        (self.error_handler)(req, res, &cause)
    }

    fn serialize_chain(&self, req: &mut Request, mut res: Response, value: Value) -> Response {
        let value = match self.hooks.run_preserialize(req, &mut res, value) {
            Ok(value) => value,
            Err(cause) => self.capture_error(
                req,
                &mut res,
                DispatchError::Hook {
                    stage: "preserialize",
                    cause,
                },
            ),
        };

        if !res.is_committed() {
            let name = res
                .serializer()
                .unwrap_or(&self.options.default_serializer)
                .to_string();
            let outcome = match self.serializers.get(&name) {
                Some(serializer) => {
                    serializer(&value, &mut res).map_err(|cause| DispatchError::Serialize { cause })
                }
                None => Err(DispatchError::UnknownSerializer(name)),
            };
            if let Err(err) = outcome {
                let fallback = self.capture_error(req, &mut res, err);
                write_json_fallback(&mut res, &fallback);
            }
        }

        let (res, hook_err) = self.hooks.run_postserialize(req, res);
        match hook_err {
            None => res,
            Some(cause) => {
                let mut res = res;
                let fallback = self.capture_error(
                    req,
                    &mut res,
                    DispatchError::Hook {
                        stage: "postserialize",
                        cause,
                    },
                );
                write_json_fallback(&mut res, &fallback);
                res
            }
        }
    }

    fn build_endpoint(&self, def: EndpointDef) -> Result<Endpoint, BuildError> {
        if def.endpoint.is_some()
            && (def.path.is_some() || def.handler.is_some() || !def.verbs.is_empty())
        {
            return Err(BuildError::ConflictingArgs);
        }
        if let Some(endpoint) = def.endpoint {
            self.validate_endpoint(
                endpoint.verbs(),
                endpoint.preempt(),
                endpoint.metadata().keys(),
            )?;
            return Ok(endpoint);
        }

        let path = def.path.ok_or(BuildError::MissingPath)?;
        if def.verbs.is_empty() {
            return Err(BuildError::EmptyVerbs);
        }
        self.validate_endpoint(&def.verbs, def.preempt.as_deref(), def.metadata.keys())?;
        let handler = def.handler.ok_or(BuildError::MissingHandler)?;
        let pattern = Pattern::compile(&path)?;
        Ok(Endpoint::new(
            def.verbs,
            pattern,
            handler,
            def.preempt,
            def.serializer,
            def.metadata,
        ))
    }

    fn validate_endpoint<'k>(
        &self,
        verbs: &[Method],
        preempt: Option<&str>,
        metadata_keys: impl Iterator<Item = &'k String>,
    ) -> Result<(), BuildError> {
        for verb in verbs {
            if !SUPPORTED_VERBS.contains(verb) {
                return Err(BuildError::UnsupportedVerb(verb.to_string()));
            }
        }
        for key in metadata_keys {
            if RESERVED_ARG_NAMES.contains(&key.as_str()) {
                return Err(BuildError::ForbiddenArg(key.clone()));
            }
        }
        if let Some(name) = preempt {
            if !self.filters.iter().any(|filter| filter.name() == name) {
                return Err(BuildError::UnknownPreempt(name.to_string()));
            }
        }
        Ok(())
    }

    fn add_filter(&mut self, filter: Filter) -> Result<(), BuildError> {
        if RESERVED_FILTER_NAMES.contains(&filter.name()) {
            return Err(BuildError::ReservedFilterName(filter.name().to_string()));
        }
        if self.filters.iter().any(|f| f.name() == filter.name()) {
            return Err(BuildError::DuplicateFilterName(filter.name().to_string()));
        }
        self.filters.push(filter);
        Ok(())
    }

    fn push_mount(&mut self, prefix: &str, child: MountChild) {
        let prefix = normalize_prefix(prefix);
        let seq = self.bump_seq();
        self.mounts.push(Mount { prefix, child, seq });
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let mut prefix = normalize(prefix);
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    prefix
}

fn toggle_trailing_slash(path: &str) -> String {
    if path.len() > 1 && path.ends_with('/') {
        path[..path.len() - 1].to_string()
    } else {
        format!("{path}/")
    }
}

fn write_json_fallback(res: &mut Response, value: &Value) {
    res.insert_header(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    res.fill_body(value.to_string().into_bytes());
}

fn default_not_found(_req: &mut Request, _res: &mut Response) -> Value {
    json!({ "error": "404 - resource not found" })
}

fn default_method_not_allowed(_req: &mut Request, _res: &mut Response) -> Value {
    json!({ "error": "405 - method not allowed" })
}

fn default_error_handler(_req: &mut Request, _res: &mut Response, _err: &AnyError) -> Value {
    json!({ "error": "500 - internal error" })
}
