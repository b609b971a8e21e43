//! Endpoints: leaf handlers for one (verbs, path) pair.
use std::collections::BTreeMap;

use aqueduct_core::{
    handler::{EnvRegistry, Handler},
    http::{Request, Response},
    AnyResult,
};
use http::Method;
use serde_json::Value;

use crate::{
    bind,
    pattern::{Pattern, PatternError},
};

/// Metadata keys that collide with the implicit binder arguments.
pub const RESERVED_ARG_NAMES: [&str; 2] = ["req", "res"];

/// A leaf route handler. Immutable after registration.
pub struct Endpoint {
    verbs: Vec<Method>,
    pattern: Pattern,
    handler: Handler,
    preempt: Option<String>,
    serializer: Option<String>,
    metadata: BTreeMap<String, Value>,
}

impl Endpoint {
    pub(crate) fn new(
        verbs: Vec<Method>,
        pattern: Pattern,
        handler: Handler,
        preempt: Option<String>,
        serializer: Option<String>,
        metadata: BTreeMap<String, Value>,
    ) -> Self {
        Endpoint {
            verbs,
            pattern,
            handler,
            preempt,
            serializer,
            metadata,
        }
    }

    /// Builds a standalone endpoint for later registration through
    /// [`EndpointDef::prebuilt`]. A missing leading `/` on the path is
    /// prepended.
    pub fn build(verbs: Vec<Method>, path: &str, handler: Handler) -> Result<Self, PatternError> {
        Ok(Endpoint {
            verbs,
            pattern: Pattern::compile(path)?,
            handler,
            preempt: None,
            serializer: None,
            metadata: BTreeMap::new(),
        })
    }

    pub fn with_preempt(mut self, filter: impl Into<String>) -> Self {
        self.preempt = Some(filter.into());
        self
    }

    pub fn with_serializer(mut self, name: impl Into<String>) -> Self {
        self.serializer = Some(name.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn verbs(&self) -> &[Method] {
        &self.verbs
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Name of the filter this endpoint pre-empts, if any.
    pub fn preempt(&self) -> Option<&str> {
        self.preempt.as_deref()
    }

    /// Serializer selector, `None` for the router default.
    pub fn serializer(&self) -> Option<&str> {
        self.serializer.as_deref()
    }

    /// Free-form documentation metadata.
    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// Binds arguments and invokes the handler. The handler's failure
    /// propagates; it never writes status or body here except through its
    /// own mutation of the response view.
    pub fn exec(
        &self,
        captures: &[(String, String)],
        req: &mut Request,
        res: &mut Response,
        envs: &EnvRegistry,
        parse_body: bool,
    ) -> AnyResult<Value> {
        let spec = self.handler.resolve(envs)?;
        let args = bind::bind_args(&spec, &self.pattern, captures, req, parse_body)?;
        spec.invoke(req, res, &args)
    }
}

/// Assembles the pieces of a [`handle`](crate::Router::handle) call.
///
/// Either wraps a prebuilt endpoint or carries inline parts; supplying both
/// is rejected at registration.
#[derive(Default)]
pub struct EndpointDef {
    pub(crate) endpoint: Option<Endpoint>,
    pub(crate) verbs: Vec<Method>,
    pub(crate) path: Option<String>,
    pub(crate) handler: Option<Handler>,
    pub(crate) preempt: Option<String>,
    pub(crate) serializer: Option<String>,
    pub(crate) metadata: BTreeMap<String, Value>,
}

impl EndpointDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prebuilt(endpoint: Endpoint) -> Self {
        EndpointDef {
            endpoint: Some(endpoint),
            ..Self::default()
        }
    }

    pub fn verb(mut self, verb: Method) -> Self {
        self.verbs.push(verb);
        self
    }

    pub fn verbs(mut self, verbs: impl IntoIterator<Item = Method>) -> Self {
        self.verbs.extend(verbs);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn handler(mut self, handler: Handler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn preempt(mut self, filter: impl Into<String>) -> Self {
        self.preempt = Some(filter.into());
        self
    }

    pub fn serializer(mut self, name: impl Into<String>) -> Self {
        self.serializer = Some(name.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
