//! Filters: named pipeline stages.
//!
//! Filters run in registration order before the matched target executes.
//! Each stage states its outcome explicitly through
//! [`Outcome`](aqueduct_core::handler::Outcome): `Forward` advances,
//! `Reply` short-circuits with a value, `Fail` diverts to the error
//! handler. Filters may mutate the request scratch map; downstream stages
//! observe those mutations.
use aqueduct_core::{
    handler::{EnvRegistry, FilterHandler, Outcome},
    http::{Request, Response},
};

/// Filter names reserved for the pipeline's own interception points.
pub const RESERVED_FILTER_NAMES: [&str; 4] =
    ["preroute", "postroute", "preserialize", "postserialize"];

/// A named pipeline stage.
pub struct Filter {
    name: String,
    handler: FilterHandler,
}

impl Filter {
    pub fn new(name: impl Into<String>, handler: FilterHandler) -> Self {
        Filter {
            name: name.into(),
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn run(&self, req: &mut Request, res: &mut Response, envs: &EnvRegistry) -> Outcome {
        match self.handler.resolve(envs) {
            Ok(func) => func(req, res),
            Err(err) => Outcome::Fail(err),
        }
    }
}
