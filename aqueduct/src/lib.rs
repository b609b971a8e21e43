//! Request routing and pipeline core for annotation-driven HTTP APIs.
//!
//! A [`Router`] owns an ordered filter chain, a tree of routes, a set of
//! mounts (child routers and static handlers), and a registry of pipeline
//! hooks. A request dispatched through [`Router::call`] flows through the
//! stages in strict order: preroute hooks, the filter chain, the matched
//! endpoint (or mount, or the 404/405 handlers), postroute hooks, then the
//! serialization chain.
//!
//! # Key Components
//!
//! - [`pattern`]: path patterns with typed dynamic segments.
//! - [`endpoint`]: leaf handlers for one (verbs, path) pair.
//! - [`filter`]: named pipeline stages that forward, reply, or fail.
//! - [`hooks`]: observer/rewriter callbacks at named pipeline stages.
//! - [`bind`]: merging of captures, query, and body into handler arguments.
//! - [`router`]: the dispatch core and builder facade.
//! - [`loader`]: bridging parsed API definitions into builder calls.
pub mod bind;
pub mod endpoint;
pub mod filter;
pub mod hooks;
pub mod loader;
pub mod pattern;
pub mod router;
pub mod serialize;
pub mod static_mount;
mod tree;

pub use aqueduct_core::{
    config::{RouterOptions, TrailingSlash},
    handler::{Args, Env, EnvRegistry, FilterHandler, Handler, HandlerSpec, Outcome},
    http::{CancelToken, Request, Response, Scratch},
    AnyError, AnyResult,
};
pub use router::{BuildError, Router};
