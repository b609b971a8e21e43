//! Static mount seam.
//!
//! Byte-serving is an external concern; a static mount only needs something
//! that answers for every path under its prefix. The router strips the
//! mount prefix and hands over the remaining suffix.
use aqueduct_core::{
    http::{Request, Response},
    AnyResult,
};
use serde_json::Value;

/// A handler answering for every path under a static mount.
pub trait StaticService: Send + Sync {
    /// Serves `rest`, the path suffix below the mount prefix (`/` for the
    /// prefix itself).
    fn serve(&self, rest: &str, req: &mut Request, res: &mut Response) -> AnyResult<Value>;
}

impl<F> StaticService for F
where
    F: Fn(&str, &mut Request, &mut Response) -> AnyResult<Value> + Send + Sync,
{
    fn serve(&self, rest: &str, req: &mut Request, res: &mut Response) -> AnyResult<Value> {
        self(rest, req, res)
    }
}
