//! Pipeline interception points.
//!
//! Five named buckets hold ordered callbacks: `preroute` observes the
//! request before anything else runs; `postroute` and `preserialize` may
//! rewrite the in-flight value; `postserialize` may rewrite the finished
//! response; `error` observes failures before the error handler produces a
//! replacement value. Within a bucket, callbacks run in registration order
//! and each sees the output of the previous one. A failing callback aborts
//! the rest of its bucket.
use std::sync::Arc;

use aqueduct_core::{
    http::{Request, Response},
    AnyError, AnyResult,
};
use serde_json::Value;
use thiserror::Error;

pub type StageHook = Arc<dyn Fn(&mut Request, &mut Response) -> AnyResult<()> + Send + Sync>;
pub type ValueHook =
    Arc<dyn Fn(&mut Request, &mut Response, Value) -> AnyResult<Value> + Send + Sync>;
pub type ResponseHook = Arc<dyn Fn(&mut Request, Response) -> AnyResult<Response> + Send + Sync>;
pub type ErrorHook = Arc<dyn Fn(&mut Request, &mut Response, &AnyError) -> AnyResult<()> + Send + Sync>;

#[derive(Debug, Error)]
pub enum HookError {
    #[error("unknown hook `{0}`")]
    UnknownHook(String),
    #[error("hook `{name}` registered with a mismatched callback shape")]
    SignatureMismatch { name: String },
}

/// A callback tagged with the bucket shape it expects.
pub enum Hook {
    Preroute(StageHook),
    Postroute(ValueHook),
    Preserialize(ValueHook),
    Postserialize(ResponseHook),
    Error(ErrorHook),
}

impl Hook {
    pub fn preroute<F>(func: F) -> Self
    where
        F: Fn(&mut Request, &mut Response) -> AnyResult<()> + Send + Sync + 'static,
    {
        Hook::Preroute(Arc::new(func))
    }

    pub fn postroute<F>(func: F) -> Self
    where
        F: Fn(&mut Request, &mut Response, Value) -> AnyResult<Value> + Send + Sync + 'static,
    {
        Hook::Postroute(Arc::new(func))
    }

    pub fn preserialize<F>(func: F) -> Self
    where
        F: Fn(&mut Request, &mut Response, Value) -> AnyResult<Value> + Send + Sync + 'static,
    {
        Hook::Preserialize(Arc::new(func))
    }

    pub fn postserialize<F>(func: F) -> Self
    where
        F: Fn(&mut Request, Response) -> AnyResult<Response> + Send + Sync + 'static,
    {
        Hook::Postserialize(Arc::new(func))
    }

    pub fn error<F>(func: F) -> Self
    where
        F: Fn(&mut Request, &mut Response, &AnyError) -> AnyResult<()> + Send + Sync + 'static,
    {
        Hook::Error(Arc::new(func))
    }
}

/// The five hook buckets of one router. Additive only.
#[derive(Default)]
pub struct HookRegistry {
    preroute: Vec<StageHook>,
    postroute: Vec<ValueHook>,
    preserialize: Vec<ValueHook>,
    postserialize: Vec<ResponseHook>,
    error: Vec<ErrorHook>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a callback to the named bucket.
    pub fn register(&mut self, name: &str, hook: Hook) -> Result<(), HookError> {
        match (name, hook) {
            ("preroute", Hook::Preroute(f)) => self.preroute.push(f),
            ("postroute", Hook::Postroute(f)) => self.postroute.push(f),
            ("preserialize", Hook::Preserialize(f)) => self.preserialize.push(f),
            ("postserialize", Hook::Postserialize(f)) => self.postserialize.push(f),
            ("error", Hook::Error(f)) => self.error.push(f),
            ("preroute" | "postroute" | "preserialize" | "postserialize" | "error", _) => {
                return Err(HookError::SignatureMismatch { name: name.into() })
            }
            (other, _) => return Err(HookError::UnknownHook(other.into())),
        }
        Ok(())
    }

    pub(crate) fn run_preroute(&self, req: &mut Request, res: &mut Response) -> AnyResult<()> {
        for hook in &self.preroute {
            hook(req, res)?;
        }
        Ok(())
    }

    pub(crate) fn run_postroute(
        &self,
        req: &mut Request,
        res: &mut Response,
        mut value: Value,
    ) -> AnyResult<Value> {
        for hook in &self.postroute {
            value = hook(req, res, value)?;
        }
        Ok(value)
    }

    pub(crate) fn run_preserialize(
        &self,
        req: &mut Request,
        res: &mut Response,
        mut value: Value,
    ) -> AnyResult<Value> {
        for hook in &self.preserialize {
            value = hook(req, res, value)?;
        }
        Ok(value)
    }

    /// Runs the postserialize bucket. A failing callback aborts the bucket
    /// and consumes the in-flight response; the caller receives a fresh
    /// response alongside the failure and rebuilds it via the error path.
    pub(crate) fn run_postserialize(
        &self,
        req: &mut Request,
        mut res: Response,
    ) -> (Response, Option<AnyError>) {
        for hook in &self.postserialize {
            match hook(req, res) {
                Ok(next) => res = next,
                Err(err) => return (Response::new(), Some(err)),
            }
        }
        (res, None)
    }

    /// Error hooks observe; their own failures are logged and abort the
    /// bucket without replacing the original error.
    pub(crate) fn run_error(&self, req: &mut Request, res: &mut Response, err: &AnyError) {
        for hook in &self.error {
            if let Err(hook_err) = hook(req, res, err) {
                tracing::warn!("error hook failed: {hook_err}");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use http::Method;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_unknown_bucket() {
        let mut hooks = HookRegistry::new();
        let err = hooks
            .register("prefilter", Hook::preroute(|_req, _res| Ok(())))
            .unwrap_err();
        assert!(matches!(err, HookError::UnknownHook(name) if name == "prefilter"));
    }

    #[test]
    fn test_shape_mismatch() {
        let mut hooks = HookRegistry::new();
        let err = hooks
            .register("postroute", Hook::preroute(|_req, _res| Ok(())))
            .unwrap_err();
        assert!(matches!(err, HookError::SignatureMismatch { .. }));
    }

    #[test]
    fn test_bucket_runs_in_order_and_chains() {
        let mut hooks = HookRegistry::new();
        hooks
            .register(
                "postroute",
                Hook::postroute(|_req, _res, value| Ok(json!([value, "first"]))),
            )
            .unwrap();
        hooks
            .register(
                "postroute",
                Hook::postroute(|_req, _res, value| Ok(json!([value, "second"]))),
            )
            .unwrap();

        let mut req = Request::new(Method::GET, "/");
        let mut res = Response::new();
        let value = hooks
            .run_postroute(&mut req, &mut res, json!("seed"))
            .unwrap();
        assert_eq!(value, json!([["seed", "first"], "second"]));
    }

    #[test]
    fn test_failed_hook_aborts_bucket() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let mut hooks = HookRegistry::new();
        hooks
            .register(
                "preroute",
                Hook::preroute(|_req, _res| Err(anyhow::anyhow!("nope"))),
            )
            .unwrap();
        hooks
            .register(
                "preroute",
                Hook::preroute(|_req, _res| {
                    CALLS.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();

        let mut req = Request::new(Method::GET, "/");
        let mut res = Response::new();
        assert!(hooks.run_preroute(&mut req, &mut res).is_err());
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_identity_hooks_do_not_change_value() {
        let mut hooks = HookRegistry::new();
        hooks
            .register("preserialize", Hook::preserialize(|_req, _res, v| Ok(v)))
            .unwrap();
        let mut req = Request::new(Method::GET, "/");
        let mut res = Response::new();
        let value = hooks
            .run_preserialize(&mut req, &mut res, json!({"k": 1}))
            .unwrap();
        assert_eq!(value, json!({"k": 1}));
    }
}
