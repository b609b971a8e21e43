//! Loader adapter.
//!
//! Bridges an external definition parser into builder calls. The loader
//! resolves file vs directory inputs, prefers an entrypoint that produces a
//! ready router, falls back to the default definition file, and applies the
//! parsed descriptors through the builder facade. The built-in
//! [`ManifestSource`] reads JSON or TOML manifests; descriptor handlers are
//! names resolved as deferred expressions against the caller-supplied
//! evaluation environments.
mod manifest;

pub use manifest::{
    ApiManifest, EndpointDescriptor, FilterDescriptor, ManifestSource, StaticDescriptor,
};

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use aqueduct_core::{
    handler::{EnvRegistry, Handler},
    AnyError, AnyResult,
};
use thiserror::Error;

use crate::{
    endpoint::EndpointDef,
    router::{BuildError, Router},
    static_mount::StaticService,
};

/// Environment id used when a manifest does not name one.
pub const DEFAULT_ENV: &str = "api";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no path specified")]
    MissingPath,
    #[error("file `{0}` not found")]
    FileNotFound(PathBuf),
    #[error("`{0}` is a directory, expected a file")]
    IsDirectory(PathBuf),
    #[error("no api definition found under `{0}`")]
    NoDefinitionFound(PathBuf),
    #[error("entrypoint `{0}` did not produce a router")]
    BadEntrypoint(PathBuf),
    #[error("unknown verb `{0}` in definition")]
    UnknownVerb(String),
    #[error("static mount `{0}` requires a static service factory")]
    NoStaticFactory(String),
    #[error("failed to parse definition `{path}`: {cause}")]
    Parse { path: PathBuf, cause: AnyError },
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Produces a static handler for a local root directory. Byte serving
/// itself stays outside the core.
pub type StaticFactory = Arc<dyn Fn(&Path) -> AnyResult<Arc<dyn StaticService>> + Send + Sync>;

/// Everything a manifest needs resolved from the host: evaluation
/// environments for deferred handlers and an optional static-handler
/// factory.
#[derive(Default, Clone)]
pub struct LoaderContext {
    pub envs: EnvRegistry,
    pub statics: Option<StaticFactory>,
}

/// What the caller handed the loader.
pub enum DefinitionInput<'a> {
    File(&'a Path),
    Dir(&'a Path),
    None,
}

/// The external definition parser's seam.
pub trait DefinitionSource {
    /// Default definition file names probed in directory mode, in order.
    fn definition_candidates(&self) -> &[&str];

    /// Entrypoint file names probed first in directory mode, in order.
    fn entrypoint_candidates(&self) -> &[&str];

    /// Parses one definition file into a manifest.
    fn parse(&self, path: &Path) -> AnyResult<ApiManifest>;

    /// Runs an entrypoint. `Ok(None)` means the entrypoint did not yield a
    /// runnable router.
    fn entrypoint(&self, path: &Path, ctx: &LoaderContext) -> AnyResult<Option<Router>>;
}

/// Resolves the input and produces a router.
pub fn load(
    input: DefinitionInput<'_>,
    source: &dyn DefinitionSource,
    ctx: &LoaderContext,
) -> Result<Router, LoadError> {
    match input {
        DefinitionInput::None => Err(LoadError::MissingPath),
        DefinitionInput::File(path) => {
            if path.as_os_str().is_empty() {
                return Err(LoadError::MissingPath);
            }
            if !path.exists() {
                return Err(LoadError::FileNotFound(path.to_path_buf()));
            }
            if path.is_dir() {
                return Err(LoadError::IsDirectory(path.to_path_buf()));
            }
            let manifest = source.parse(path).map_err(|cause| LoadError::Parse {
                path: path.to_path_buf(),
                cause,
            })?;
            build(manifest, ctx)
        }
        DefinitionInput::Dir(dir) => {
            if dir.as_os_str().is_empty() {
                return Err(LoadError::MissingPath);
            }
            if !dir.exists() {
                return Err(LoadError::FileNotFound(dir.to_path_buf()));
            }
            for candidate in source.entrypoint_candidates() {
                let path = dir.join(candidate);
                if path.exists() {
                    tracing::info!(path = %path.display(), "adopting router from entrypoint");
                    return match source.entrypoint(&path, ctx) {
                        Ok(Some(router)) => Ok(router),
                        Ok(None) => Err(LoadError::BadEntrypoint(path)),
                        Err(cause) => {
                            tracing::error!("entrypoint failed: {cause}");
                            Err(LoadError::BadEntrypoint(path))
                        }
                    };
                }
            }
            for candidate in source.definition_candidates() {
                let path = dir.join(candidate);
                if path.exists() {
                    tracing::info!(path = %path.display(), "loading api definition");
                    let manifest = source.parse(&path).map_err(|cause| LoadError::Parse {
                        path: path.clone(),
                        cause,
                    })?;
                    return build(manifest, ctx);
                }
            }
            Err(LoadError::NoDefinitionFound(dir.to_path_buf()))
        }
    }
}

/// Applies a parsed manifest through builder calls.
pub fn build(manifest: ApiManifest, ctx: &LoaderContext) -> Result<Router, LoadError> {
    let mut router = Router::with_options(manifest.options);
    router.set_envs(ctx.envs.clone());
    let default_env = manifest.env.as_deref().unwrap_or(DEFAULT_ENV);

    for filter in &manifest.filters {
        let env = filter.env.as_deref().unwrap_or(default_env);
        router.filter_deferred(&filter.name, env, &filter.handler)?;
    }

    for endpoint in &manifest.endpoints {
        let env = endpoint.env.as_deref().unwrap_or(default_env);
        let mut def = EndpointDef::new()
            .path(&endpoint.path)
            .handler(Handler::deferred(env, &endpoint.handler));
        for verb in &endpoint.verbs {
            def = def.verb(manifest::parse_verb(verb)?);
        }
        if let Some(preempt) = &endpoint.preempt {
            def = def.preempt(preempt);
        }
        if let Some(serializer) = &endpoint.serializer {
            def = def.serializer(serializer);
        }
        for (key, value) in &endpoint.metadata {
            def = def.metadata(key, value.clone());
        }
        router.handle(def)?;
    }

    for mount in &manifest.statics {
        let factory = ctx
            .statics
            .as_ref()
            .ok_or_else(|| LoadError::NoStaticFactory(mount.prefix.clone()))?;
        let service = factory(&mount.root).map_err(|cause| LoadError::Parse {
            path: mount.root.clone(),
            cause,
        })?;
        router.mount_static(&mount.prefix, service);
    }

    Ok(router)
}
