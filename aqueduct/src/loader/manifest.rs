//! Manifest descriptors and the built-in definition source.
//!
//! A manifest is what the external annotation parser yields per source: a
//! set of endpoint, filter, and static-mount descriptors plus router
//! options. The built-in [`ManifestSource`] reads manifests from JSON or
//! TOML files, chosen by extension.
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::bail;
use aqueduct_core::{config::RouterOptions, AnyResult};
use http::Method;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::router::{Router, SUPPORTED_VERBS};

use super::{build, DefinitionSource, LoadError, LoaderContext};

/// Everything one definition file declares.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ApiManifest {
    pub options: RouterOptions,

    /// Environment id handler names resolve in; descriptors may override.
    pub env: Option<String>,

    pub filters: Vec<FilterDescriptor>,
    pub endpoints: Vec<EndpointDescriptor>,
    pub statics: Vec<StaticDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EndpointDescriptor {
    pub verbs: Vec<String>,
    pub path: String,

    /// Handler binding name, resolved as a deferred expression.
    pub handler: String,

    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub preempt: Option<String>,
    #[serde(default)]
    pub serializer: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FilterDescriptor {
    pub name: String,
    pub handler: String,
    #[serde(default)]
    pub env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StaticDescriptor {
    /// Public prefix the mount answers under.
    pub prefix: String,
    /// Local root handed to the static-handler factory.
    pub root: PathBuf,
}

pub(crate) fn parse_verb(raw: &str) -> Result<Method, LoadError> {
    let upper = raw.to_ascii_uppercase();
    SUPPORTED_VERBS
        .iter()
        .find(|verb| verb.as_str() == upper)
        .cloned()
        .ok_or_else(|| LoadError::UnknownVerb(raw.to_string()))
}

/// The built-in manifest reader.
pub struct ManifestSource;

const DEFINITION_CANDIDATES: [&str; 2] = ["api.json", "api.toml"];
const ENTRYPOINT_CANDIDATES: [&str; 2] = ["entrypoint.json", "entrypoint.toml"];

impl DefinitionSource for ManifestSource {
    fn definition_candidates(&self) -> &[&str] {
        &DEFINITION_CANDIDATES
    }

    fn entrypoint_candidates(&self) -> &[&str] {
        &ENTRYPOINT_CANDIDATES
    }

    fn parse(&self, path: &Path) -> AnyResult<ApiManifest> {
        let raw = std::fs::read(path)?;
        parse(parse_extension(path), &raw)
    }

    /// An entrypoint manifest must itself yield a runnable router: one
    /// declaring nothing produces `None`.
    fn entrypoint(&self, path: &Path, ctx: &LoaderContext) -> AnyResult<Option<Router>> {
        let manifest = self.parse(path)?;
        if manifest.endpoints.is_empty()
            && manifest.filters.is_empty()
            && manifest.statics.is_empty()
        {
            return Ok(None);
        }
        Ok(Some(build(manifest, ctx)?))
    }
}

pub(crate) fn parse<T: DeserializeOwned>(extension: String, raw: &[u8]) -> AnyResult<T> {
    let parser_type: ParserType = extension.as_str().into();
    match parser_type {
        ParserType::Json(parser) => parser.parse(raw),
        ParserType::Toml(parser) => parser.parse(raw),
        ParserType::Unsupported => {
            bail!("no parser available for definition format {}", extension)
        }
    }
}

enum ParserType {
    Json(JsonParser),
    Toml(TomlParser),
    Unsupported,
}

impl From<&str> for ParserType {
    fn from(extension: &str) -> Self {
        match extension {
            "json" => ParserType::Json(Default::default()),
            "toml" => ParserType::Toml(Default::default()),
            _ => ParserType::Unsupported,
        }
    }
}

trait Parser {
    fn parse<T: DeserializeOwned>(&self, raw: &[u8]) -> AnyResult<T>;
}

#[derive(Default)]
struct JsonParser;

impl Parser for JsonParser {
    fn parse<T: DeserializeOwned>(&self, raw: &[u8]) -> AnyResult<T> {
        match serde_json::from_slice::<T>(raw) {
            Ok(t) => Ok(t),
            Err(e) => bail!(e),
        }
    }
}

#[derive(Default)]
struct TomlParser;

impl Parser for TomlParser {
    fn parse<T: DeserializeOwned>(&self, raw: &[u8]) -> AnyResult<T> {
        let content = String::from_utf8(raw.to_vec())?;
        match toml::from_str(&content) {
            Ok(t) => Ok(t),
            Err(e) => bail!(e),
        }
    }
}

fn parse_extension(path: &Path) -> String {
    path.extension()
        .and_then(|extension| extension.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}
