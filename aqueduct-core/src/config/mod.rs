//! Router configuration.
//!
//! This module provides the configuration structures recognized by the
//! routing core. Options can be set programmatically or deserialized from a
//! definition manifest; unknown keys are rejected by serde at parse time.
//!
//! # Key Components
//!
//! - [`RouterOptions`]: The per-router option set.
//! - [`TrailingSlash`]: How `/path` and `/path/` are reconciled.
use serde::{Deserialize, Serialize};

/// Name of the serializer a fresh router selects when an endpoint does not
/// pick one itself.
pub const DEFAULT_SERIALIZER: &str = "json";

/// The per-router option set.
///
/// All fields have defaults so a manifest may specify any subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RouterOptions {
    /// How a request path with a mismatched trailing slash is handled.
    #[serde(default)]
    pub trailing_slash: TrailingSlash,

    /// Whether request bodies are parsed into handler arguments.
    #[serde(default = "default_parse_post_body")]
    pub parse_post_body: bool,

    /// Serializer used when the selected endpoint does not name one.
    #[serde(default = "default_serializer")]
    pub default_serializer: String,
}

impl Default for RouterOptions {
    fn default() -> Self {
        RouterOptions {
            trailing_slash: TrailingSlash::default(),
            parse_post_body: default_parse_post_body(),
            default_serializer: default_serializer(),
        }
    }
}

/// Trailing-slash reconciliation mode.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TrailingSlash {
    /// Paths match exactly as written.
    #[default]
    Off,
    /// A mismatched trailing slash yields 404.
    #[serde(rename = "strict-404")]
    Strict404,
    /// A mismatched trailing slash yields a 307 redirect to the canonical
    /// path, preserving the raw query string.
    Redirect,
}

const fn default_parse_post_body() -> bool {
    true
}

fn default_serializer() -> String {
    DEFAULT_SERIALIZER.to_string()
}
