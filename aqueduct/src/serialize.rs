//! Serializer registry.
//!
//! Serialization itself is an external concern; the router only needs an
//! opaque mapping from a handler value to response bytes, selected by name.
//! A JSON serializer is registered out of the box under the default name.
use std::{collections::HashMap, sync::Arc};

use aqueduct_core::{http::Response, AnyResult};
use http::{header, HeaderValue};
use serde_json::Value;

/// Writes a handler value into the response body.
pub type SerializerFn = Arc<dyn Fn(&Value, &mut Response) -> AnyResult<()> + Send + Sync>;

/// Named serializers available to a router.
pub struct SerializerRegistry {
    serializers: HashMap<String, SerializerFn>,
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        let mut registry = SerializerRegistry {
            serializers: HashMap::new(),
        };
        registry.register(aqueduct_core::config::DEFAULT_SERIALIZER, json_serializer);
        registry
    }
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, serializer: F)
    where
        F: Fn(&Value, &mut Response) -> AnyResult<()> + Send + Sync + 'static,
    {
        self.serializers.insert(name.into(), Arc::new(serializer));
    }

    pub fn get(&self, name: &str) -> Option<&SerializerFn> {
        self.serializers.get(name)
    }
}

fn json_serializer(value: &Value, res: &mut Response) -> AnyResult<()> {
    let body = serde_json::to_vec(value)?;
    res.insert_header(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    res.fill_body(body);
    Ok(())
}
