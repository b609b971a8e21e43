//! Argument binding.
//!
//! Merges the request's scratch entries, parsed query, path captures, and
//! parsed body into the argument set a handler receives. When the same name
//! recurs the first-set value wins, in that order: query beats path beats
//! body. The implicit `req`/`res` views are passed alongside and can never
//! be shadowed. Only the handler's declared parameter names are forwarded
//! unless the handler is variadic.
use std::collections::BTreeMap;

use aqueduct_core::{
    handler::{Args, HandlerSpec},
    http::Request,
    AnyResult,
};
use serde_json::Value;

use crate::pattern::Pattern;

/// Produces the bound argument set for one handler invocation.
pub fn bind_args(
    spec: &HandlerSpec,
    pattern: &Pattern,
    captures: &[(String, String)],
    req: &mut Request,
    parse_body: bool,
) -> AnyResult<Args> {
    if parse_body && req.body_args().is_none() && !req.body().is_empty() {
        let parsed = parse_body_args(req)?;
        req.set_body_args(parsed);
    }

    let mut args = Args::new();
    let admit =
        |name: &str| spec.is_variadic() || spec.params().iter().any(|param| param == name);

    // Scratch entries contributed by filters come first.
    for (name, value) in req.scratch() {
        if admit(name) {
            args.entry(name.clone()).or_insert_with(|| value.clone());
        }
    }

    // Query values stay strings; handlers coerce themselves.
    for (name, value) in req.query() {
        if admit(name) {
            args.entry(name.clone())
                .or_insert_with(|| Value::String(value.clone()));
        }
    }

    // Path captures coerce per their type tag.
    for (name, raw) in captures {
        if admit(name) {
            let value = match pattern.capture_type(name) {
                Some(ty) => ty.coerce(raw),
                None => Value::String(raw.clone()),
            };
            args.entry(name.clone()).or_insert(value);
        }
    }

    if let Some(body_args) = req.body_args() {
        for (name, value) in body_args {
            if admit(name) {
                args.entry(name.clone()).or_insert_with(|| value.clone());
            }
        }
    }

    Ok(args)
}

/// Parses the raw body into named arguments by content type. Bodies that do
/// not decompose into named fields contribute nothing; the raw bytes stay
/// available on the request.
fn parse_body_args(req: &Request) -> AnyResult<BTreeMap<String, Value>> {
    let content_type = req
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/json");

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let mut parsed = BTreeMap::new();
        for (name, value) in url::form_urlencoded::parse(req.body()) {
            parsed
                .entry(name.into_owned())
                .or_insert_with(|| Value::String(value.into_owned()));
        }
        return Ok(parsed);
    }

    if content_type.starts_with("application/json") {
        let value: Value = serde_json::from_slice(req.body())?;
        let mut parsed = BTreeMap::new();
        if let Value::Object(fields) = value {
            parsed.extend(fields);
        }
        return Ok(parsed);
    }

    Ok(BTreeMap::new())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::Method;
    use serde_json::json;

    use super::*;

    fn sink_all() -> HandlerSpec {
        HandlerSpec::variadic(|_req, _res, _args| Ok(Value::Null))
    }

    fn declaring(params: &[&str]) -> HandlerSpec {
        HandlerSpec::new(params.iter().copied(), |_req, _res, _args| Ok(Value::Null))
    }

    #[test]
    fn test_query_beats_path_beats_body() {
        let pattern = Pattern::compile("/items/<id:int>").unwrap();
        let mut req = Request::new(Method::POST, "/items/7?id=query")
            .with_body(Bytes::from_static(b"{\"id\": \"body\"}"));
        let captures = vec![("id".to_string(), "7".to_string())];

        let args = bind_args(&sink_all(), &pattern, &captures, &mut req, true).unwrap();
        assert_eq!(args.get("id").unwrap(), &json!("query"));

        let mut req =
            Request::new(Method::POST, "/items/7").with_body(Bytes::from_static(b"{\"id\": 99}"));
        let args = bind_args(&sink_all(), &pattern, &captures, &mut req, true).unwrap();
        assert_eq!(args.get("id").unwrap(), &json!(7));
    }

    #[test]
    fn test_scratch_comes_first() {
        let pattern = Pattern::compile("/x").unwrap();
        let mut req = Request::new(Method::GET, "/x?who=query");
        req.scratch_mut().insert("who".to_string(), json!("filter"));

        let args = bind_args(&sink_all(), &pattern, &[], &mut req, true).unwrap();
        assert_eq!(args.get("who").unwrap(), &json!("filter"));
    }

    #[test]
    fn test_undeclared_names_dropped() {
        let pattern = Pattern::compile("/x").unwrap();
        let mut req = Request::new(Method::GET, "/x?keep=1&drop=2");
        let args = bind_args(&declaring(&["keep"]), &pattern, &[], &mut req, true).unwrap();
        assert_eq!(args.len(), 1);
        assert_eq!(args.get("keep").unwrap(), &json!("1"));
    }

    #[test]
    fn test_variadic_forwards_everything() {
        let pattern = Pattern::compile("/x").unwrap();
        let mut req = Request::new(Method::GET, "/x?a=1&b=2");
        let args = bind_args(&sink_all(), &pattern, &[], &mut req, true).unwrap();
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_typed_capture_coercion() {
        let pattern = Pattern::compile("/f/<flag:bool>/<ratio:double>").unwrap();
        let captures = vec![
            ("flag".to_string(), "yes".to_string()),
            ("ratio".to_string(), "1.5".to_string()),
        ];
        let mut req = Request::new(Method::GET, "/f/yes/1.5");
        let args = bind_args(&sink_all(), &pattern, &captures, &mut req, true).unwrap();
        assert_eq!(args.get("flag").unwrap(), &json!(true));
        assert_eq!(args.get("ratio").unwrap(), &json!(1.5));
    }

    #[test]
    fn test_form_body_stays_strings() {
        let pattern = Pattern::compile("/x").unwrap();
        let mut req = Request::new(Method::POST, "/x")
            .with_header(
                http::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .with_body(Bytes::from_static(b"n=5&s=hi"));
        let args = bind_args(&sink_all(), &pattern, &[], &mut req, true).unwrap();
        assert_eq!(args.get("n").unwrap(), &json!("5"));
        assert_eq!(args.get("s").unwrap(), &json!("hi"));
    }

    #[test]
    fn test_body_skipped_when_disabled() {
        let pattern = Pattern::compile("/x").unwrap();
        let mut req =
            Request::new(Method::POST, "/x").with_body(Bytes::from_static(b"{\"a\": 1}"));
        let args = bind_args(&sink_all(), &pattern, &[], &mut req, false).unwrap();
        assert!(args.is_empty());
    }

    #[test]
    fn test_malformed_json_body_errors() {
        let pattern = Pattern::compile("/x").unwrap();
        let mut req = Request::new(Method::POST, "/x").with_body(Bytes::from_static(b"{oops"));
        assert!(bind_args(&sink_all(), &pattern, &[], &mut req, true).is_err());
    }
}
