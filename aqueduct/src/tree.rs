//! Route tree.
//!
//! A trie keyed by literal segments with dynamic children bucketed by type
//! tag. Matching prefers literal children, then dynamic children by tag
//! specificity (int, double, bool, string), then registration order, and
//! backtracks out of a failed subtree. Each node holds at most one endpoint
//! per verb; one endpoint may appear under several verbs.
use std::{collections::BTreeMap, sync::Arc};

use http::Method;

use crate::{
    endpoint::Endpoint,
    pattern::{split_path, Pattern, Segment, SegmentType},
};

#[derive(Default)]
pub(crate) struct RouteTree {
    root: Node,
}

#[derive(Default)]
struct Node {
    literals: BTreeMap<String, Node>,
    dynamics: Vec<DynChild>,
    exact: Vec<Terminal>,
    slashed: Vec<Terminal>,
}

struct DynChild {
    name: String,
    ty: SegmentType,
    seq: u64,
    node: Node,
}

struct Terminal {
    verb: Method,
    endpoint: Arc<Endpoint>,
    seq: u64,
}

pub(crate) enum Lookup<'t> {
    Hit {
        endpoint: &'t Arc<Endpoint>,
        seq: u64,
        captures: Vec<(String, String)>,
    },
    VerbMismatch {
        allow: Vec<Method>,
    },
    Miss,
}

impl Node {
    fn has_terminal(&self) -> bool {
        !self.exact.is_empty() || !self.slashed.is_empty()
    }

    fn has_children(&self) -> bool {
        !self.literals.is_empty() || !self.dynamics.is_empty()
    }

    fn bucket(&self, trailing: bool) -> &Vec<Terminal> {
        if trailing {
            &self.slashed
        } else {
            &self.exact
        }
    }

    fn bucket_mut(&mut self, trailing: bool) -> &mut Vec<Terminal> {
        if trailing {
            &mut self.slashed
        } else {
            &mut self.exact
        }
    }
}

impl RouteTree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, endpoint: Arc<Endpoint>, seq: u64) {
        let mut node = &mut self.root;
        for segment in endpoint.pattern().segments() {
            node = match segment {
                Segment::Literal(lit) => node.literals.entry(lit.clone()).or_default(),
                Segment::Capture { name, ty } => {
                    let idx = match node
                        .dynamics
                        .iter()
                        .position(|child| child.name == *name && child.ty == *ty)
                    {
                        Some(idx) => idx,
                        None => {
                            // Keep dynamic children ordered by match preference.
                            let at = node
                                .dynamics
                                .iter()
                                .position(|child| (child.ty, child.seq) > (*ty, seq))
                                .unwrap_or(node.dynamics.len());
                            node.dynamics.insert(
                                at,
                                DynChild {
                                    name: name.clone(),
                                    ty: *ty,
                                    seq,
                                    node: Node::default(),
                                },
                            );
                            at
                        }
                    };
                    &mut node.dynamics[idx].node
                }
            };
        }

        let trailing = endpoint.pattern().has_trailing_slash();
        let bucket = node.bucket_mut(trailing);
        for verb in endpoint.verbs() {
            match bucket.iter_mut().find(|terminal| terminal.verb == *verb) {
                Some(terminal) => {
                    tracing::warn!(
                        verb = %verb,
                        path = endpoint.pattern().raw(),
                        "replacing previously registered endpoint"
                    );
                    terminal.endpoint = endpoint.clone();
                    terminal.seq = seq;
                }
                None => bucket.push(Terminal {
                    verb: verb.clone(),
                    endpoint: endpoint.clone(),
                    seq,
                }),
            }
        }
    }

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Lookup<'_> {
        let (parts, trailing) = split_path(path);
        let mut captures = Vec::new();
        let mut mismatch: Option<Vec<Method>> = None;
        match walk(
            &self.root,
            &parts,
            trailing,
            method,
            &mut captures,
            &mut mismatch,
        ) {
            Some((endpoint, seq)) => Lookup::Hit {
                endpoint,
                seq,
                captures,
            },
            None => match mismatch {
                Some(allow) => Lookup::VerbMismatch { allow },
                None => Lookup::Miss,
            },
        }
    }

    /// Whether a request would hit an endpoint, used for trailing-slash
    /// reconciliation probes.
    pub(crate) fn would_hit(&self, method: &Method, path: &str) -> bool {
        matches!(self.lookup(method, path), Lookup::Hit { .. })
    }

    pub(crate) fn remove(&mut self, verb: &Method, path: &str) {
        let Ok(pattern) = Pattern::compile(path) else {
            return;
        };
        if let Some(node) = descend(&mut self.root, pattern.segments()) {
            node.bucket_mut(pattern.has_trailing_slash())
                .retain(|terminal| terminal.verb != *verb);
        }
    }

    /// Lists the next path segment of every child under `prefix`, sorted.
    ///
    /// A child contributes its segment once when an endpoint terminates
    /// exactly there and once more when deeper routes exist beneath it.
    pub(crate) fn keys_at(&self, prefix: &str) -> Vec<String> {
        let (parts, _) = split_path(prefix);
        let mut node = &self.root;
        for part in parts {
            node = match node.literals.get(part) {
                Some(child) => child,
                None => match node
                    .dynamics
                    .iter()
                    .find(|child| segment_key(&child.name, child.ty) == part)
                {
                    Some(child) => &child.node,
                    None => return Vec::new(),
                },
            };
        }

        let mut keys = Vec::new();
        for (name, child) in &node.literals {
            if child.has_terminal() {
                keys.push(name.clone());
            }
            if child.has_children() {
                keys.push(name.clone());
            }
        }
        for child in &node.dynamics {
            if child.node.has_terminal() {
                keys.push(segment_key(&child.name, child.ty));
            }
            if child.node.has_children() {
                keys.push(segment_key(&child.name, child.ty));
            }
        }
        keys.sort();
        keys
    }
}

fn segment_key(name: &str, ty: SegmentType) -> String {
    format!("<{name}:{}>", ty.as_str())
}

fn descend<'n>(node: &'n mut Node, segments: &[Segment]) -> Option<&'n mut Node> {
    match segments.split_first() {
        None => Some(node),
        Some((Segment::Literal(lit), rest)) => {
            node.literals.get_mut(lit).and_then(|n| descend(n, rest))
        }
        Some((Segment::Capture { name, ty }, rest)) => node
            .dynamics
            .iter_mut()
            .find(|child| child.name == *name && child.ty == *ty)
            .map(|child| &mut child.node)
            .and_then(|n| descend(n, rest)),
    }
}

fn walk<'t>(
    node: &'t Node,
    parts: &[&str],
    trailing: bool,
    method: &Method,
    captures: &mut Vec<(String, String)>,
    mismatch: &mut Option<Vec<Method>>,
) -> Option<(&'t Arc<Endpoint>, u64)> {
    let Some((head, rest)) = parts.split_first() else {
        let bucket = node.bucket(trailing);
        if let Some(terminal) = bucket.iter().find(|terminal| terminal.verb == *method) {
            return Some((&terminal.endpoint, terminal.seq));
        }
        if !bucket.is_empty() && mismatch.is_none() {
            let mut allow: Vec<Method> =
                bucket.iter().map(|terminal| terminal.verb.clone()).collect();
            allow.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            allow.dedup();
            *mismatch = Some(allow);
        }
        return None;
    };

    if let Some(child) = node.literals.get(*head) {
        if let Some(hit) = walk(child, rest, trailing, method, captures, mismatch) {
            return Some(hit);
        }
    }
    for child in &node.dynamics {
        if child.ty.validate(head) {
            captures.push((child.name.clone(), head.to_string()));
            if let Some(hit) = walk(&child.node, rest, trailing, method, captures, mismatch) {
                return Some(hit);
            }
            captures.pop();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use aqueduct_core::handler::{Handler, HandlerSpec};
    use serde_json::Value;

    use super::*;

    fn endpoint(verbs: Vec<Method>, path: &str, tag: &str) -> Arc<Endpoint> {
        let tag = tag.to_string();
        Arc::new(Endpoint::new(
            verbs,
            Pattern::compile(path).unwrap(),
            Handler::direct(HandlerSpec::new(Vec::<String>::new(), move |_r, _s, _a| {
                Ok(Value::String(tag.clone()))
            })),
            None,
            None,
            BTreeMap::new(),
        ))
    }

    fn hit_tag(tree: &RouteTree, method: Method, path: &str) -> Option<String> {
        match tree.lookup(&method, path) {
            Lookup::Hit { endpoint, .. } => Some(endpoint.pattern().raw().to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_literal_beats_dynamic() {
        let mut tree = RouteTree::new();
        tree.insert(endpoint(vec![Method::GET], "/users/<id>", "dynamic"), 0);
        tree.insert(endpoint(vec![Method::GET], "/users/me", "literal"), 1);

        assert_eq!(hit_tag(&tree, Method::GET, "/users/me").unwrap(), "/users/me");
        assert_eq!(
            hit_tag(&tree, Method::GET, "/users/you").unwrap(),
            "/users/<id>"
        );
    }

    #[test]
    fn test_type_specificity_order() {
        let mut tree = RouteTree::new();
        tree.insert(endpoint(vec![Method::GET], "/v/<s:string>", "s"), 0);
        tree.insert(endpoint(vec![Method::GET], "/v/<b:bool>", "b"), 1);
        tree.insert(endpoint(vec![Method::GET], "/v/<n:int>", "n"), 2);

        assert_eq!(hit_tag(&tree, Method::GET, "/v/42").unwrap(), "/v/<n:int>");
        assert_eq!(hit_tag(&tree, Method::GET, "/v/yes").unwrap(), "/v/<b:bool>");
        assert_eq!(
            hit_tag(&tree, Method::GET, "/v/plain").unwrap(),
            "/v/<s:string>"
        );
    }

    #[test]
    fn test_registration_order_breaks_type_ties() {
        let mut tree = RouteTree::new();
        tree.insert(endpoint(vec![Method::GET], "/t/<first:int>", "first"), 0);
        tree.insert(endpoint(vec![Method::GET], "/t/<second:int>", "second"), 1);

        assert_eq!(
            hit_tag(&tree, Method::GET, "/t/7").unwrap(),
            "/t/<first:int>"
        );
    }

    #[test]
    fn test_backtracks_out_of_literal_subtree() {
        let mut tree = RouteTree::new();
        tree.insert(endpoint(vec![Method::GET], "/a/b/deep", "literal"), 0);
        tree.insert(endpoint(vec![Method::GET], "/a/<x>/other", "dynamic"), 1);

        assert_eq!(
            hit_tag(&tree, Method::GET, "/a/b/other").unwrap(),
            "/a/<x>/other"
        );
    }

    #[test]
    fn test_verb_multimap_reachability() {
        let mut tree = RouteTree::new();
        tree.insert(endpoint(vec![Method::GET], "/x", "get"), 0);
        tree.insert(endpoint(vec![Method::POST], "/x", "post"), 1);

        assert!(matches!(tree.lookup(&Method::GET, "/x"), Lookup::Hit { .. }));
        assert!(matches!(tree.lookup(&Method::POST, "/x"), Lookup::Hit { .. }));
        match tree.lookup(&Method::DELETE, "/x") {
            Lookup::VerbMismatch { allow } => {
                assert_eq!(allow, vec![Method::GET, Method::POST]);
            }
            _ => panic!("expected verb mismatch"),
        }
    }

    #[test]
    fn test_one_endpoint_under_multiple_verbs() {
        let mut tree = RouteTree::new();
        tree.insert(endpoint(vec![Method::GET, Method::POST], "/multi", "m"), 0);
        assert!(matches!(
            tree.lookup(&Method::GET, "/multi"),
            Lookup::Hit { .. }
        ));
        assert!(matches!(
            tree.lookup(&Method::POST, "/multi"),
            Lookup::Hit { .. }
        ));
    }

    #[test]
    fn test_typed_validation_failure_is_miss() {
        let mut tree = RouteTree::new();
        tree.insert(endpoint(vec![Method::GET], "/n/<id:int>", "n"), 0);
        assert!(matches!(tree.lookup(&Method::GET, "/n/abc"), Lookup::Miss));
    }

    #[test]
    fn test_trailing_slash_terminals_are_distinct() {
        let mut tree = RouteTree::new();
        tree.insert(endpoint(vec![Method::GET], "/t/", "slashed"), 0);
        assert!(tree.would_hit(&Method::GET, "/t/"));
        assert!(!tree.would_hit(&Method::GET, "/t"));
    }

    #[test]
    fn test_remove_is_silent_when_absent() {
        let mut tree = RouteTree::new();
        tree.insert(endpoint(vec![Method::GET], "/gone", "g"), 0);
        tree.remove(&Method::GET, "/gone");
        assert!(matches!(tree.lookup(&Method::GET, "/gone"), Lookup::Miss));
        tree.remove(&Method::GET, "/gone");
        tree.remove(&Method::GET, "/never-there");
    }

    #[test]
    fn test_keys_at_counts_terminal_and_subtree() {
        let mut tree = RouteTree::new();
        tree.insert(endpoint(vec![Method::GET], "/a", "a"), 0);
        tree.insert(endpoint(vec![Method::GET], "/a/b/c/f", "abcf"), 1);
        tree.insert(endpoint(vec![Method::POST], "/a/b/c/f", "abcf2"), 2);
        tree.insert(endpoint(vec![Method::GET], "/v/b/c/a", "v1"), 3);
        tree.insert(endpoint(vec![Method::GET], "/v/b/c/b", "v2"), 4);
        tree.insert(endpoint(vec![Method::GET], "/v/b/c/f", "v3"), 5);

        assert_eq!(tree.keys_at("/"), vec!["a", "a", "v"]);
        assert_eq!(tree.keys_at("/v/b/c"), vec!["a", "b", "f"]);
    }
}
