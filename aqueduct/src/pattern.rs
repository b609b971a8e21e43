//! Path patterns with typed dynamic segments.
//!
//! A pattern such as `/users/<id:int>/posts/<slug>` compiles into an ordered
//! segment list where each segment is either a literal or a named capture
//! with an optional type tag. Matching validates typed captures before
//! succeeding; a failed validation is a miss, not an error.
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("malformed pattern `{pattern}`: {reason}")]
    Malformed { pattern: String, reason: String },
    #[error("unknown type tag `{tag}` in pattern `{pattern}`")]
    UnknownTypeTag { pattern: String, tag: String },
}

/// Type tag of a dynamic segment.
///
/// Variant order is match-preference order: when several dynamic children
/// could accept a segment, the more specific tag wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SegmentType {
    Int,
    Double,
    Bool,
    Str,
}

impl SegmentType {
    /// Parses a type tag. `logical` and `numeric` are accepted aliases for
    /// `bool` and `double`.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "int" => Some(SegmentType::Int),
            "double" | "numeric" => Some(SegmentType::Double),
            "bool" | "logical" => Some(SegmentType::Bool),
            "string" => Some(SegmentType::Str),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentType::Int => "int",
            SegmentType::Double => "double",
            SegmentType::Bool => "bool",
            SegmentType::Str => "string",
        }
    }

    /// Whether a raw path segment is acceptable under this tag.
    pub fn validate(&self, raw: &str) -> bool {
        match self {
            SegmentType::Int => raw.parse::<i64>().is_ok(),
            SegmentType::Double => {
                !raw.is_empty()
                    && raw
                        .bytes()
                        .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
                    && raw.parse::<f64>().is_ok()
            }
            SegmentType::Bool => matches!(
                raw.to_ascii_lowercase().as_str(),
                "true" | "false" | "0" | "1" | "yes" | "no"
            ),
            SegmentType::Str => !raw.is_empty(),
        }
    }

    /// Coerces a validated raw segment into a typed value.
    pub fn coerce(&self, raw: &str) -> Value {
        match self {
            SegmentType::Int => raw.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            SegmentType::Double => raw.parse::<f64>().map(Value::from).unwrap_or(Value::Null),
            SegmentType::Bool => Value::Bool(matches!(
                raw.to_ascii_lowercase().as_str(),
                "true" | "1" | "yes"
            )),
            SegmentType::Str => Value::String(raw.to_string()),
        }
    }
}

/// One pattern segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Capture { name: String, ty: SegmentType },
}

impl Segment {
    /// The segment as it would appear in a pattern string.
    pub fn display_key(&self) -> String {
        match self {
            Segment::Literal(lit) => lit.clone(),
            Segment::Capture { name, ty } => format!("<{name}:{}>", ty.as_str()),
        }
    }
}

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
    trailing_slash: bool,
}

impl Pattern {
    /// Compiles a pattern string. A missing leading `/` is prepended; the
    /// empty pattern equals `/`.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let raw = normalize(pattern);
        let trailing_slash = raw.len() > 1 && raw.ends_with('/');
        let mut segments = Vec::new();
        for part in raw.split('/').filter(|part| !part.is_empty()) {
            segments.push(parse_segment(&raw, part)?);
        }
        Ok(Pattern {
            raw,
            segments,
            trailing_slash,
        })
    }

    /// The normalized pattern string.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn has_trailing_slash(&self) -> bool {
        self.trailing_slash
    }

    /// Ordered capture descriptors.
    pub fn captures(&self) -> Vec<(&str, SegmentType)> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Capture { name, ty } => Some((name.as_str(), *ty)),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Looks up the type tag of a named capture.
    pub fn capture_type(&self, name: &str) -> Option<SegmentType> {
        self.captures()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, ty)| ty)
    }

    /// Attempts a full match, returning the raw capture values.
    pub fn match_full(&self, path: &str) -> Option<Vec<(String, String)>> {
        let (parts, trailing) = split_path(path);
        if trailing != self.trailing_slash || parts.len() != self.segments.len() {
            return None;
        }
        self.match_parts(&parts)
    }

    /// Attempts a prefix match, returning the captures and the unconsumed
    /// suffix (`/` when the path is fully consumed).
    pub fn match_prefix(&self, path: &str) -> Option<(Vec<(String, String)>, String)> {
        let (parts, trailing) = split_path(path);
        if parts.len() < self.segments.len() {
            return None;
        }
        let captures = self.match_parts(&parts[..self.segments.len()])?;
        let rest = &parts[self.segments.len()..];
        let suffix = if rest.is_empty() {
            "/".to_string()
        } else {
            let mut suffix = String::new();
            for part in rest {
                suffix.push('/');
                suffix.push_str(part);
            }
            if trailing {
                suffix.push('/');
            }
            suffix
        };
        Some((captures, suffix))
    }

    fn match_parts(&self, parts: &[&str]) -> Option<Vec<(String, String)>> {
        let mut captures = Vec::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(lit) => {
                    if lit != part {
                        return None;
                    }
                }
                Segment::Capture { name, ty } => {
                    if !ty.validate(part) {
                        return None;
                    }
                    captures.push((name.clone(), part.to_string()));
                }
            }
        }
        Some(captures)
    }
}

/// Normalizes a path: prepends a missing leading `/`, maps empty to `/`.
pub fn normalize(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Splits a path into segments plus a trailing-slash flag.
pub fn split_path(path: &str) -> (Vec<&str>, bool) {
    let trailing = path.len() > 1 && path.ends_with('/');
    let parts = path.split('/').filter(|part| !part.is_empty()).collect();
    (parts, trailing)
}

fn parse_segment(pattern: &str, part: &str) -> Result<Segment, PatternError> {
    let malformed = |reason: &str| PatternError::Malformed {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };
    if let Some(inner) = part.strip_prefix('<') {
        let Some(inner) = inner.strip_suffix('>') else {
            return Err(malformed("unbalanced `<`"));
        };
        if inner.contains(['<', '>']) {
            return Err(malformed("nested capture delimiter"));
        }
        let (name, ty) = match inner.split_once(':') {
            Some((name, tag)) => {
                let ty = SegmentType::parse(tag).ok_or_else(|| PatternError::UnknownTypeTag {
                    pattern: pattern.to_string(),
                    tag: tag.to_string(),
                })?;
                (name, ty)
            }
            None => (inner, SegmentType::Str),
        };
        if name.is_empty() {
            return Err(malformed("empty capture name"));
        }
        Ok(Segment::Capture {
            name: name.to_string(),
            ty,
        })
    } else if part.contains(['<', '>']) {
        Err(malformed("capture delimiter inside literal segment"))
    } else {
        Ok(Segment::Literal(part.to_string()))
    }
}
