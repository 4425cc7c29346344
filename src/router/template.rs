//! Path template parsing
//!
//! A template is a `/`-separated path whose segments are either literals or
//! whole-segment placeholders such as `{name}`. Templates use the same
//! placeholder syntax as axum, so a validated template can be handed to the
//! axum router unchanged.

use crate::error::{AppError, AppResult};
use percent_encoding::percent_decode_str;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A validated route path template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parse and validate a template
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidRouteTemplate`] if the template does not start
    /// with `/`, contains a partial-segment or wildcard placeholder, an empty or
    /// non-identifier placeholder name, a `:name` style capture, or the same
    /// placeholder twice.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let invalid = |reason: &str| AppError::InvalidRouteTemplate {
            template: raw.to_string(),
            reason: reason.to_string(),
        };

        let Some(rest) = raw.strip_prefix('/') else {
            return Err(invalid("must start with '/'"));
        };

        let mut segments = Vec::new();
        if !rest.is_empty() {
            for part in rest.split('/') {
                segments.push(Self::parse_segment(part).map_err(|reason| invalid(&reason))?);
            }
        }

        let mut seen = Vec::new();
        for segment in &segments {
            if let Segment::Param(name) = segment {
                if seen.contains(&name) {
                    return Err(invalid(&format!("placeholder '{{{}}}' is repeated", name)));
                }
                seen.push(name);
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    fn parse_segment(part: &str) -> Result<Segment, String> {
        if part.is_empty() {
            return Err("empty path segment".to_string());
        }

        if let Some(inner) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            if inner.starts_with('*') {
                return Err("wildcard placeholders are not supported".to_string());
            }
            if inner.is_empty() || !inner.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(format!("invalid placeholder name '{}'", inner));
            }
            return Ok(Segment::Param(inner.to_string()));
        }

        // axum 0.8 refuses the 0.7 `:name` capture syntax at route insertion
        if part.starts_with(':') {
            return Err(format!(
                "segment '{}' uses ':' capture syntax, write '{{{}}}' instead",
                part,
                &part[1..]
            ));
        }

        if part.contains(['{', '}', '*']) {
            return Err(format!(
                "segment '{}' mixes a placeholder with literal text",
                part
            ));
        }
        Ok(Segment::Literal(part.to_string()))
    }

    /// The template as written, e.g. `/greeting/{name}`
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the template binds any placeholders
    pub fn is_templated(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Param(_)))
    }

    /// Placeholder names in path order
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Bind placeholder values from a request path this template matched
    ///
    /// Values are percent-decoded; bytes that are not valid UTF-8 become
    /// U+FFFD instead of rejecting the request. Placeholders without a
    /// corresponding path segment are left unbound.
    pub fn bind(&self, path: &str) -> HashMap<String, String> {
        let parts = path.strip_prefix('/').unwrap_or(path).split('/');
        self.segments
            .iter()
            .zip(parts)
            .filter_map(|(segment, raw)| match segment {
                Segment::Param(name) => Some((
                    name.clone(),
                    percent_decode_str(raw).decode_utf8_lossy().into_owned(),
                )),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// The template with placeholder names erased
    ///
    /// `/greeting/{name}` and `/greeting/{who}` share the shape `/greeting/{}`
    /// and would match exactly the same requests.
    pub fn shape(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(lit) => format!("/{}", lit),
                Segment::Param(_) => "/{}".to_string(),
            })
            .collect()
    }
}

impl std::fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}
