//! Scope pattern parsing: `"<prefix>:{var}(:<suffix>{var2})*"`.

/// One segment of a parsed pattern: either a literal token or a variable
/// placeholder.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var(String),
}

/// A parsed scope pattern, e.g. `"project:{project_id}"` or
/// `"org:{org_id}:project:{project_id}"`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParsePatternError {
    #[error("scope pattern {0:?} has an unterminated variable placeholder")]
    UnterminatedVar(String),
    #[error("scope pattern {0:?} declares no variables")]
    NoVariables(String),
    #[error("scope pattern {0:?} is empty")]
    Empty(String),
}

impl Pattern {
    /// Parse a pattern string, splitting on `:` while treating `{...}` as an
    /// atomic variable token.
    pub fn parse(raw: &str) -> Result<Self, ParsePatternError> {
        if raw.is_empty() {
            return Err(ParsePatternError::Empty(raw.to_string()));
        }

        let mut segments = Vec::new();
        for token in raw.split(':') {
            if let Some(stripped) = token.strip_prefix('{') {
                let var = stripped
                    .strip_suffix('}')
                    .ok_or_else(|| ParsePatternError::UnterminatedVar(raw.to_string()))?;
                segments.push(Segment::Var(var.to_string()));
            } else {
                segments.push(Segment::Literal(token.to_string()));
            }
        }

        if !segments.iter().any(|s| matches!(s, Segment::Var(_))) {
            return Err(ParsePatternError::NoVariables(raw.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The original pattern string.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Variable names in declaration order.
    pub fn vars(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Var(v) => Some(v.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Substitute each variable for its value from `values`, returning
    /// `None` if any required variable is missing.
    pub(crate) fn substitute(&self, values: &std::collections::BTreeMap<String, String>) -> Option<String> {
        let mut out = Vec::with_capacity(self.segments.len());
        for seg in &self.segments {
            match seg {
                Segment::Literal(l) => out.push(l.clone()),
                Segment::Var(v) => out.push(values.get(v)?.clone()),
            }
        }
        Some(out.join(":"))
    }
}
