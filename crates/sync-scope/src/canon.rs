//! Canonical scope key derivation.

use std::collections::BTreeMap;

use sync_wire::ScopeValue;

use crate::pattern::Pattern;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CanonError {
    #[error("scope value for variable {0:?} is missing")]
    MissingVar(String),
}

/// Produce a single deterministic key for `(partition, pattern, value tuple)`.
/// `values` must supply every variable in `pattern`.
pub fn canonicalize_scope_key(
    partition: &str,
    pattern: &Pattern,
    values: &BTreeMap<String, String>,
) -> Result<String, CanonError> {
    let substituted = pattern
        .substitute(values)
        .ok_or_else(|| CanonError::MissingVar(missing_var(pattern, values)))?;
    Ok(format!("{partition}::{substituted}"))
}

fn missing_var(pattern: &Pattern, values: &BTreeMap<String, String>) -> String {
    pattern
        .vars()
        .into_iter()
        .find(|v| !values.contains_key(*v))
        .unwrap_or("?")
        .to_string()
}

/// Produce the Cartesian product of keys across multi-valued subscription
/// scopes (spec §4.2). A variable absent from `scopes` is an error: callers
/// must resolve every pattern variable (possibly to a single wildcard-free
/// value) before calling this.
pub fn expand_scope_keys(
    partition: &str,
    pattern: &Pattern,
    scopes: &BTreeMap<String, ScopeValue>,
) -> Result<Vec<String>, CanonError> {
    let vars = pattern.vars();
    let mut combos: Vec<BTreeMap<String, String>> = vec![BTreeMap::new()];

    for var in vars {
        let admitted = scopes
            .get(var)
            .ok_or_else(|| CanonError::MissingVar(var.to_string()))?
            .values();
        let mut next = Vec::with_capacity(combos.len() * admitted.len());
        for combo in &combos {
            for value in &admitted {
                let mut extended = combo.clone();
                extended.insert(var.to_string(), value.to_string());
                next.push(extended);
            }
        }
        combos = next;
    }

    combos
        .into_iter()
        .map(|values| canonicalize_scope_key(partition, pattern, &values))
        .collect()
}
