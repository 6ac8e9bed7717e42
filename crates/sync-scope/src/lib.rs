//! sync-scope
//!
//! The Scope Engine (spec §4.2): parses `"key:{var}"` scope patterns,
//! canonicalizes subscription scope values into deterministic scope keys,
//! and matches a change's stored single-value scopes against a
//! subscription's (possibly multi-valued) scope set.
//!
//! Responsibilities:
//! - Pattern parsing + variable extraction
//! - Canonical key derivation (single value and Cartesian multi-value)
//! - Scope matching used by the pull pipeline's change filter

mod canon;
mod matching;
mod pattern;

pub use canon::{canonicalize_scope_key, expand_scope_keys};
pub use matching::matches_any;
pub use pattern::{ParsePatternError, Pattern};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use sync_wire::ScopeValue;

    #[test]
    fn extracts_vars_in_order() {
        let p = Pattern::parse("org:{org_id}:project:{project_id}").unwrap();
        assert_eq!(p.vars(), vec!["org_id", "project_id"]);
    }

    #[test]
    fn canonicalizes_single_value() {
        let p = Pattern::parse("user:{user_id}").unwrap();
        let mut values = BTreeMap::new();
        values.insert("user_id".to_string(), "u1".to_string());
        let key = canonicalize_scope_key("default", &p, &values).unwrap();
        assert_eq!(key, "default::user:u1");
    }

    #[test]
    fn expands_cartesian_product_for_multivalued_scopes() {
        let p = Pattern::parse("org:{org_id}:project:{project_id}").unwrap();
        let mut scopes = BTreeMap::new();
        scopes.insert(
            "org_id".to_string(),
            ScopeValue::One("acme".to_string()),
        );
        scopes.insert(
            "project_id".to_string(),
            ScopeValue::Many(vec!["p1".to_string(), "p2".to_string()]),
        );
        let mut keys = expand_scope_keys("default", &p, &scopes).unwrap();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "default::org:acme:project:p1".to_string(),
                "default::org:acme:project:p2".to_string(),
            ]
        );
    }

    #[test]
    fn matches_any_treats_unconstrained_vars_as_wildcard() {
        let mut stored = BTreeMap::new();
        stored.insert("user_id".to_string(), "u1".to_string());

        // subscription doesn't constrain user_id at all -> matches.
        let sub: BTreeMap<String, ScopeValue> = BTreeMap::new();
        assert!(matches_any(&stored, &sub));

        // subscription constrains to a disjoint set -> no match.
        let mut sub2 = BTreeMap::new();
        sub2.insert("user_id".to_string(), ScopeValue::One("u2".to_string()));
        assert!(!matches_any(&stored, &sub2));

        // subscription constrains to a set containing the stored value -> match.
        let mut sub3 = BTreeMap::new();
        sub3.insert(
            "user_id".to_string(),
            ScopeValue::Many(vec!["u1".to_string(), "u2".to_string()]),
        );
        assert!(matches_any(&stored, &sub3));
    }
}
