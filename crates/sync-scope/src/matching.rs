//! `matchesAny`: does a change's stored scopes satisfy a subscription's
//! scope constraints (spec §4.2)?

use std::collections::BTreeMap;

use sync_wire::ScopeValue;

/// True iff, for every variable the subscription constrains, the change's
/// stored single value for that variable is a member of the subscription's
/// admitted set. A variable the subscription doesn't mention at all is
/// treated as unconstrained (wildcard).
pub fn matches_any(
    stored: &BTreeMap<String, String>,
    subscription_scopes: &BTreeMap<String, ScopeValue>,
) -> bool {
    for (var, admitted) in subscription_scopes {
        match stored.get(var) {
            // The change has no value for a variable the subscription
            // constrains: it cannot satisfy that constraint.
            None => return false,
            Some(value) => {
                if !admitted.values().iter().any(|v| v == value) {
                    return false;
                }
            }
        }
    }
    true
}
