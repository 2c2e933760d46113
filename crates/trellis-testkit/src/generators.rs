//! Proptest generators for property-based testing.

use proptest::prelude::*;

use trellis_core::{ContextSet, GroupName, Node, UserId};

/// Generate a random user id.
pub fn user_id() -> impl Strategy<Value = UserId> {
    any::<[u8; 16]>().prop_map(UserId::from_bytes)
}

/// Generate a valid group name.
pub fn group_name() -> impl Strategy<Value = GroupName> {
    "[a-z][a-z0-9-]{1,11}".prop_map(|s| GroupName::new(s).unwrap())
}

/// Generate a dotted permission key with 1 to 4 segments.
pub fn permission_key() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z]{2,8}", 1..=4).prop_map(|segments| segments.join("."))
}

/// Generate a context key/value pair from a small vocabulary, so generated
/// sets collide often enough to exercise matching.
pub fn context_pair() -> impl Strategy<Value = (String, String)> {
    (
        prop::sample::select(vec!["server", "world", "region", "mode"]),
        "[a-z]{2,8}",
    )
        .prop_map(|(key, value)| (key.to_string(), value))
}

/// Generate a context set with up to `max` pairs.
pub fn context_set(max: usize) -> impl Strategy<Value = ContextSet> {
    prop::collection::vec(context_pair(), 0..=max)
        .prop_map(|pairs| pairs.into_iter().collect())
}

/// Generate a reasonable expiry timestamp.
pub fn expiry() -> impl Strategy<Value = i64> {
    1i64..=2_000_000_000_000i64
}

/// Generate an arbitrary permission node.
pub fn node() -> impl Strategy<Value = Node> {
    (
        permission_key(),
        any::<bool>(),
        proptest::option::of(expiry()),
        prop::collection::vec(context_pair(), 0..=2),
    )
        .prop_map(|(key, value, expiry, contexts)| {
            let mut builder = Node::builder(key).value(value);
            if let Some(at) = expiry {
                builder = builder.expiry(at);
            }
            for (k, v) in contexts {
                builder = builder.context(k, v);
            }
            builder.build()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_generated_nodes_are_well_formed(node in node()) {
            prop_assert!(!node.key().is_empty());
            // Permanent nodes never expire; temporary ones eventually do.
            match node.expiry() {
                None => prop_assert!(!node.is_expired(i64::MAX)),
                Some(at) => prop_assert!(node.is_expired(at + 1)),
            }
        }

        #[test]
        fn test_context_set_matches_itself(set in context_set(3)) {
            // A node restricted to exactly the active contexts always applies.
            let restrictions: std::collections::BTreeMap<String, String> = set
                .iter()
                .filter_map(|(k, values)| {
                    values.iter().next().map(|v| (k.to_string(), v.clone()))
                })
                .collect();
            prop_assert!(set.satisfies(&restrictions));
        }
    }
}
