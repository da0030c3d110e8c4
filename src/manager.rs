//! The policy store: registration-time validation and the
//! `resource_type:action` index.

use std::collections::HashMap;

use serde_json::Value;

use crate::errors::AuthzError;
use crate::policy::{parse_policy, parse_resource};
use crate::types::{Policy, Resource};

/// Validates policy and resource documents against a fixed universe of
/// resource types and keeps accepted policies indexed by
/// `resource_type:action`. The index is append-only; hand it to an
/// [`AuthEngine`](crate::AuthEngine) once all mutation is done.
#[derive(Debug)]
pub struct PolicyManager {
    universe: Vec<String>,
    index: HashMap<String, Vec<Policy>>,
}

impl PolicyManager {
    /// Build a manager over a non-empty universe of distinct type names.
    pub fn new<I, S>(universe: I) -> Result<Self, AuthzError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let universe: Vec<String> = universe.into_iter().map(Into::into).collect();
        if universe.is_empty() {
            return Err(AuthzError::schema(
                "universe",
                "at least one resource type is required",
            ));
        }
        for (i, name) in universe.iter().enumerate() {
            if universe[..i].contains(name) {
                return Err(AuthzError::schema(
                    "universe",
                    format!("duplicate resource type `{name}`"),
                ));
            }
        }
        Ok(Self {
            universe,
            index: HashMap::new(),
        })
    }

    pub fn universe(&self) -> &[String] {
        &self.universe
    }

    /// Validate one policy document and append it under its key. On
    /// failure the index is left untouched.
    pub fn add_policy(&mut self, document: &Value) -> Result<(), AuthzError> {
        let policy = parse_policy(document, &self.universe)?;
        self.index.entry(policy.key()).or_default().push(policy);
        Ok(())
    }

    /// Sequential [`add_policy`](Self::add_policy): stops at the first
    /// failing document, keeping everything added before it. Callers who
    /// need all-or-nothing semantics must stage into a fresh manager.
    pub fn add_policies(&mut self, documents: &[Value]) -> Result<(), AuthzError> {
        for document in documents {
            self.add_policy(document)?;
        }
        Ok(())
    }

    /// The policy index, keyed by `resource_type:action`. Lists preserve
    /// insertion order.
    pub fn get_policies(&self) -> &HashMap<String, Vec<Policy>> {
        &self.index
    }

    /// Mint a validated resource instance from a resource document.
    pub fn create_resource(&self, document: &Value) -> Result<Resource, AuthzError> {
        parse_resource(document, &self.universe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_rejects_empty_universe() {
        let err = PolicyManager::new(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, AuthzError::Schema { .. }));
    }

    #[test]
    fn test_new_rejects_duplicate_types() {
        let err = PolicyManager::new(["user", "file", "user"]).unwrap_err();
        match err {
            AuthzError::Schema { reason, .. } => assert!(reason.contains("user")),
            other => panic!("expected Schema, got {other:?}"),
        }
    }

    #[test]
    fn test_add_policy_indexes_by_key() {
        let mut manager = PolicyManager::new(["user", "file"]).unwrap();
        manager
            .add_policy(&json!({"action": "read", "resource": "file"}))
            .unwrap();
        manager
            .add_policy(&json!({"action": "update", "resource": "file"}))
            .unwrap();
        manager
            .add_policy(&json!({
                "action": "read",
                "resource": "file",
                "conditions": {"op": "eq", "attributeKey": "$role", "referenceValue": "admin"}
            }))
            .unwrap();

        let index = manager.get_policies();
        assert_eq!(index.len(), 2);
        let reads = &index["file:read"];
        assert_eq!(reads.len(), 2);
        // Insertion order is preserved within a key.
        assert!(reads[0].conditions.is_none());
        assert!(reads[1].conditions.is_some());
    }

    #[test]
    fn test_add_policy_failure_leaves_index_unchanged() {
        let mut manager = PolicyManager::new(["user", "file"]).unwrap();
        manager
            .add_policy(&json!({"action": "read", "resource": "file"}))
            .unwrap();

        let err = manager.add_policy(&json!({"action": "read", "resource": "invoice"}));
        assert!(err.is_err());
        assert_eq!(manager.get_policies().len(), 1);
        assert_eq!(manager.get_policies()["file:read"].len(), 1);
    }

    #[test]
    fn test_add_policies_keeps_earlier_on_failure() {
        let mut manager = PolicyManager::new(["user", "file"]).unwrap();
        let documents = vec![
            json!({"action": "read", "resource": "file"}),
            json!({"action": "write", "resource": "file"}),
            json!({"action": "delete", "resource": "file"}),
        ];
        assert!(manager.add_policies(&documents).is_err());

        let index = manager.get_policies();
        assert_eq!(index.len(), 1);
        assert!(index.contains_key("file:read"));
        assert!(!index.contains_key("file:delete"));
    }

    #[test]
    fn test_validation_is_repeatable() {
        let mut manager = PolicyManager::new(["user", "file"]).unwrap();
        let bad = json!({"action": "read", "resource": "file", "extra": 1});
        for _ in 0..2 {
            assert!(matches!(
                manager.add_policy(&bad).unwrap_err(),
                AuthzError::Schema { .. }
            ));
        }
        let good = json!({"action": "read", "resource": "file"});
        for _ in 0..2 {
            assert!(manager.add_policy(&good).is_ok());
        }
        assert_eq!(manager.get_policies()["file:read"].len(), 2);
    }

    #[test]
    fn test_create_resource_checks_universe() {
        let manager = PolicyManager::new(["user", "file"]).unwrap();
        let ok = manager.create_resource(&json!({
            "id": "u1",
            "type": "user",
            "attributes": {"role": "admin"}
        }));
        assert!(ok.is_ok());

        let err = manager.create_resource(&json!({"id": "i1", "type": "invoice"}));
        assert!(matches!(err.unwrap_err(), AuthzError::Schema { .. }));
    }
}
