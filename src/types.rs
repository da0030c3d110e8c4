use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::condition::Condition;

/// The four actions a policy can govern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Action::Read),
            "create" => Some(Action::Create),
            "update" => Some(Action::Update),
            "delete" => Some(Action::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A policy-side attribute reference: `$name`. The leading `$` marks the
/// identifier as a lookup into an entity's attributes; the resolved name is
/// the part after it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DynamicKey {
    name: String,
}

impl DynamicKey {
    /// Parse `$name` (a `$` followed by at least one character).
    pub fn parse(s: &str) -> Option<Self> {
        let name = s.strip_prefix('$')?;
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
        })
    }

    /// The attribute name this key resolves to, without the `$`.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for DynamicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}", self.name)
    }
}

/// A single attribute value. Numbers share one `f64` carrier; arrays are
/// homogeneous and arrays of booleans are not representable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Str(String),
    Num(f64),
    Bool(bool),
    StrList(Vec<String>),
    NumList(Vec<f64>),
}

impl AttributeValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Str(_) => "string",
            AttributeValue::Num(_) => "number",
            AttributeValue::Bool(_) => "bool",
            AttributeValue::StrList(_) => "array<string>",
            AttributeValue::NumList(_) => "array<number>",
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self,
            AttributeValue::StrList(_) | AttributeValue::NumList(_)
        )
    }
}

/// Attribute name -> value. Keys are unique; insertion order carries no
/// meaning.
pub type Attributes = HashMap<String, AttributeValue>;

/// An entity in an authorization query. The subject is itself a `Resource`
/// whose `resource_type` names a user-kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub attributes: Attributes,
}

/// A validated policy. An absent `conditions` means an unconditional grant
/// for the `(resource, action)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub action: Action,
    pub resource: String,
    pub conditions: Option<Condition>,
}

impl Policy {
    /// The index key this policy is stored under.
    pub fn key(&self) -> String {
        policy_key(&self.resource, self.action)
    }
}

/// `"<type>:<action>"`, the policy index key.
pub fn policy_key(resource_type: &str, action: Action) -> String {
    format!("{resource_type}:{action}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parse_roundtrip() {
        for s in ["read", "create", "update", "delete"] {
            let action = Action::parse(s).unwrap();
            assert_eq!(action.as_str(), s);
            assert_eq!(action.to_string(), s);
        }
        assert!(Action::parse("Read").is_none());
        assert!(Action::parse("list").is_none());
    }

    #[test]
    fn test_dynamic_key_parse() {
        let key = DynamicKey::parse("$ownerId").unwrap();
        assert_eq!(key.name(), "ownerId");
        assert_eq!(key.to_string(), "$ownerId");

        assert!(DynamicKey::parse("ownerId").is_none());
        assert!(DynamicKey::parse("$").is_none());
        assert!(DynamicKey::parse("").is_none());

        // Anything after the `$` counts, including another `$`.
        assert_eq!(DynamicKey::parse("$$x").unwrap().name(), "$x");
    }

    #[test]
    fn test_policy_key_format() {
        assert_eq!(policy_key("file", Action::Read), "file:read");
        assert_eq!(policy_key("todo", Action::Update), "todo:update");
    }

    #[test]
    fn test_attribute_value_type_names() {
        assert_eq!(AttributeValue::Str("x".into()).type_name(), "string");
        assert_eq!(AttributeValue::Num(1.0).type_name(), "number");
        assert_eq!(AttributeValue::Bool(true).type_name(), "bool");
        assert_eq!(
            AttributeValue::StrList(vec!["a".into()]).type_name(),
            "array<string>"
        );
        assert_eq!(AttributeValue::NumList(vec![1.0]).type_name(), "array<number>");
        assert!(AttributeValue::StrList(vec![]).is_array());
        assert!(!AttributeValue::Bool(false).is_array());
    }
}
