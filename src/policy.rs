//! Validation of policy and resource documents.
//!
//! Documents arrive as `serde_json::Value` and are checked strictly: every
//! required field must be present, every present field must be known, and
//! every value must have the shape its position demands. Failures carry the
//! offending document path.

use serde_json::{Map, Value};

use crate::condition::parse_condition;
use crate::errors::AuthzError;
use crate::types::{Action, AttributeValue, Attributes, Policy, Resource};

/// Validate a policy document against the resource-type universe.
pub fn parse_policy(doc: &Value, universe: &[String]) -> Result<Policy, AuthzError> {
    let map = doc
        .as_object()
        .ok_or_else(|| AuthzError::schema("policy", "expected an object"))?;
    check_fields(map, &["action", "resource", "conditions"])?;

    let action_raw = require_str(map, "action")?;
    let action = Action::parse(action_raw).ok_or_else(|| {
        AuthzError::schema(
            "action",
            format!("unknown action `{action_raw}` (expected read, create, update, or delete)"),
        )
    })?;

    let resource = require_str(map, "resource")?.to_string();
    if !universe.contains(&resource) {
        return Err(AuthzError::schema(
            "resource",
            format!("`{resource}` is not a registered resource type"),
        ));
    }

    let conditions = match map.get("conditions") {
        None => None,
        Some(child) => Some(parse_condition(child, "conditions")?),
    };

    Ok(Policy {
        action,
        resource,
        conditions,
    })
}

/// Validate a resource document against the resource-type universe.
pub fn parse_resource(doc: &Value, universe: &[String]) -> Result<Resource, AuthzError> {
    let map = doc
        .as_object()
        .ok_or_else(|| AuthzError::schema("resource", "expected an object"))?;
    check_fields(map, &["id", "type", "attributes"])?;

    let id = require_str(map, "id")?;
    if id.is_empty() {
        return Err(AuthzError::schema("id", "must be a non-empty string"));
    }

    let resource_type = require_str(map, "type")?.to_string();
    if !universe.contains(&resource_type) {
        return Err(AuthzError::schema(
            "type",
            format!("`{resource_type}` is not a registered resource type"),
        ));
    }

    let attributes = match map.get("attributes") {
        None => Attributes::new(),
        Some(value) => parse_attributes(value)?,
    };

    Ok(Resource {
        id: id.to_string(),
        resource_type,
        attributes,
    })
}

fn parse_attributes(value: &Value) -> Result<Attributes, AuthzError> {
    let map = value
        .as_object()
        .ok_or_else(|| AuthzError::schema("attributes", "expected an object"))?;
    let mut attributes = Attributes::new();
    for (name, raw) in map {
        if name.is_empty() {
            return Err(AuthzError::schema(
                "attributes",
                "attribute names must be non-empty",
            ));
        }
        let value = attribute_value(raw, &format!("attributes.{name}"))?;
        attributes.insert(name.clone(), value);
    }
    Ok(attributes)
}

/// Accepts a string, a finite number, a bool, or a homogeneous array of
/// strings or numbers. Arrays of booleans are rejected.
fn attribute_value(value: &Value, path: &str) -> Result<AttributeValue, AuthzError> {
    match value {
        Value::String(s) => Ok(AttributeValue::Str(s.clone())),
        Value::Number(n) => n
            .as_f64()
            .map(AttributeValue::Num)
            .ok_or_else(|| AuthzError::schema(path, "number is out of range")),
        Value::Bool(b) => Ok(AttributeValue::Bool(*b)),
        Value::Array(items) => parse_array_value(items, path),
        _ => Err(AuthzError::schema(
            path,
            "expected a string, number, bool, or array of strings or numbers",
        )),
    }
}

fn parse_array_value(items: &[Value], path: &str) -> Result<AttributeValue, AuthzError> {
    match items.first() {
        None => Ok(AttributeValue::StrList(Vec::new())),
        Some(Value::String(_)) => {
            let mut strings = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let s = item.as_str().ok_or_else(|| {
                    AuthzError::schema(
                        format!("{path}[{i}]"),
                        "arrays must be homogeneous; expected a string",
                    )
                })?;
                strings.push(s.to_string());
            }
            Ok(AttributeValue::StrList(strings))
        }
        Some(Value::Number(_)) => {
            let mut numbers = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let n = item.as_f64().ok_or_else(|| {
                    AuthzError::schema(
                        format!("{path}[{i}]"),
                        "arrays must be homogeneous; expected a number",
                    )
                })?;
                numbers.push(n);
            }
            Ok(AttributeValue::NumList(numbers))
        }
        Some(_) => Err(AuthzError::schema(
            format!("{path}[0]"),
            "arrays may contain only strings or only numbers",
        )),
    }
}

fn check_fields(map: &Map<String, Value>, allowed: &[&str]) -> Result<(), AuthzError> {
    for field in map.keys() {
        if !allowed.contains(&field.as_str()) {
            return Err(AuthzError::schema(field, "unknown field"));
        }
    }
    Ok(())
}

fn require_str<'a>(map: &'a Map<String, Value>, field: &str) -> Result<&'a str, AuthzError> {
    map.get(field)
        .ok_or_else(|| AuthzError::schema(field, "missing required field"))?
        .as_str()
        .ok_or_else(|| AuthzError::schema(field, "expected a string"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn universe() -> Vec<String> {
        vec!["user".to_string(), "file".to_string()]
    }

    #[test]
    fn test_parse_policy_unconditional() {
        let doc = json!({"action": "read", "resource": "file"});
        let policy = parse_policy(&doc, &universe()).unwrap();
        assert_eq!(policy.action, Action::Read);
        assert_eq!(policy.resource, "file");
        assert!(policy.conditions.is_none());
        assert_eq!(policy.key(), "file:read");
    }

    #[test]
    fn test_parse_policy_with_conditions() {
        let doc = json!({
            "action": "update",
            "resource": "file",
            "conditions": {"op": "eq", "subjectKey": "$id", "resourceKey": "$ownerId"}
        });
        let policy = parse_policy(&doc, &universe()).unwrap();
        assert!(policy.conditions.is_some());
    }

    #[test]
    fn test_parse_policy_unknown_action() {
        let doc = json!({"action": "list", "resource": "file"});
        let err = parse_policy(&doc, &universe()).unwrap_err();
        match err {
            AuthzError::Schema { path, .. } => assert_eq!(path, "action"),
            other => panic!("expected Schema, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_policy_resource_outside_universe() {
        let doc = json!({"action": "read", "resource": "invoice"});
        let err = parse_policy(&doc, &universe()).unwrap_err();
        match err {
            AuthzError::Schema { path, .. } => assert_eq!(path, "resource"),
            other => panic!("expected Schema, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_policy_rejects_extra_field() {
        let doc = json!({"action": "read", "resource": "file", "effect": "allow"});
        let err = parse_policy(&doc, &universe()).unwrap_err();
        match err {
            AuthzError::Schema { path, reason } => {
                assert_eq!(path, "effect");
                assert_eq!(reason, "unknown field");
            }
            other => panic!("expected Schema, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_policy_nested_condition_path() {
        let doc = json!({
            "action": "read",
            "resource": "file",
            "conditions": {"op": "and", "conditions": [
                {"op": "eq", "attributeKey": "$role", "referenceValue": []}
            ]}
        });
        let err = parse_policy(&doc, &universe()).unwrap_err();
        match err {
            AuthzError::Schema { path, .. } => {
                assert_eq!(path, "conditions.conditions[0].referenceValue")
            }
            other => panic!("expected Schema, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_resource_basic() {
        let doc = json!({
            "id": "f1",
            "type": "file",
            "attributes": {
                "name": "notes.txt",
                "size": 120,
                "shared": false,
                "tags": ["draft", "private"],
                "revisions": [1, 2, 3]
            }
        });
        let resource = parse_resource(&doc, &universe()).unwrap();
        assert_eq!(resource.id, "f1");
        assert_eq!(resource.resource_type, "file");
        assert_eq!(
            resource.attributes.get("size"),
            Some(&AttributeValue::Num(120.0))
        );
        assert_eq!(
            resource.attributes.get("tags"),
            Some(&AttributeValue::StrList(vec![
                "draft".into(),
                "private".into()
            ]))
        );
    }

    #[test]
    fn test_parse_resource_attributes_optional() {
        let doc = json!({"id": "f1", "type": "file"});
        let resource = parse_resource(&doc, &universe()).unwrap();
        assert!(resource.attributes.is_empty());
    }

    #[test]
    fn test_parse_resource_type_outside_universe() {
        let doc = json!({"id": "x", "type": "invoice", "attributes": {}});
        let err = parse_resource(&doc, &universe()).unwrap_err();
        match err {
            AuthzError::Schema { path, .. } => assert_eq!(path, "type"),
            other => panic!("expected Schema, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_resource_empty_id() {
        let doc = json!({"id": "", "type": "file"});
        assert!(matches!(
            parse_resource(&doc, &universe()).unwrap_err(),
            AuthzError::Schema { .. }
        ));
    }

    #[test]
    fn test_parse_resource_rejects_bool_array() {
        let doc = json!({"id": "f1", "type": "file", "attributes": {"flags": [true, false]}});
        let err = parse_resource(&doc, &universe()).unwrap_err();
        match err {
            AuthzError::Schema { path, .. } => assert_eq!(path, "attributes.flags[0]"),
            other => panic!("expected Schema, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_resource_rejects_mixed_array() {
        let doc = json!({"id": "f1", "type": "file", "attributes": {"tags": ["a", 1]}});
        let err = parse_resource(&doc, &universe()).unwrap_err();
        match err {
            AuthzError::Schema { path, .. } => assert_eq!(path, "attributes.tags[1]"),
            other => panic!("expected Schema, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_resource_empty_array_is_string_list() {
        let doc = json!({"id": "f1", "type": "file", "attributes": {"tags": []}});
        let resource = parse_resource(&doc, &universe()).unwrap();
        assert_eq!(
            resource.attributes.get("tags"),
            Some(&AttributeValue::StrList(vec![]))
        );
    }

    #[test]
    fn test_parse_resource_rejects_nested_object() {
        let doc = json!({"id": "f1", "type": "file", "attributes": {"owner": {"id": "u1"}}});
        let err = parse_resource(&doc, &universe()).unwrap_err();
        match err {
            AuthzError::Schema { path, .. } => assert_eq!(path, "attributes.owner"),
            other => panic!("expected Schema, got {other:?}"),
        }
    }
}
