//! The condition language for policy documents: validation and evaluation.
//!
//! A condition document is a tagged JSON object, one of:
//! - Logical: `{op: and|or, conditions: [..]}` or `{op: not, conditions: {..}}`
//! - Attribute: `{op, attributeKey, referenceValue, compareSource?}`
//! - Entity-key: `{op, subjectKey, resourceKey}` for `eq..lte`, or
//!   `{op, targetKey, collectionKey, collectionSource}` for `in|nin`
//!
//! `parse_condition` turns a document into a typed [`Condition`] or a
//! `Schema` error carrying the offending path; `evaluate` folds the typed
//! tree against a subject/resource pair.

use serde_json::{json, Map, Value};

use crate::errors::AuthzError;
use crate::types::{AttributeValue, DynamicKey, Resource};
use crate::DebugSink;

// ─── AST ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl ScalarOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(ScalarOp::Eq),
            "ne" => Some(ScalarOp::Ne),
            "gt" => Some(ScalarOp::Gt),
            "gte" => Some(ScalarOp::Gte),
            "lt" => Some(ScalarOp::Lt),
            "lte" => Some(ScalarOp::Lte),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarOp::Eq => "eq",
            ScalarOp::Ne => "ne",
            ScalarOp::Gt => "gt",
            ScalarOp::Gte => "gte",
            ScalarOp::Lt => "lt",
            ScalarOp::Lte => "lte",
        }
    }

    fn is_ordering(&self) -> bool {
        matches!(
            self,
            ScalarOp::Gt | ScalarOp::Gte | ScalarOp::Lt | ScalarOp::Lte
        )
    }
}

impl std::fmt::Display for ScalarOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    In,
    Nin,
}

impl SetOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in" => Some(SetOp::In),
            "nin" => Some(SetOp::Nin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SetOp::In => "in",
            SetOp::Nin => "nin",
        }
    }
}

impl std::fmt::Display for SetOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which entity supplies the attribute in an attribute condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareSource {
    Subject,
    Resource,
}

/// Which entity holds the collection in a cross-entity membership check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionSource {
    Subject,
    Resource,
}

/// A literal a policy compares an attribute against.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Str(String),
    Num(f64),
    Bool(bool),
}

impl ScalarValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ScalarValue::Str(_) => "string",
            ScalarValue::Num(_) => "number",
            ScalarValue::Bool(_) => "bool",
        }
    }
}

/// An element of an `in`/`nin` reference array. Booleans are excluded.
#[derive(Debug, Clone, PartialEq)]
pub enum ListElement {
    Str(String),
    Num(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeCompare {
    pub op: ScalarOp,
    pub key: DynamicKey,
    pub reference: ScalarValue,
    pub source: Option<CompareSource>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeMembership {
    pub op: SetOp,
    pub key: DynamicKey,
    pub reference: Vec<ListElement>,
    pub source: Option<CompareSource>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityCompare {
    pub op: ScalarOp,
    pub subject_key: DynamicKey,
    pub resource_key: DynamicKey,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityMembership {
    pub op: SetOp,
    pub target_key: DynamicKey,
    pub collection_key: DynamicKey,
    pub source: CollectionSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    Compare(AttributeCompare),
    Membership(AttributeMembership),
    EntityCompare(EntityCompare),
    EntityMembership(EntityMembership),
}

// ─── Schema validation ──────────────────────────────────────────────────

/// Validate a condition document into a typed [`Condition`].
///
/// `path` is the document location reported in errors, e.g. `conditions`
/// for a policy's top-level condition.
pub fn parse_condition(doc: &Value, path: &str) -> Result<Condition, AuthzError> {
    let map = as_object(doc, path)?;
    let op = require(map, path, "op")?
        .as_str()
        .ok_or_else(|| AuthzError::schema(format!("{path}.op"), "expected a string"))?;

    match op {
        "and" | "or" => {
            check_fields(map, path, &["op", "conditions"])?;
            let children = require(map, path, "conditions")?
                .as_array()
                .ok_or_else(|| {
                    AuthzError::schema(format!("{path}.conditions"), "expected an array")
                })?;
            if children.is_empty() {
                return Err(AuthzError::schema(
                    format!("{path}.conditions"),
                    format!("`{op}` requires at least one condition"),
                ));
            }
            let parsed = children
                .iter()
                .enumerate()
                .map(|(i, child)| parse_condition(child, &format!("{path}.conditions[{i}]")))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(if op == "and" {
                Condition::And(parsed)
            } else {
                Condition::Or(parsed)
            })
        }
        "not" => {
            check_fields(map, path, &["op", "conditions"])?;
            let child = require(map, path, "conditions")?;
            if child.is_array() {
                return Err(AuthzError::schema(
                    format!("{path}.conditions"),
                    "`not` takes a single condition, not an array",
                ));
            }
            let parsed = parse_condition(child, &format!("{path}.conditions"))?;
            Ok(Condition::Not(Box::new(parsed)))
        }
        _ if map.contains_key("attributeKey") => parse_attribute_condition(map, path, op),
        _ => parse_entity_condition(map, path, op),
    }
}

fn parse_attribute_condition(
    map: &Map<String, Value>,
    path: &str,
    op: &str,
) -> Result<Condition, AuthzError> {
    check_fields(
        map,
        path,
        &["op", "attributeKey", "referenceValue", "compareSource"],
    )?;
    let key = dynamic_key_field(map, path, "attributeKey")?;
    let source = compare_source(map, path)?;
    let reference = require(map, path, "referenceValue")?;

    if let Some(set_op) = SetOp::parse(op) {
        let elements = list_reference(reference, &format!("{path}.referenceValue"))?;
        return Ok(Condition::Membership(AttributeMembership {
            op: set_op,
            key,
            reference: elements,
            source,
        }));
    }

    let scalar_op = ScalarOp::parse(op)
        .ok_or_else(|| AuthzError::schema(format!("{path}.op"), format!("unknown operator `{op}`")))?;
    let reference = if scalar_op.is_ordering() {
        ScalarValue::Num(numeric_reference(
            reference,
            &format!("{path}.referenceValue"),
        )?)
    } else {
        scalar_reference(reference, &format!("{path}.referenceValue"))?
    };
    Ok(Condition::Compare(AttributeCompare {
        op: scalar_op,
        key,
        reference,
        source,
    }))
}

fn parse_entity_condition(
    map: &Map<String, Value>,
    path: &str,
    op: &str,
) -> Result<Condition, AuthzError> {
    if let Some(set_op) = SetOp::parse(op) {
        check_fields(
            map,
            path,
            &["op", "targetKey", "collectionKey", "collectionSource"],
        )?;
        let target_key = dynamic_key_field(map, path, "targetKey")?;
        let collection_key = dynamic_key_field(map, path, "collectionKey")?;
        let source = match require(map, path, "collectionSource")?.as_str() {
            Some("subject") => CollectionSource::Subject,
            Some("resource") => CollectionSource::Resource,
            Some(other) => {
                return Err(AuthzError::schema(
                    format!("{path}.collectionSource"),
                    format!("expected `subject` or `resource`, got `{other}`"),
                ))
            }
            None => {
                return Err(AuthzError::schema(
                    format!("{path}.collectionSource"),
                    "expected a string",
                ))
            }
        };
        return Ok(Condition::EntityMembership(EntityMembership {
            op: set_op,
            target_key,
            collection_key,
            source,
        }));
    }

    let scalar_op = ScalarOp::parse(op)
        .ok_or_else(|| AuthzError::schema(format!("{path}.op"), format!("unknown operator `{op}`")))?;
    check_fields(map, path, &["op", "subjectKey", "resourceKey"])?;
    Ok(Condition::EntityCompare(EntityCompare {
        op: scalar_op,
        subject_key: dynamic_key_field(map, path, "subjectKey")?,
        resource_key: dynamic_key_field(map, path, "resourceKey")?,
    }))
}

fn as_object<'a>(doc: &'a Value, path: &str) -> Result<&'a Map<String, Value>, AuthzError> {
    doc.as_object()
        .ok_or_else(|| AuthzError::schema(path, "expected an object"))
}

/// Strict object check: every present field must be in `allowed`.
fn check_fields(
    map: &Map<String, Value>,
    path: &str,
    allowed: &[&str],
) -> Result<(), AuthzError> {
    for field in map.keys() {
        if !allowed.contains(&field.as_str()) {
            return Err(AuthzError::schema(
                format!("{path}.{field}"),
                "unknown field",
            ));
        }
    }
    Ok(())
}

fn require<'a>(
    map: &'a Map<String, Value>,
    path: &str,
    field: &str,
) -> Result<&'a Value, AuthzError> {
    map.get(field)
        .ok_or_else(|| AuthzError::schema(path, format!("missing field `{field}`")))
}

fn dynamic_key_field(
    map: &Map<String, Value>,
    path: &str,
    field: &str,
) -> Result<DynamicKey, AuthzError> {
    let raw = require(map, path, field)?
        .as_str()
        .ok_or_else(|| AuthzError::schema(format!("{path}.{field}"), "expected a string"))?;
    DynamicKey::parse(raw).ok_or_else(|| {
        AuthzError::schema(
            format!("{path}.{field}"),
            format!("`{raw}` is not a dynamic key (expected `$name`)"),
        )
    })
}

fn compare_source(
    map: &Map<String, Value>,
    path: &str,
) -> Result<Option<CompareSource>, AuthzError> {
    match map.get("compareSource") {
        None => Ok(None),
        Some(Value::String(s)) => match s.as_str() {
            "subject" => Ok(Some(CompareSource::Subject)),
            "resource" => Ok(Some(CompareSource::Resource)),
            other => Err(AuthzError::schema(
                format!("{path}.compareSource"),
                format!("expected `subject` or `resource`, got `{other}`"),
            )),
        },
        Some(_) => Err(AuthzError::schema(
            format!("{path}.compareSource"),
            "expected a string",
        )),
    }
}

fn scalar_reference(value: &Value, path: &str) -> Result<ScalarValue, AuthzError> {
    match value {
        Value::String(s) => Ok(ScalarValue::Str(s.clone())),
        Value::Number(n) => n
            .as_f64()
            .map(ScalarValue::Num)
            .ok_or_else(|| AuthzError::schema(path, "number is out of range")),
        Value::Bool(b) => Ok(ScalarValue::Bool(*b)),
        _ => Err(AuthzError::schema(
            path,
            "expected a string, number, or bool",
        )),
    }
}

fn numeric_reference(value: &Value, path: &str) -> Result<f64, AuthzError> {
    value
        .as_f64()
        .ok_or_else(|| AuthzError::schema(path, "expected a number"))
}

fn list_reference(value: &Value, path: &str) -> Result<Vec<ListElement>, AuthzError> {
    let items = value
        .as_array()
        .ok_or_else(|| AuthzError::schema(path, "expected an array"))?;
    let mut elements = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match item {
            Value::String(s) => elements.push(ListElement::Str(s.clone())),
            Value::Number(n) => {
                let n = n.as_f64().ok_or_else(|| {
                    AuthzError::schema(format!("{path}[{i}]"), "number is out of range")
                })?;
                elements.push(ListElement::Num(n));
            }
            _ => {
                return Err(AuthzError::schema(
                    format!("{path}[{i}]"),
                    "expected a string or number",
                ))
            }
        }
    }
    Ok(elements)
}

// ─── Evaluator ──────────────────────────────────────────────────────────

/// Evaluate a condition against a subject/resource pair.
///
/// Missing attributes make the condition false; present attributes with a
/// shape the operator cannot accept raise `InvalidOperand`. When `trace`
/// is set, every node entered and every attribute lookup is reported.
pub fn evaluate(
    condition: &Condition,
    subject: &Resource,
    resource: &Resource,
    trace: Option<&dyn DebugSink>,
) -> Result<bool, AuthzError> {
    match condition {
        Condition::And(children) => {
            emit(trace, "condition", || {
                json!({"kind": "and", "children": children.len()})
            });
            for child in children {
                if !evaluate(child, subject, resource, trace)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::Or(children) => {
            emit(trace, "condition", || {
                json!({"kind": "or", "children": children.len()})
            });
            for child in children {
                if evaluate(child, subject, resource, trace)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Condition::Not(child) => {
            emit(trace, "condition", || json!({"kind": "not"}));
            Ok(!evaluate(child, subject, resource, trace)?)
        }
        Condition::Compare(c) => {
            emit(trace, "condition", || {
                json!({"kind": "compare", "op": c.op.as_str(), "key": c.key.to_string()})
            });
            eval_per_source(&c.key, c.source, subject, resource, trace, c.op, |value| {
                apply_scalar(c.op, value, &c.reference)
            })
        }
        Condition::Membership(m) => {
            emit(trace, "condition", || {
                json!({"kind": "membership", "op": m.op.as_str(), "key": m.key.to_string()})
            });
            eval_per_source(&m.key, m.source, subject, resource, trace, m.op, |value| {
                apply_membership(m.op, value, &m.reference)
            })
        }
        Condition::EntityCompare(c) => {
            emit(trace, "condition", || {
                json!({
                    "kind": "entity-compare",
                    "op": c.op.as_str(),
                    "subjectKey": c.subject_key.to_string(),
                    "resourceKey": c.resource_key.to_string(),
                })
            });
            eval_entity_compare(c, subject, resource, trace)
        }
        Condition::EntityMembership(m) => {
            emit(trace, "condition", || {
                json!({
                    "kind": "entity-membership",
                    "op": m.op.as_str(),
                    "targetKey": m.target_key.to_string(),
                    "collectionKey": m.collection_key.to_string(),
                })
            });
            eval_entity_membership(m, subject, resource, trace)
        }
    }
}

/// Resolve the attribute named by `key` per the source-selection rule and
/// apply `op_fn` to each selected side.
fn eval_per_source<F>(
    key: &DynamicKey,
    source: Option<CompareSource>,
    subject: &Resource,
    resource: &Resource,
    trace: Option<&dyn DebugSink>,
    op: impl std::fmt::Display,
    op_fn: F,
) -> Result<bool, AuthzError>
where
    F: Fn(&ScalarValue) -> Result<bool, AuthzError>,
{
    let name = key.name();
    match source {
        Some(CompareSource::Subject) => {
            match lookup(subject, "subject", name, trace) {
                None => Ok(false),
                Some(value) => op_fn(&require_scalar(value, &op)?),
            }
        }
        Some(CompareSource::Resource) => {
            match lookup(resource, "resource", name, trace) {
                None => Ok(false),
                Some(value) => op_fn(&require_scalar(value, &op)?),
            }
        }
        None => {
            let sv = lookup(subject, "subject", name, trace);
            let rv = lookup(resource, "resource", name, trace);
            let (Some(sv), Some(rv)) = (sv, rv) else {
                return Ok(false);
            };
            let sv = require_scalar(sv, &op)?;
            let rv = require_scalar(rv, &op)?;
            // Both sides are compared; a type error on either surfaces
            // regardless of the other side's result.
            let subject_holds = op_fn(&sv)?;
            let resource_holds = op_fn(&rv)?;
            Ok(subject_holds && resource_holds)
        }
    }
}

fn eval_entity_compare(
    c: &EntityCompare,
    subject: &Resource,
    resource: &Resource,
    trace: Option<&dyn DebugSink>,
) -> Result<bool, AuthzError> {
    let sv = lookup(subject, "subject", c.subject_key.name(), trace);
    let rv = lookup(resource, "resource", c.resource_key.name(), trace);
    let (Some(sv), Some(rv)) = (sv, rv) else {
        return Ok(false);
    };
    let sv = require_scalar(sv, c.op)?;
    let rv = require_scalar(rv, c.op)?;
    if sv.type_name() != rv.type_name() {
        return Err(AuthzError::invalid_operand(
            sv.type_name(),
            c.op,
            format!(
                "subject attribute is {} but resource attribute is {}",
                sv.type_name(),
                rv.type_name()
            ),
        ));
    }
    apply_scalar(c.op, &sv, &rv)
}

fn eval_entity_membership(
    m: &EntityMembership,
    subject: &Resource,
    resource: &Resource,
    trace: Option<&dyn DebugSink>,
) -> Result<bool, AuthzError> {
    // With a subject-side source the collection is read from the subject
    // under targetKey and the probe from the resource under collectionKey;
    // the resource side uses the straight mapping.
    let (collection, target) = match m.source {
        CollectionSource::Subject => (
            lookup(subject, "subject", m.target_key.name(), trace),
            lookup(resource, "resource", m.collection_key.name(), trace),
        ),
        CollectionSource::Resource => (
            lookup(resource, "resource", m.collection_key.name(), trace),
            lookup(subject, "subject", m.target_key.name(), trace),
        ),
    };
    let (Some(collection), Some(target)) = (collection, target) else {
        return Ok(false);
    };
    let probe = require_scalar(target, m.op)?;
    let found = match collection {
        AttributeValue::StrList(items) => match &probe {
            ScalarValue::Str(p) => items.iter().any(|item| item == p),
            _ => false,
        },
        AttributeValue::NumList(items) => match &probe {
            ScalarValue::Num(p) => items.iter().any(|item| item == p),
            _ => false,
        },
        other => {
            return Err(AuthzError::invalid_operand(
                other.type_name(),
                m.op,
                "the collection side must be an array",
            ))
        }
    };
    Ok(match m.op {
        SetOp::In => found,
        SetOp::Nin => !found,
    })
}

fn lookup<'a>(
    entity: &'a Resource,
    role: &str,
    name: &str,
    trace: Option<&dyn DebugSink>,
) -> Option<&'a AttributeValue> {
    let value = entity.attributes.get(name);
    emit(trace, "resolve", || {
        json!({
            "entity": role,
            "key": name,
            "value": value.map(|v| serde_json::to_value(v).unwrap_or_default()),
        })
    });
    value
}

/// A branch that needs a primitive rejects arrays with `InvalidOperand`.
fn require_scalar(
    value: &AttributeValue,
    op: impl std::fmt::Display,
) -> Result<ScalarValue, AuthzError> {
    match value {
        AttributeValue::Str(s) => Ok(ScalarValue::Str(s.clone())),
        AttributeValue::Num(n) => Ok(ScalarValue::Num(*n)),
        AttributeValue::Bool(b) => Ok(ScalarValue::Bool(*b)),
        array => Err(AuthzError::invalid_operand(
            array.type_name(),
            op,
            "a primitive value is required here",
        )),
    }
}

fn apply_scalar(op: ScalarOp, lhs: &ScalarValue, rhs: &ScalarValue) -> Result<bool, AuthzError> {
    match op {
        ScalarOp::Eq => scalar_eq(op, lhs, rhs),
        ScalarOp::Ne => scalar_eq(op, lhs, rhs).map(|equal| !equal),
        ScalarOp::Gt | ScalarOp::Gte | ScalarOp::Lt | ScalarOp::Lte => {
            let (ScalarValue::Num(l), ScalarValue::Num(r)) = (lhs, rhs) else {
                let offender = if matches!(lhs, ScalarValue::Num(_)) {
                    rhs
                } else {
                    lhs
                };
                return Err(AuthzError::invalid_operand(
                    offender.type_name(),
                    op,
                    "numeric comparison requires number operands",
                ));
            };
            Ok(match op {
                ScalarOp::Gt => l > r,
                ScalarOp::Gte => l >= r,
                ScalarOp::Lt => l < r,
                ScalarOp::Lte => l <= r,
                _ => unreachable!(),
            })
        }
    }
}

fn scalar_eq(op: ScalarOp, lhs: &ScalarValue, rhs: &ScalarValue) -> Result<bool, AuthzError> {
    match (lhs, rhs) {
        (ScalarValue::Str(a), ScalarValue::Str(b)) => Ok(a == b),
        (ScalarValue::Num(a), ScalarValue::Num(b)) => Ok(a == b),
        (ScalarValue::Bool(a), ScalarValue::Bool(b)) => Ok(a == b),
        _ => Err(AuthzError::invalid_operand(
            lhs.type_name(),
            op,
            format!(
                "cannot compare {} with {}",
                lhs.type_name(),
                rhs.type_name()
            ),
        )),
    }
}

fn apply_membership(
    op: SetOp,
    probe: &ScalarValue,
    reference: &[ListElement],
) -> Result<bool, AuthzError> {
    if matches!(probe, ScalarValue::Bool(_)) {
        return Err(AuthzError::invalid_operand(
            "bool",
            op,
            "booleans cannot be probed against a collection",
        ));
    }
    let mut shares_type = false;
    let mut found = false;
    for element in reference {
        match (probe, element) {
            (ScalarValue::Str(p), ListElement::Str(e)) => {
                shares_type = true;
                if p == e {
                    found = true;
                }
            }
            (ScalarValue::Num(p), ListElement::Num(e)) => {
                shares_type = true;
                if p == e {
                    found = true;
                }
            }
            _ => {}
        }
    }
    if !shares_type {
        return Err(AuthzError::invalid_operand(
            probe.type_name(),
            op,
            "no element of the reference array shares the probed value's type",
        ));
    }
    Ok(match op {
        SetOp::In => found,
        SetOp::Nin => !found,
    })
}

fn emit(trace: Option<&dyn DebugSink>, stage: &str, payload: impl FnOnce() -> Value) {
    if let Some(sink) = trace {
        sink.record(stage, payload());
    }
}
