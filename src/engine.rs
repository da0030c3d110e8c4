//! The decision engine: `is_authorized` over an immutable policy index.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use crate::condition::evaluate;
use crate::errors::AuthzError;
use crate::types::{policy_key, Action, Policy, Resource};
use crate::{DebugSink, NoopSink};

/// Answers authorization queries against a policy index built by
/// [`PolicyManager`](crate::PolicyManager). The engine borrows the index
/// immutably and holds no other state, so one engine (or many) may serve
/// `is_authorized` calls from multiple threads at once.
pub struct AuthEngine<'a> {
    index: &'a HashMap<String, Vec<Policy>>,
    sink: Arc<dyn DebugSink>,
}

impl<'a> AuthEngine<'a> {
    pub fn new(index: &'a HashMap<String, Vec<Policy>>) -> Self {
        Self {
            index,
            sink: Arc::new(NoopSink),
        }
    }

    /// An engine whose debug-enabled calls report to `sink`.
    pub fn with_sink(index: &'a HashMap<String, Vec<Policy>>, sink: Arc<dyn DebugSink>) -> Self {
        Self { index, sink }
    }

    /// True iff some policy keyed by `(resource.type, action)` either has
    /// no conditions or evaluates to true for this subject/resource pair.
    ///
    /// Policies are visited in insertion order and the first grant wins;
    /// an `InvalidOperand` in a policy that is never reached stays silent.
    pub fn is_authorized(
        &self,
        subject: &Resource,
        resource: &Resource,
        action: Action,
    ) -> Result<bool, AuthzError> {
        self.check(subject, resource, action, false)
    }

    /// Like [`is_authorized`](Self::is_authorized), additionally reporting
    /// each policy considered, each condition node entered, each resolved
    /// attribute, and the final outcome to the sink.
    pub fn is_authorized_debug(
        &self,
        subject: &Resource,
        resource: &Resource,
        action: Action,
    ) -> Result<bool, AuthzError> {
        self.check(subject, resource, action, true)
    }

    fn check(
        &self,
        subject: &Resource,
        resource: &Resource,
        action: Action,
        debug: bool,
    ) -> Result<bool, AuthzError> {
        let trace: Option<&dyn DebugSink> = if debug { Some(self.sink.as_ref()) } else { None };
        let key = policy_key(&resource.resource_type, action);
        let policies = self.index.get(&key).map(Vec::as_slice).unwrap_or(&[]);

        for (i, policy) in policies.iter().enumerate() {
            if let Some(sink) = trace {
                sink.record(
                    "policy",
                    json!({
                        "key": key,
                        "index": i,
                        "unconditional": policy.conditions.is_none(),
                    }),
                );
            }
            let granted = match &policy.conditions {
                None => true,
                Some(condition) => evaluate(condition, subject, resource, trace)?,
            };
            if granted {
                if let Some(sink) = trace {
                    sink.record("outcome", json!({"allowed": true, "policy": i}));
                }
                return Ok(true);
            }
        }

        if let Some(sink) = trace {
            sink.record("outcome", json!({"allowed": false}));
        }
        Ok(false)
    }
}

/// A [`DebugSink`] that keeps every record, for tests and for callers who
/// want to inspect a decision trace after the fact.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<(String, Value)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(String, Value)> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl DebugSink for RecordingSink {
    fn record(&self, stage: &str, payload: Value) {
        if let Ok(mut records) = self.records.lock() {
            records.push((stage.to_string(), payload));
        }
    }
}
