//! lychgate — attribute-based access control.
//!
//! Declarative policies name a resource type, an action, and an optional
//! condition tree over subject and resource attributes. A [`PolicyManager`]
//! validates policy documents against a fixed universe of resource types
//! and indexes them by `resource_type:action`; an [`AuthEngine`] answers
//! `is_authorized(subject, resource, action)` against that index.
//!
//! ```
//! use lychgate::{Action, AuthEngine, PolicyManager};
//! use serde_json::json;
//!
//! let mut manager = PolicyManager::new(["user", "file"])?;
//! manager.add_policy(&json!({"action": "read", "resource": "file"}))?;
//!
//! let subject = manager.create_resource(&json!({"id": "u1", "type": "user"}))?;
//! let file = manager.create_resource(&json!({"id": "f1", "type": "file"}))?;
//!
//! let engine = AuthEngine::new(manager.get_policies());
//! assert!(engine.is_authorized(&subject, &file, Action::Read)?);
//! assert!(!engine.is_authorized(&subject, &file, Action::Delete)?);
//! # Ok::<(), lychgate::AuthzError>(())
//! ```

pub mod condition;
pub mod engine;
pub mod errors;
pub mod loader;
pub mod manager;
pub mod policy;
pub mod types;

pub use condition::Condition;
pub use engine::{AuthEngine, RecordingSink};
pub use errors::AuthzError;
pub use loader::load_policies;
pub use manager::PolicyManager;
pub use types::{Action, AttributeValue, Attributes, DynamicKey, Policy, Resource};

use serde_json::Value;

/// Receives structured records from debug-enabled authorization calls:
/// one per policy considered, condition node entered, attribute resolved,
/// and final outcome.
pub trait DebugSink: Send + Sync {
    fn record(&self, stage: &str, payload: Value);
}

/// The default sink: drops everything.
pub struct NoopSink;

impl DebugSink for NoopSink {
    fn record(&self, _stage: &str, _payload: Value) {}
}
