use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("Invalid document at `{path}`: {reason}")]
    #[diagnostic(
        code(lychgate::schema),
        help("Policy documents must match the condition grammar exactly; unknown fields are rejected")
    )]
    Schema { path: String, reason: String },

    #[error("Operator `{operator}` cannot be applied to {observed}: {message}")]
    #[diagnostic(
        code(lychgate::invalid_operand),
        help("Comparisons require matching primitive types; gt/gte/lt/lte require numbers; in/nin probe a primitive against an array")
    )]
    InvalidOperand {
        observed: String,
        operator: String,
        message: String,
    },

    #[error("Failed to load policy file `{path}`")]
    #[diagnostic(
        code(lychgate::policy_load),
        help("Check that the file exists and is readable")
    )]
    PolicyLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parse error in `{path}`: {reason}")]
    #[diagnostic(
        code(lychgate::json),
        help("Policy files must contain a single policy object or an array of policy objects")
    )]
    Json { path: String, reason: String },
}

impl AuthzError {
    /// Shorthand for a validation failure at a document path.
    pub(crate) fn schema(path: impl Into<String>, reason: impl Into<String>) -> Self {
        AuthzError::Schema {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_operand(
        observed: impl Into<String>,
        operator: impl std::fmt::Display,
        message: impl Into<String>,
    ) -> Self {
        AuthzError::InvalidOperand {
            observed: observed.into(),
            operator: operator.to_string(),
            message: message.into(),
        }
    }
}
