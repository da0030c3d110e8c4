//! Load policy documents from a directory of JSON files.

use std::path::Path;

use serde_json::Value;

use crate::errors::AuthzError;
use crate::manager::PolicyManager;

/// Read every `.json` file under `dir` (in path order) into a new
/// [`PolicyManager`] over `universe`. A file holds either a single policy
/// object or an array of policy objects; other files are ignored.
pub fn load_policies<I, S>(dir: &Path, universe: I) -> Result<PolicyManager, AuthzError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut manager = PolicyManager::new(universe)?;

    if !dir.is_dir() {
        return Err(AuthzError::schema(
            "policies",
            format!(
                "`{}` does not exist or is not a directory",
                dir.display()
            ),
        ));
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|source| AuthzError::PolicyLoad {
            path: dir.display().to_string(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .map(|ext| ext == "json")
                .unwrap_or(false)
        })
        .collect();
    entries.sort_by_key(|entry| entry.path());

    let mut file_count = 0;
    let mut policy_count = 0;
    for entry in entries {
        let path = entry.path();
        let contents =
            std::fs::read_to_string(&path).map_err(|source| AuthzError::PolicyLoad {
                path: path.display().to_string(),
                source,
            })?;
        let parsed: Value =
            serde_json::from_str(&contents).map_err(|e| AuthzError::Json {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        match &parsed {
            Value::Array(documents) => {
                for document in documents {
                    manager.add_policy(document)?;
                    policy_count += 1;
                }
            }
            document => {
                manager.add_policy(document)?;
                policy_count += 1;
            }
        }
        file_count += 1;
    }

    tracing::info!(
        files = file_count,
        policies = policy_count,
        keys = manager.get_policies().len(),
        "Loaded authorization policies"
    );

    Ok(manager)
}
