//! File operations embedded in HTTP provider responses.
//!
//! A response body is free text that may contain JSON objects of the form
//! `{"action": "create"|"edit"|"delete", "file": <path>, "content": <string>}`.
//! Scanning is pure: it finds the objects in appearance order and validates
//! them against a fixed schema. Applying them is the adapter's job.

use std::fmt;
use std::path::{Component, Path};

use anyhow::{Result, anyhow};
use jsonschema::validator_for;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Directories a provider is never allowed to touch through file operations.
pub const PROTECTED_DIRS: [&str; 2] = [".git", ".delegate"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Create,
    Edit,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOperation {
    pub action: FileAction,
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl fmt::Display for FileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.action {
            FileAction::Create => "create",
            FileAction::Edit => "edit",
            FileAction::Delete => "delete",
        };
        write!(f, "{verb} {}", self.file)
    }
}

/// Operations found in a response, in order, up to the first malformed one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub operations: Vec<FileOperation>,
    /// Why scanning stopped early, if it did. Operations after it are ignored.
    pub malformed: Option<String>,
}

fn operation_schema() -> Value {
    json!({
        "type": "object",
        "required": ["action", "file"],
        "properties": {
            "action": { "enum": ["create", "edit", "delete"] },
            "file": { "type": "string", "minLength": 1 },
            "content": { "type": "string" }
        },
        "if": { "properties": { "action": { "enum": ["create", "edit"] } } },
        "then": { "required": ["content"] }
    })
}

/// Scan `body` for file operations in appearance order.
///
/// Objects without an `"action"` key are treated as prose and searched for
/// nested operations. The first object that carries `"action"` but fails to
/// parse or validate stops the scan.
pub fn scan_operations(body: &str) -> Result<ScanOutcome> {
    let validator =
        validator_for(&operation_schema()).map_err(|err| anyhow!("invalid schema: {err}"))?;
    let mut outcome = ScanOutcome::default();
    let mut cursor = 0usize;

    while let Some(offset) = body[cursor..].find('{') {
        let start = cursor + offset;
        let Some(end) = balanced_object_end(body, start) else {
            if body[start..].contains("\"action\"") {
                outcome.malformed = Some(format!("unterminated object at byte {start}"));
            }
            break;
        };
        let candidate = &body[start..=end];

        match serde_json::from_str::<Value>(candidate) {
            Ok(value) if value.get("action").is_some() => {
                let errors: Vec<String> = validator
                    .iter_errors(&value)
                    .map(|err| err.to_string())
                    .collect();
                if !errors.is_empty() {
                    outcome.malformed = Some(format!(
                        "operation #{} at byte {start} is malformed: {}",
                        outcome.operations.len() + 1,
                        errors.join("; ")
                    ));
                    break;
                }
                let op: FileOperation = serde_json::from_value(value)
                    .map_err(|err| anyhow!("decode validated operation: {err}"))?;
                outcome.operations.push(op);
                cursor = end + 1;
            }
            Ok(_) => cursor = start + 1,
            Err(err) if candidate.contains("\"action\"") => {
                outcome.malformed = Some(format!(
                    "operation #{} at byte {start} is not valid JSON: {err}",
                    outcome.operations.len() + 1
                ));
                break;
            }
            Err(_) => cursor = start + 1,
        }
    }

    Ok(outcome)
}

/// Find the index of the `}` closing the object opened at `start`, honoring
/// JSON string literals and escapes.
fn balanced_object_end(body: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in body[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Reject targets outside the project or inside protected directories.
pub fn check_target_path(file: &str) -> Result<(), String> {
    let path = Path::new(file);
    if file.trim().is_empty() {
        return Err("empty path".to_string());
    }
    for component in path.components() {
        match component {
            Component::Normal(name) => {
                if PROTECTED_DIRS.iter().any(|dir| name == *dir) {
                    return Err(format!("{file} is inside a protected directory"));
                }
            }
            Component::CurDir => {}
            Component::ParentDir => return Err(format!("{file} escapes the project root")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!("{file} is an absolute path"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_operations_in_prose_order() {
        let body = r#"I'll add two files.
{"action": "create", "file": "a.txt", "content": "alpha"}
Then remove the old one:
```json
{"action": "delete", "file": "old.txt"}
```"#;
        let outcome = scan_operations(body).expect("scan");
        assert!(outcome.malformed.is_none());
        assert_eq!(outcome.operations.len(), 2);
        assert_eq!(outcome.operations[0].to_string(), "create a.txt");
        assert_eq!(outcome.operations[1].action, FileAction::Delete);
        assert_eq!(outcome.operations[1].content, None);
    }

    #[test]
    fn braces_inside_content_do_not_split_objects() {
        let body = r#"{"action": "create", "file": "main.rs", "content": "fn main() { println!(\"{}\", 1); }"}"#;
        let outcome = scan_operations(body).expect("scan");
        assert_eq!(outcome.operations.len(), 1);
        assert!(
            outcome.operations[0]
                .content
                .as_deref()
                .is_some_and(|c| c.contains("{ println!"))
        );
    }

    #[test]
    fn stops_at_first_malformed_operation() {
        let body = r#"{"action": "create", "file": "a.txt", "content": "a"}
{"action": "create", "file": "b.txt", "content": "b"}
{"action": "rename", "file": "c.txt"}
{"action": "create", "file": "d.txt", "content": "d"}"#;
        let outcome = scan_operations(body).expect("scan");
        assert_eq!(outcome.operations.len(), 2);
        let reason = outcome.malformed.expect("malformed");
        assert!(reason.contains("operation #3"));
    }

    #[test]
    fn create_without_content_is_malformed() {
        let outcome =
            scan_operations(r#"{"action": "create", "file": "a.txt"}"#).expect("scan");
        assert!(outcome.operations.is_empty());
        assert!(outcome.malformed.is_some());
    }

    #[test]
    fn nested_operations_inside_wrapper_are_found() {
        let body = r#"{"operations": [{"action": "edit", "file": "a.txt", "content": "new"}]}"#;
        let outcome = scan_operations(body).expect("scan");
        assert_eq!(outcome.operations.len(), 1);
        assert_eq!(outcome.operations[0].action, FileAction::Edit);
    }

    #[test]
    fn unterminated_operation_is_malformed() {
        let outcome =
            scan_operations(r#"{"action": "create", "file": "a.txt", "content": "x"#)
                .expect("scan");
        assert!(outcome.malformed.is_some_and(|m| m.contains("unterminated")));
    }

    #[test]
    fn target_paths_must_stay_inside_project() {
        assert!(check_target_path("src/lib.rs").is_ok());
        assert!(check_target_path("./README.md").is_ok());
        assert!(check_target_path("../outside.txt").is_err());
        assert!(check_target_path("/etc/passwd").is_err());
        assert!(check_target_path(".git/config").is_err());
        assert!(check_target_path("nested/.git/HEAD").is_err());
        assert!(check_target_path(".delegate/agent.toml").is_err());
        assert!(check_target_path("").is_err());
    }
}
