//! GraphQL response envelope types.
//!
//! Every upstream query comes back in the same shape: an optional `data`
//! tree, an optional `errors` array, and (for queries that request it) a
//! `rateLimit` block inside `data`. The pagination engine never deserializes
//! domain payloads itself; it extracts the requested connection by field
//! path and hands the raw nodes to the caller's page processor.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Top-level GraphQL response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphEnvelope {
    /// Query result tree. `None` when the request failed entirely.
    #[serde(default)]
    pub data: Option<Value>,
    /// Structured application errors. May accompany partial `data`.
    #[serde(default)]
    pub errors: Vec<GraphErrorItem>,
}

/// One entry of the `errors[]` array.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphErrorItem {
    #[serde(default)]
    pub message: String,
    /// Path of the field the error applies to, e.g. `["repository", "issues"]`.
    #[serde(default)]
    pub path: Vec<Value>,
    #[serde(default)]
    pub extensions: Option<GraphErrorExtensions>,
}

/// The `extensions` object attached to structured errors.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphErrorExtensions {
    /// Upstream error code, e.g. `NOT_FOUND` or `RATE_LIMITED`.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl GraphErrorItem {
    /// The `extensions.type` code, if the error carries one.
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.extensions.as_ref().and_then(|e| e.kind.as_deref())
    }
}

/// Render a compact single-line summary of an error list for logs.
#[must_use]
pub fn summarize_errors(errors: &[GraphErrorItem]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(errors.len());
    for error in errors {
        match error.kind() {
            Some(kind) => parts.push(format!("{kind}: {}", error.message)),
            None => parts.push(error.message.clone()),
        }
    }
    parts.join("; ")
}

/// The `rateLimit` block present on successful budget-reporting queries.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitBlock {
    pub limit: i64,
    pub cost: i64,
    pub remaining: i64,
    pub used: i64,
    pub reset_at: DateTime<Utc>,
}

/// Cursor-pagination metadata of a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

/// A connection field: the page's nodes plus pagination metadata.
#[derive(Debug, Clone)]
pub struct Connection {
    pub nodes: Vec<Value>,
    pub page_info: PageInfo,
}

impl GraphEnvelope {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Extract the `rateLimit` block if the query requested one.
    ///
    /// Absence is normal (not every query asks for it) and is treated as a
    /// no-op by the tracker.
    #[must_use]
    pub fn rate_limit(&self) -> Option<RateLimitBlock> {
        let block = self.data.as_ref()?.get("rateLimit")?;
        serde_json::from_value(block.clone()).ok()
    }

    /// Navigate `data` along `path` and parse the connection found there.
    ///
    /// Returns `None` when any hop is missing or `null`, or when the final
    /// value is not an object. A connection without a `nodes` array yields
    /// an empty page rather than a failure.
    #[must_use]
    pub fn connection(&self, path: &[String]) -> Option<Connection> {
        let mut current = self.data.as_ref()?;
        for field in path {
            current = current.get(field)?;
            if current.is_null() {
                return None;
            }
        }
        let object = current.as_object()?;

        let nodes = match object.get("nodes") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        let page_info = object
            .get("pageInfo")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        Some(Connection { nodes, page_info })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(value: Value) -> GraphEnvelope {
        serde_json::from_value(value).expect("valid envelope")
    }

    #[test]
    fn parses_rate_limit_block() {
        let env = envelope(json!({
            "data": {
                "rateLimit": {
                    "limit": 5000,
                    "cost": 1,
                    "remaining": 4999,
                    "used": 1,
                    "resetAt": "2026-08-29T12:00:00Z"
                }
            }
        }));

        let block = env.rate_limit().expect("rate limit present");
        assert_eq!(block.limit, 5000);
        assert_eq!(block.cost, 1);
        assert_eq!(block.remaining, 4999);
        assert_eq!(block.used, 1);
    }

    #[test]
    fn rate_limit_absent_is_none() {
        let env = envelope(json!({ "data": { "repository": null } }));
        assert!(env.rate_limit().is_none());
    }

    #[test]
    fn extracts_connection_by_path() {
        let env = envelope(json!({
            "data": {
                "repository": {
                    "issues": {
                        "nodes": [{"number": 1}, {"number": 2}],
                        "pageInfo": {"hasNextPage": true, "endCursor": "abc"}
                    }
                }
            }
        }));

        let path = vec!["repository".to_string(), "issues".to_string()];
        let conn = env.connection(&path).expect("connection present");
        assert_eq!(conn.nodes.len(), 2);
        assert!(conn.page_info.has_next_page);
        assert_eq!(conn.page_info.end_cursor.as_deref(), Some("abc"));
    }

    #[test]
    fn null_hop_yields_no_connection() {
        let env = envelope(json!({ "data": { "repository": null } }));
        let path = vec!["repository".to_string(), "issues".to_string()];
        assert!(env.connection(&path).is_none());
    }

    #[test]
    fn missing_hop_yields_no_connection() {
        let env = envelope(json!({ "data": { "organization": {} } }));
        let path = vec!["repository".to_string(), "issues".to_string()];
        assert!(env.connection(&path).is_none());
    }

    #[test]
    fn connection_without_nodes_is_empty_page() {
        let env = envelope(json!({
            "data": { "repository": { "issues": { "pageInfo": { "hasNextPage": false } } } }
        }));
        let path = vec!["repository".to_string(), "issues".to_string()];
        let conn = env.connection(&path).expect("connection present");
        assert!(conn.nodes.is_empty());
        assert!(!conn.page_info.has_next_page);
        assert!(conn.page_info.end_cursor.is_none());
    }

    #[test]
    fn parses_structured_errors() {
        let env = envelope(json!({
            "data": null,
            "errors": [
                {
                    "message": "Could not resolve to a Repository",
                    "path": ["repository"],
                    "extensions": {"type": "NOT_FOUND"}
                },
                {"message": "no extensions here"}
            ]
        }));

        assert!(env.has_errors());
        assert_eq!(env.errors[0].kind(), Some("NOT_FOUND"));
        assert_eq!(env.errors[1].kind(), None);
    }

    #[test]
    fn summarize_includes_kind_and_message() {
        let env = envelope(json!({
            "errors": [
                {"message": "gone", "extensions": {"type": "NOT_FOUND"}},
                {"message": "oops"}
            ]
        }));
        assert_eq!(summarize_errors(&env.errors), "NOT_FOUND: gone; oops");
    }
}
