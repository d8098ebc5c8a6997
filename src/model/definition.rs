//! Test configurations and the reference data a run executes against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Operator-authored test intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfiguration {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// e.g. strike, appsim, clientsim, bandwidth
    pub test_type: String,
    /// Identifier of the mirrored test on the controller, once synced.
    pub remote_test_id: Option<String>,
    /// Controller the `remote_test_id` belongs to.
    pub remote_target: Option<String>,
    pub payload: Value,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TestConfiguration {
    /// The cached remote id, if it was minted by `target`.
    ///
    /// An id recorded without a target predates target tracking and is trusted as-is.
    pub fn remote_test_id_for(&self, target: &str) -> Option<&str> {
        let id = self.remote_test_id.as_deref().filter(|id| !id.is_empty())?;
        match self.remote_target.as_deref() {
            Some(t) if t != target => None,
            _ => Some(id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewTestConfiguration {
    pub name: String,
    pub description: Option<String>,
    pub test_type: String,
    pub payload: Value,
    pub created_by: Option<String>,
}

/// Where a run executes: the chassis the controller drives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub ip_address: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub is_active: bool,
    pub attributes: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEnvironment {
    pub name: String,
    pub description: Option<String>,
    pub ip_address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub attributes: Option<Value>,
}

/// The device under test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// e.g. firewall, router, switch
    pub device_type: String,
    pub ip_address: Option<String>,
    #[serde(skip_serializing)]
    pub credentials: Option<Value>,
    pub attributes: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDevice {
    pub name: String,
    pub description: Option<String>,
    pub device_type: String,
    pub ip_address: Option<String>,
    pub credentials: Option<Value>,
    pub attributes: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(remote_test_id: Option<&str>, remote_target: Option<&str>) -> TestConfiguration {
        TestConfiguration {
            id: 1,
            name: "edge-fw-strikes".to_string(),
            description: None,
            test_type: "strike".to_string(),
            remote_test_id: remote_test_id.map(String::from),
            remote_target: remote_target.map(String::from),
            payload: json!({}),
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_remote_id_scoped_to_target() {
        let c = config(Some("t-9"), Some("https://bps-a"));
        assert_eq!(c.remote_test_id_for("https://bps-a"), Some("t-9"));
        assert_eq!(c.remote_test_id_for("https://bps-b"), None);
    }

    #[test]
    fn test_remote_id_without_target_is_trusted() {
        let c = config(Some("t-9"), None);
        assert_eq!(c.remote_test_id_for("anything"), Some("t-9"));
        assert_eq!(config(Some(""), None).remote_test_id_for("x"), None);
        assert_eq!(config(None, None).remote_test_id_for("x"), None);
    }
}
