//! Test configurations, environments and devices.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde_json::Value;

use super::{json_col, opt_json_col, time_col, ts, StorageError, Store};
use crate::model::{
    Device, Environment, NewDevice, NewEnvironment, NewTestConfiguration, TestConfiguration,
};

const CONFIG_COLUMNS: &str = "id, name, description, test_type, remote_test_id, remote_target,
     payload_json, created_by, created_at, updated_at";

fn config_from_row(row: &Row<'_>) -> rusqlite::Result<TestConfiguration> {
    Ok(TestConfiguration {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        test_type: row.get(3)?,
        remote_test_id: row.get(4)?,
        remote_target: row.get(5)?,
        payload: json_col(row, 6)?,
        created_by: row.get(7)?,
        created_at: time_col(row, 8)?,
        updated_at: time_col(row, 9)?,
    })
}

fn environment_from_row(row: &Row<'_>) -> rusqlite::Result<Environment> {
    Ok(Environment {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        ip_address: row.get(3)?,
        port: row.get(4)?,
        username: row.get(5)?,
        password: row.get(6)?,
        is_active: row.get::<_, i64>(7)? != 0,
        attributes: opt_json_col(row, 8)?,
        created_at: time_col(row, 9)?,
    })
}

fn device_from_row(row: &Row<'_>) -> rusqlite::Result<Device> {
    Ok(Device {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        device_type: row.get(3)?,
        ip_address: row.get(4)?,
        credentials: opt_json_col(row, 5)?,
        attributes: opt_json_col(row, 6)?,
        created_at: time_col(row, 7)?,
    })
}

fn opt_json(value: &Option<Value>) -> Result<Option<String>, StorageError> {
    Ok(value.as_ref().map(serde_json::to_string).transpose()?)
}

impl Store {
    // ========================================================================
    // Test configurations
    // ========================================================================

    pub fn insert_configuration(
        &self,
        new: &NewTestConfiguration,
    ) -> Result<TestConfiguration, StorageError> {
        let id = {
            let conn = self.pool().get()?;
            let now = ts(&Utc::now());
            conn.execute(
                "INSERT INTO test_configurations
                    (name, description, test_type, payload_json, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    new.name,
                    new.description,
                    new.test_type,
                    serde_json::to_string(&new.payload)?,
                    new.created_by,
                    now,
                ],
            )?;
            conn.last_insert_rowid()
        };
        self.require_configuration(id)
    }

    pub fn get_configuration(&self, id: i64) -> Result<Option<TestConfiguration>, StorageError> {
        let conn = self.pool().get()?;
        let config = conn
            .query_row(
                &format!("SELECT {} FROM test_configurations WHERE id = ?1", CONFIG_COLUMNS),
                params![id],
                config_from_row,
            )
            .optional()?;
        Ok(config)
    }

    fn require_configuration(&self, id: i64) -> Result<TestConfiguration, StorageError> {
        self.get_configuration(id)?.ok_or(StorageError::Missing {
            entity: "test configuration",
            id: id.to_string(),
        })
    }

    /// Record (or clear) the controller-side identifier of a configuration.
    pub fn set_remote_test_id(
        &self,
        id: i64,
        remote_test_id: Option<&str>,
        remote_target: Option<&str>,
    ) -> Result<TestConfiguration, StorageError> {
        {
            let conn = self.pool().get()?;
            let changed = conn.execute(
                "UPDATE test_configurations
                 SET remote_test_id = ?2, remote_target = ?3, updated_at = ?4
                 WHERE id = ?1",
                params![id, remote_test_id, remote_target, ts(&Utc::now())],
            )?;
            if changed == 0 {
                return Err(StorageError::Missing {
                    entity: "test configuration",
                    id: id.to_string(),
                });
            }
        }
        self.require_configuration(id)
    }

    pub fn update_configuration_payload(
        &self,
        id: i64,
        payload: &Value,
    ) -> Result<TestConfiguration, StorageError> {
        {
            let conn = self.pool().get()?;
            let changed = conn.execute(
                "UPDATE test_configurations SET payload_json = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, serde_json::to_string(payload)?, ts(&Utc::now())],
            )?;
            if changed == 0 {
                return Err(StorageError::Missing {
                    entity: "test configuration",
                    id: id.to_string(),
                });
            }
        }
        self.require_configuration(id)
    }

    /// Delete a configuration. Returns false when it did not exist.
    pub fn delete_configuration(&self, id: i64) -> Result<bool, StorageError> {
        let conn = self.pool().get()?;
        let changed = conn.execute(
            "DELETE FROM test_configurations WHERE id = ?1",
            params![id],
        )?;
        Ok(changed > 0)
    }

    pub fn count_runs_for_configuration(&self, id: i64) -> Result<i64, StorageError> {
        let conn = self.pool().get()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM test_runs WHERE test_config_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ========================================================================
    // Environments and devices
    // ========================================================================

    pub fn insert_environment(&self, new: &NewEnvironment) -> Result<Environment, StorageError> {
        let id = {
            let conn = self.pool().get()?;
            conn.execute(
                "INSERT INTO environments
                    (name, description, ip_address, port, username, password, attributes_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    new.name,
                    new.description,
                    new.ip_address,
                    new.port,
                    new.username,
                    new.password,
                    opt_json(&new.attributes)?,
                    ts(&Utc::now()),
                ],
            )?;
            conn.last_insert_rowid()
        };
        self.get_environment(id)?.ok_or(StorageError::Missing {
            entity: "environment",
            id: id.to_string(),
        })
    }

    pub fn get_environment(&self, id: i64) -> Result<Option<Environment>, StorageError> {
        let conn = self.pool().get()?;
        let env = conn
            .query_row(
                "SELECT id, name, description, ip_address, port, username, password, is_active,
                        attributes_json, created_at
                 FROM environments WHERE id = ?1",
                params![id],
                environment_from_row,
            )
            .optional()?;
        Ok(env)
    }

    pub fn insert_device(&self, new: &NewDevice) -> Result<Device, StorageError> {
        let id = {
            let conn = self.pool().get()?;
            conn.execute(
                "INSERT INTO devices
                    (name, description, device_type, ip_address, credentials_json, attributes_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    new.name,
                    new.description,
                    new.device_type,
                    new.ip_address,
                    opt_json(&new.credentials)?,
                    opt_json(&new.attributes)?,
                    ts(&Utc::now()),
                ],
            )?;
            conn.last_insert_rowid()
        };
        self.get_device(id)?.ok_or(StorageError::Missing {
            entity: "device",
            id: id.to_string(),
        })
    }

    pub fn get_device(&self, id: i64) -> Result<Option<Device>, StorageError> {
        let conn = self.pool().get()?;
        let device = conn
            .query_row(
                "SELECT id, name, description, device_type, ip_address, credentials_json,
                        attributes_json, created_at
                 FROM devices WHERE id = ?1",
                params![id],
                device_from_row,
            )
            .optional()?;
        Ok(device)
    }
}
