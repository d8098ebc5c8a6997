//! Mirroring local test configurations onto the controller.

use serde_json::Value;
use tracing::{info, warn};

use super::{with_session, Orchestrator, OrchestratorError};
use crate::controller::ControllerSession;
use crate::model::TestConfiguration;

impl Orchestrator {
    /// Return the remote test id for `config`, creating the remote test on
    /// first use. A cached id for this controller is returned without any
    /// network traffic.
    ///
    /// Callers serialize use per configuration; two concurrent first calls
    /// can both create a remote test.
    pub async fn ensure_remote_test(
        &self,
        config: &TestConfiguration,
    ) -> Result<String, OrchestratorError> {
        if let Some(id) = config.remote_test_id_for(self.controller.target()) {
            return Ok(id.to_string());
        }
        with_session(self.controller.as_ref(), |session| async move {
            self.create_remote_test(session.as_ref(), config).await
        })
        .await
    }

    /// Push the current payload to the remote test, recreating it when the
    /// controller no longer has it. Returns the (possibly new) remote id.
    pub async fn update_remote_test(
        &self,
        config: &TestConfiguration,
    ) -> Result<String, OrchestratorError> {
        let Some(remote_id) = config.remote_test_id_for(self.controller.target()) else {
            return self.ensure_remote_test(config).await;
        };
        let remote_id = remote_id.to_string();

        with_session(self.controller.as_ref(), |session| async move {
            match session.update_test(&remote_id, &config.payload).await {
                Ok(()) => {
                    info!(config_id = config.id, remote_test_id = %remote_id, "remote test updated");
                    Ok(remote_id)
                }
                Err(e) if e.is_not_found() => {
                    warn!(
                        config_id = config.id,
                        remote_test_id = %remote_id,
                        "remote test vanished; recreating"
                    );
                    self.store.set_remote_test_id(config.id, None, None)?;
                    self.create_remote_test(session.as_ref(), config).await
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    /// Create the remote test inside an open session and record its id.
    pub(crate) async fn create_remote_test(
        &self,
        session: &dyn ControllerSession,
        config: &TestConfiguration,
    ) -> Result<String, OrchestratorError> {
        let remote_id = session.create_test(&config.payload).await?;
        if remote_id.trim().is_empty() {
            return Err(OrchestratorError::Api(format!(
                "controller returned an empty test id for configuration {}",
                config.id
            )));
        }

        self.store
            .set_remote_test_id(config.id, Some(&remote_id), Some(self.controller.target()))?;
        info!(config_id = config.id, remote_test_id = %remote_id, "remote test created");
        Ok(remote_id)
    }

    /// Store a new payload for a configuration and push it to the controller.
    pub async fn revise_definition(
        &self,
        config_id: i64,
        payload: Value,
    ) -> Result<TestConfiguration, OrchestratorError> {
        if !payload.is_object() {
            return Err(OrchestratorError::Validation(
                "configuration payload must be a JSON object".to_string(),
            ));
        }
        self.load_configuration(config_id)?;
        let updated = self.store.update_configuration_payload(config_id, &payload)?;
        self.update_remote_test(&updated).await?;
        self.load_configuration(config_id)
    }

    /// Delete a configuration locally and on the controller.
    ///
    /// Refused while runs still reference it. A remote test that is already
    /// gone counts as deleted.
    pub async fn retire_definition(&self, config_id: i64) -> Result<(), OrchestratorError> {
        let config = self.load_configuration(config_id)?;
        let runs = self.store.count_runs_for_configuration(config_id)?;
        if runs > 0 {
            return Err(OrchestratorError::Validation(format!(
                "configuration {} still has {} run(s)",
                config_id, runs
            )));
        }

        if let Some(remote_id) = config.remote_test_id_for(self.controller.target()) {
            let remote_id = remote_id.to_string();
            with_session(self.controller.as_ref(), |session| async move {
                match session.delete_test(&remote_id).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.is_not_found() => Ok(()),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;
        }

        self.store.delete_configuration(config_id)?;
        info!(config_id, "configuration retired");
        Ok(())
    }
}
