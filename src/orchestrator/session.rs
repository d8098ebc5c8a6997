//! Scoped controller sessions.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use super::OrchestratorError;
use crate::controller::{Controller, ControllerSession};

/// Logs the session out if the owning future is dropped before completion.
struct LogoutGuard {
    session: Option<Arc<dyn ControllerSession>>,
}

impl LogoutGuard {
    fn disarm(&mut self) -> Option<Arc<dyn ControllerSession>> {
        self.session.take()
    }
}

impl Drop for LogoutGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = session.logout().await {
                        warn!(error = %e, "logout after cancelled call failed");
                    }
                });
            }
            Err(_) => warn!("controller session dropped outside a runtime; logout skipped"),
        }
    }
}

/// Log in, run `f` with the session, and log out on every exit path.
///
/// A login failure of any kind is reported as `Connection`. Logout failures
/// are logged and never replace the result of `f`.
pub async fn with_session<T, F, Fut>(
    controller: &dyn Controller,
    f: F,
) -> Result<T, OrchestratorError>
where
    F: FnOnce(Arc<dyn ControllerSession>) -> Fut,
    Fut: Future<Output = Result<T, OrchestratorError>>,
{
    let session = controller.login().await.map_err(|e| {
        OrchestratorError::Connection(format!(
            "login to {} failed: {}",
            controller.target(),
            e
        ))
    })?;
    let mut guard = LogoutGuard {
        session: Some(session.clone()),
    };

    let result = f(session).await;

    if let Some(session) = guard.disarm() {
        match session.logout().await {
            Ok(()) => debug!(controller = controller.target(), "controller session closed"),
            Err(e) => warn!(controller = controller.target(), error = %e, "logout failed"),
        }
    }
    result
}
