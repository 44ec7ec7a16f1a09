// src/core/datasource/reconnector.rs

//! Builds a replacement connection and swaps it in.

use super::Inner;
use crate::core::DatasourceError;
use crate::core::client::Handle;
use tracing::debug;

/// Connects and verifies a fresh handle, then installs it in place of the
/// current one. The existing handle is left untouched unless the fresh one
/// answered its ping. The retired handle is closed on a detached task.
pub(crate) async fn reconnect(inner: &Inner) -> Result<(), DatasourceError> {
    let fresh = inner
        .connector
        .connect(&inner.settings)
        .await
        .map_err(|e| DatasourceError::ReconnectFailed(e.to_string()))?;

    if let Err(e) = fresh.ping().await {
        fresh.close().await;
        return Err(DatasourceError::ReconnectFailed(e.to_string()));
    }

    let swapped: Result<Option<Handle>, Handle> = {
        let mut state = inner.state.write();
        if state.closed {
            Err(fresh)
        } else {
            Ok(state.handle.replace(fresh))
        }
    };

    match swapped {
        Ok(retired) => {
            if let Some(old) = retired {
                debug!("Retiring replaced connection {}", old.identity());
                tokio::spawn(async move { old.close().await });
            }
            Ok(())
        }
        Err(fresh) => {
            fresh.close().await;
            Err(DatasourceError::ReconnectFailed(
                "datasource was closed".to_string(),
            ))
        }
    }
}
