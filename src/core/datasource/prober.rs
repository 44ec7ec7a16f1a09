// src/core/datasource/prober.rs

use super::Inner;
use crate::core::DatasourceError;

/// Pings the installed handle. The lock is held only long enough to clone the
/// handle; the ping itself runs unlocked.
pub(crate) async fn probe(inner: &Inner) -> Result<(), DatasourceError> {
    let handle = inner
        .state
        .read()
        .handle
        .clone()
        .ok_or(DatasourceError::ConnectionUnavailable)?;
    handle
        .ping()
        .await
        .map_err(|e| DatasourceError::Unreachable(e.to_string()))
}
