// src/core/datasource/scan.rs

//! Key enumeration over `SCAN`, with each key's type resolved through `TYPE`.

use crate::core::DatasourceError;
use crate::core::client::Handle;
use crate::core::protocol::RespFrame;
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use indexmap::IndexSet;
use serde::Serialize;

/// How many `TYPE` lookups may be in flight at once.
const TYPE_LOOKUP_CONCURRENCY: usize = 16;

/// A key found by [`Datasource::scan_keys`](super::Datasource::scan_keys) and its type
/// (`string`, `list`, `hash`, ...). Key names that are not valid UTF-8 are
/// rendered lossily; their type is still looked up with the exact bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyEntry {
    pub key: String,
    pub kind: String,
}

pub(crate) async fn scan_keys(
    handle: Handle,
    pattern: &str,
    count: usize,
) -> Result<Vec<KeyEntry>, DatasourceError> {
    let count = count.max(1).to_string();
    let mut cursor = String::from("0");
    // SCAN may return a key more than once.
    let mut keys: IndexSet<Bytes> = IndexSet::new();

    loop {
        let args = vec![
            Bytes::from_static(b"SCAN"),
            Bytes::from(cursor.clone()),
            Bytes::from_static(b"MATCH"),
            Bytes::copy_from_slice(pattern.as_bytes()),
            Bytes::from_static(b"COUNT"),
            Bytes::from(count.clone()),
        ];
        let (next, batch) = parse_scan_reply(handle.execute(args).await?)?;
        keys.extend(batch);
        if next == "0" {
            break;
        }
        cursor = next;
    }

    stream::iter(keys)
        .map(|key| {
            let handle = handle.clone();
            async move {
                let reply = handle
                    .execute(vec![Bytes::from_static(b"TYPE"), key.clone()])
                    .await?;
                let kind = reply
                    .as_str()
                    .ok_or_else(|| {
                        DatasourceError::Protocol(format!("unexpected TYPE reply: {reply:?}"))
                    })?
                    .to_string();
                Ok::<_, DatasourceError>(KeyEntry {
                    key: String::from_utf8_lossy(&key).into_owned(),
                    kind,
                })
            }
        })
        .buffered(TYPE_LOOKUP_CONCURRENCY)
        .try_collect()
        .await
}

fn parse_scan_reply(reply: RespFrame) -> Result<(String, Vec<Bytes>), DatasourceError> {
    let mut parts = match reply {
        RespFrame::Array(parts) => parts,
        other => {
            return Err(DatasourceError::Protocol(format!(
                "unexpected SCAN reply: {other:?}"
            )));
        }
    };
    if parts.len() != 2 {
        return Err(DatasourceError::Protocol(format!(
            "SCAN reply has {} elements, expected 2",
            parts.len()
        )));
    }
    let keys = parts.pop();
    let cursor = parts.pop();

    let cursor = cursor
        .as_ref()
        .and_then(RespFrame::as_str)
        .ok_or_else(|| DatasourceError::Protocol("SCAN cursor is not a string".to_string()))?
        .to_string();

    let keys = match keys {
        Some(RespFrame::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                RespFrame::BulkString(b) => Ok(b),
                RespFrame::SimpleString(s) => Ok(Bytes::from(s)),
                other => Err(DatasourceError::Protocol(format!(
                    "unexpected key in SCAN reply: {other:?}"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?,
        other => {
            return Err(DatasourceError::Protocol(format!(
                "SCAN key list is not an array: {other:?}"
            )));
        }
    };
    Ok((cursor, keys))
}
