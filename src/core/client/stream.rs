// src/core/client/stream.rs

//! A transport that is either a TCP socket or a Unix domain socket, so the
//! connection logic can stay generic over how the store is reached.

use crate::config::{ConnectionSettings, Network};
use crate::core::DatasourceError;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

pub(crate) enum ClientStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ClientStream {
    /// Dials the configured address, failing with `Timeout` after `connect_timeout`.
    pub(crate) async fn connect(
        settings: &ConnectionSettings,
        connect_timeout: Duration,
    ) -> Result<Self, DatasourceError> {
        tokio::time::timeout(connect_timeout, Self::dial(settings))
            .await
            .map_err(|_| DatasourceError::Timeout("connecting"))?
    }

    async fn dial(settings: &ConnectionSettings) -> Result<Self, DatasourceError> {
        match settings.network {
            Network::Tcp => {
                let stream = TcpStream::connect(settings.address.as_str()).await?;
                stream.set_nodelay(true)?;
                Ok(ClientStream::Tcp(stream))
            }
            #[cfg(unix)]
            Network::Unix => Ok(ClientStream::Unix(
                UnixStream::connect(settings.address.as_str()).await?,
            )),
            #[cfg(not(unix))]
            Network::Unix => Err(DatasourceError::InvalidConfig(
                "unix sockets are not supported on this platform".to_string(),
            )),
        }
    }
}

// --- Trait Implementations for ClientStream ---
// These implementations simply delegate the calls to the underlying stream type.

impl AsyncRead for ClientStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ClientStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            ClientStream::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ClientStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, std::io::Error>> {
        match self.get_mut() {
            ClientStream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            ClientStream::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), std::io::Error>> {
        match self.get_mut() {
            ClientStream::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            ClientStream::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        match self.get_mut() {
            ClientStream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            ClientStream::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
