// src/core/client/connection.rs

//! A single request/response connection to the store, with the handshake
//! (`AUTH`, `SELECT`) performed right after dialing.

use super::stream::ClientStream;
use crate::config::{ConnectionSettings, Settings};
use crate::core::DatasourceError;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_util::codec::{Decoder, Encoder};

pub(crate) struct RespConnection {
    stream: ClientStream,
    codec: RespFrameCodec,
    read_buf: BytesMut,
    write_buf: BytesMut,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl RespConnection {
    /// Dials the store and authenticates. The returned connection is ready for commands.
    pub(crate) async fn connect(settings: &Settings) -> Result<Self, DatasourceError> {
        let stream = ClientStream::connect(settings.connection(), settings.timeout().connect).await?;
        let mut conn = Self {
            stream,
            codec: RespFrameCodec,
            read_buf: BytesMut::with_capacity(4096),
            write_buf: BytesMut::with_capacity(256),
            read_timeout: settings.timeout().read,
            write_timeout: settings.timeout().write,
        };
        conn.handshake(settings.connection()).await?;
        Ok(conn)
    }

    async fn handshake(&mut self, settings: &ConnectionSettings) -> Result<(), DatasourceError> {
        if let Some(password) = &settings.password {
            let mut args: Vec<Bytes> = vec![Bytes::from_static(b"AUTH")];
            if let Some(username) = &settings.username {
                args.push(Bytes::from(username.clone()));
            }
            args.push(Bytes::from(password.clone()));
            self.expect_ok(RespFrame::command(args)).await?;
        }

        if settings.database != 0 {
            let args: Vec<Bytes> = vec![
                Bytes::from_static(b"SELECT"),
                Bytes::from(settings.database.to_string()),
            ];
            self.expect_ok(RespFrame::command(args)).await?;
        }
        Ok(())
    }

    async fn expect_ok(&mut self, frame: RespFrame) -> Result<(), DatasourceError> {
        match self.send_and_receive(frame).await? {
            RespFrame::SimpleString(_) => Ok(()),
            RespFrame::Error(msg) => Err(DatasourceError::Server(msg)),
            other => Err(DatasourceError::Protocol(format!(
                "unexpected handshake reply: {other:?}"
            ))),
        }
    }

    /// Sends one frame and waits for exactly one reply frame. Any error leaves
    /// the connection in an unknown state; callers must discard it.
    pub(crate) async fn send_and_receive(
        &mut self,
        frame: RespFrame,
    ) -> Result<RespFrame, DatasourceError> {
        self.write_buf.clear();
        self.codec.encode(frame, &mut self.write_buf)?;

        match timeout(self.write_timeout, self.stream.write_all(&self.write_buf)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(DatasourceError::Timeout("writing a command")),
        }

        loop {
            if let Some(reply) = self.codec.decode(&mut self.read_buf)? {
                return Ok(reply);
            }
            match timeout(self.read_timeout, self.stream.read_buf(&mut self.read_buf)).await {
                Ok(Ok(0)) => return Err(DatasourceError::ConnectionClosed),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(DatasourceError::Timeout("waiting for a reply")),
            }
        }
    }
}
