// tests/integration/test_helpers.rs

//! Test helpers shared by the integration, unit and property suites: an
//! in-process RESP server, a scripted connector and polling utilities.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use indexmap::IndexMap;
use parking_lot::Mutex;
use spineldb_datasource::config::Settings;
use spineldb_datasource::core::DatasourceError;
use spineldb_datasource::core::client::{Connection, Connector, Handle};
use spineldb_datasource::core::protocol::{RespFrame, RespFrameCodec};
use spineldb_datasource::{Datasource, StatusReport};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tracing_subscriber::EnvFilter;

/// Installs a quiet test subscriber (ignored if one is already installed).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("warn"))
        .with_test_writer()
        .try_init();
}

/// Polls `condition` every 10ms until it holds or `timeout` elapses.
pub async fn wait_for<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Records every report delivered to `set_on`.
pub fn collect_reports(datasource: &Datasource) -> Arc<Mutex<Vec<StatusReport>>> {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();
    datasource.set_on(move |report| sink.lock().push(report));
    reports
}

/// Returns the collected reports ordered by tick.
pub fn sorted(reports: &Mutex<Vec<StatusReport>>) -> Vec<StatusReport> {
    let mut reports = reports.lock().clone();
    reports.sort_by_key(|r| r.tick());
    reports
}

/// Enabled settings with a short ping interval for supervisor tests.
pub fn fast_settings(ping_interval: Duration) -> Settings {
    Settings::builder()
        .enabled(true)
        .ping_interval(ping_interval)
        .build()
        .expect("valid settings")
}

// --- In-process RESP server ---

/// The data and credentials served by a [`FakeServer`].
#[derive(Default)]
pub struct FakeStore {
    keys: Mutex<IndexMap<Bytes, &'static str>>,
    password: Option<String>,
    commands: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn with_password(password: &str) -> Self {
        Self {
            password: Some(password.to_string()),
            ..Self::default()
        }
    }

    pub fn insert(&self, key: impl AsRef<[u8]>, kind: &'static str) {
        self.keys
            .lock()
            .insert(Bytes::copy_from_slice(key.as_ref()), kind);
    }

    /// Every command name received, upper-cased, in arrival order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    async fn handle(&self, frame: RespFrame, authenticated: &mut bool) -> RespFrame {
        let raw: Vec<Bytes> = match frame {
            RespFrame::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    RespFrame::BulkString(b) => Some(b),
                    _ => None,
                })
                .collect(),
            _ => return RespFrame::Error("ERR protocol error".into()),
        };
        let args: Vec<String> = raw
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect();
        let Some(name) = args.first().map(|s| s.to_ascii_uppercase()) else {
            return RespFrame::Error("ERR empty command".into());
        };
        self.commands.lock().push(name.clone());

        if name == "AUTH" {
            return match (&self.password, args.last()) {
                (Some(expected), Some(given)) if args.len() > 1 && expected == given => {
                    *authenticated = true;
                    RespFrame::SimpleString("OK".into())
                }
                _ => RespFrame::Error(
                    "WRONGPASS invalid username-password pair or user is disabled.".into(),
                ),
            };
        }
        if !*authenticated {
            return RespFrame::Error("NOAUTH Authentication required.".into());
        }

        match name.as_str() {
            "PING" => RespFrame::SimpleString("PONG".into()),
            "SELECT" => RespFrame::SimpleString("OK".into()),
            "TYPE" => {
                let kind = raw
                    .get(1)
                    .and_then(|key| self.keys.lock().get(key).copied())
                    .unwrap_or("none");
                RespFrame::SimpleString(kind.into())
            }
            "SCAN" => self.scan(&args, &raw),
            "DEBUG" => {
                let secs: f64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(0.0);
                tokio::time::sleep(Duration::from_secs_f64(secs)).await;
                RespFrame::SimpleString("OK".into())
            }
            other => RespFrame::Error(format!("ERR unknown command '{other}'")),
        }
    }

    // Pages over insertion order and filters each page, so pages may come back empty.
    fn scan(&self, args: &[String], raw: &[Bytes]) -> RespFrame {
        let cursor: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(0);
        let mut pattern = Bytes::from_static(b"*");
        let mut count = 10usize;
        let mut i = 2;
        while i + 1 < args.len() {
            match args[i].to_ascii_uppercase().as_str() {
                "MATCH" => pattern = raw[i + 1].clone(),
                "COUNT" => count = args[i + 1].parse().unwrap_or(10),
                _ => {}
            }
            i += 2;
        }

        let keys: Vec<Bytes> = self.keys.lock().keys().cloned().collect();
        let end = (cursor + count).min(keys.len());
        let page: Vec<RespFrame> = keys
            .get(cursor..end)
            .unwrap_or(&[])
            .iter()
            .filter(|k| glob_match(&pattern, k))
            .map(|k| RespFrame::BulkString(k.clone()))
            .collect();
        let next = if end >= keys.len() {
            "0".to_string()
        } else {
            end.to_string()
        };
        RespFrame::Array(vec![
            RespFrame::BulkString(Bytes::from(next)),
            RespFrame::Array(page),
        ])
    }
}

/// Minimal glob matching supporting `*` and `?`.
pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((b'*', rest)) => (0..=text.len()).any(|i| glob_match(rest, &text[i..])),
        Some((b'?', rest)) => !text.is_empty() && glob_match(rest, &text[1..]),
        Some((c, rest)) => text.first() == Some(c) && glob_match(rest, &text[1..]),
    }
}

/// A RESP server on a loopback port. Stopping it aborts the listener and every
/// open connection; restarting binds the same port again.
pub struct FakeServer {
    addr: SocketAddr,
    store: Arc<FakeStore>,
    task: Option<JoinHandle<()>>,
}

impl FakeServer {
    pub async fn start() -> Self {
        Self::start_with(FakeStore::default()).await
    }

    pub async fn start_with(store: FakeStore) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake server");
        let addr = listener.local_addr().expect("local addr");
        let store = Arc::new(store);
        let task = tokio::spawn(accept_loop(listener, store.clone()));
        Self {
            addr,
            store,
            task: Some(task),
        }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn store(&self) -> &FakeStore {
        &self.store
    }

    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }

    pub async fn restart(&mut self) {
        self.stop().await;
        for _ in 0..100 {
            if let Ok(listener) = TcpListener::bind(self.addr).await {
                self.task = Some(tokio::spawn(accept_loop(listener, self.store.clone())));
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("could not rebind fake server on {}", self.addr);
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn accept_loop(listener: TcpListener, store: Arc<FakeStore>) {
    // Dropping the set when this task is aborted aborts every connection.
    let mut connections = JoinSet::new();
    loop {
        if let Ok((socket, _)) = listener.accept().await {
            connections.spawn(serve(socket, store.clone()));
        }
    }
}

#[cfg(unix)]
pub fn spawn_unix_server(path: &std::path::Path, store: Arc<FakeStore>) -> JoinHandle<()> {
    let listener = tokio::net::UnixListener::bind(path).expect("bind unix socket");
    tokio::spawn(async move {
        let mut connections = JoinSet::new();
        loop {
            if let Ok((socket, _)) = listener.accept().await {
                connections.spawn(serve(socket, store.clone()));
            }
        }
    })
}

async fn serve<S>(socket: S, store: Arc<FakeStore>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(socket, RespFrameCodec);
    let mut authenticated = store.password.is_none();
    while let Some(Ok(frame)) = framed.next().await {
        let reply = store.handle(frame, &mut authenticated).await;
        if framed.send(reply).await.is_err() {
            break;
        }
    }
}

// --- Scripted connector ---

/// A connection whose health follows a shared switch.
#[derive(Debug)]
pub struct MockConnection {
    id: usize,
    identity: String,
    healthy: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl MockConnection {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn ping(&self) -> Result<(), DatasourceError> {
        if self.is_closed() {
            return Err(DatasourceError::ConnectionClosed);
        }
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(std::io::Error::from(std::io::ErrorKind::ConnectionReset).into());
        }
        Ok(())
    }

    async fn execute(&self, _args: Vec<Bytes>) -> Result<RespFrame, DatasourceError> {
        self.ping().await?;
        Ok(RespFrame::SimpleString("OK".into()))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    fn stats(&self) -> Vec<(&'static str, String)> {
        vec![("mock_id", self.id.to_string())]
    }
}

/// A connector driven by two switches: `reachable` decides whether `connect`
/// succeeds, `healthy` whether pings on any of its connections succeed.
#[derive(Default)]
pub struct MockConnector {
    reachable: AtomicBool,
    healthy: Arc<AtomicBool>,
    connect_delay: Mutex<Duration>,
    created: Mutex<Vec<Arc<MockConnection>>>,
    refused: AtomicUsize,
}

impl MockConnector {
    /// A connector for a store that is up.
    pub fn up() -> Arc<Self> {
        let connector = Arc::new(Self::default());
        connector.set_store_up(true);
        connector
    }

    /// A connector for a store that refuses connections.
    pub fn down() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_store_up(&self, up: bool) {
        self.reachable.store(up, Ordering::SeqCst);
        self.healthy.store(up, Ordering::SeqCst);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = delay;
    }

    pub fn connect_calls(&self) -> usize {
        self.created.lock().len() + self.refused.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> Vec<Arc<MockConnection>> {
        self.created.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _settings: &Settings) -> Result<Handle, DatasourceError> {
        let delay = *self.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if !self.reachable.load(Ordering::SeqCst) {
            self.refused.fetch_add(1, Ordering::SeqCst);
            return Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into());
        }
        let mut created = self.created.lock();
        let id = created.len() + 1;
        let connection = Arc::new(MockConnection {
            id,
            identity: format!("mock://{id}"),
            healthy: self.healthy.clone(),
            closed: AtomicBool::new(false),
        });
        created.push(connection.clone());
        let handle: Handle = connection;
        Ok(handle)
    }
}
