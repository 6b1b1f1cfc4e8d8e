//! SSH executor (C4): a keyed pool of long-lived `ssh2` transports, a
//! request/response command runner, structured probe-output parsers, and an
//! interactive PTY channel for the web-socket terminal.

pub mod parsers;

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use ssh2::Session;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{info, warn};

use crate::error::XanthusError;

pub use parsers::{DiskUsage, HostHealth, MemoryRow};

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct PoolKey {
    pub host: String,
    pub port: u16,
    pub user: String,
}

impl PoolKey {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
        }
    }
}

struct PooledConn {
    session: Arc<StdMutex<Session>>,
    last_used: Instant,
}

pub struct SshPool {
    conns: Mutex<HashMap<PoolKey, PooledConn>>,
    dial_timeout: Duration,
    idle_timeout: Duration,
}

pub struct ExecResult {
    pub stdout: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl SshPool {
    pub fn new(dial_timeout: Duration, idle_timeout: Duration) -> Self {
        Self {
            conns: Mutex::new(HashMap::new()),
            dial_timeout,
            idle_timeout,
        }
    }

    /// Closes connections idle longer than `idle_timeout`. Intended to be
    /// driven by a `tokio::time::interval` loop spawned at startup.
    pub async fn reap_idle(&self) {
        let mut conns = self.conns.lock().await;
        let idle_timeout = self.idle_timeout;
        let before = conns.len();
        conns.retain(|_, conn| conn.last_used.elapsed() < idle_timeout);
        let reaped = before - conns.len();
        if reaped > 0 {
            info!(reaped, "reaped idle ssh connections");
        }
    }

    /// Drops any pooled connection for `key`, e.g. after a host is deleted.
    pub async fn evict(&self, key: &PoolKey) {
        self.conns.lock().await.remove(key);
    }

    async fn get_or_connect(
        &self,
        key: &PoolKey,
        private_key_pem: &str,
    ) -> Result<Arc<StdMutex<Session>>, XanthusError> {
        {
            let mut conns = self.conns.lock().await;
            if let Some(conn) = conns.get_mut(key) {
                conn.last_used = Instant::now();
                return Ok(conn.session.clone());
            }
        }

        let session = dial(key, private_key_pem, self.dial_timeout).await?;
        let session = Arc::new(StdMutex::new(session));
        self.conns.lock().await.insert(
            key.clone(),
            PooledConn {
                session: session.clone(),
                last_used: Instant::now(),
            },
        );
        Ok(session)
    }

    /// Runs `command`, capturing combined stdout+stderr. No stdin; the
    /// session is closed after the command completes.
    pub async fn execute(
        &self,
        key: &PoolKey,
        private_key_pem: &str,
        command: &str,
        deadline: Duration,
    ) -> Result<ExecResult, XanthusError> {
        let session = self.get_or_connect(key, private_key_pem).await?;
        let command = command.to_string();
        let host_id = key.host.clone();

        let work = tokio::task::spawn_blocking(move || run_command(&session, &command));

        match tokio::time::timeout(deadline, work).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(e))) => Err(XanthusError::SSHFailure { host_id, source: e }),
            Ok(Err(join_err)) => Err(XanthusError::SSHFailure {
                host_id,
                source: anyhow::anyhow!(join_err),
            }),
            Err(_) => {
                self.evict(key).await;
                Err(XanthusError::Timeout)
            }
        }
    }

    /// Runs the fixed probe command vector, aggregating results even if
    /// some individually fail.
    pub async fn health_probe(
        &self,
        key: &PoolKey,
        private_key_pem: &str,
        deadline: Duration,
        extra_services: &[String],
    ) -> HostHealth {
        let sentinel = self
            .execute(
                key,
                private_key_pem,
                "cat /opt/xanthus/status 2>/dev/null || echo UNKNOWN",
                deadline,
            )
            .await
            .map(|r| r.stdout.trim().to_string())
            .unwrap_or_else(|_| "UNKNOWN".to_string());

        let reachable = sentinel != "UNKNOWN"
            || self
                .execute(key, private_key_pem, "true", deadline)
                .await
                .is_ok();

        let k3s_status = self
            .execute(key, private_key_pem, "systemctl is-active k3s", deadline)
            .await
            .map(|r| r.stdout.trim().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let uptime = self
            .execute(key, private_key_pem, "uptime", deadline)
            .await
            .map(|r| r.stdout.trim().to_string())
            .unwrap_or_default();

        let memory = self
            .execute(key, private_key_pem, "free -h", deadline)
            .await
            .map(|r| parsers::parse_free(&r.stdout))
            .unwrap_or_default();

        let disk = self
            .execute(key, private_key_pem, "df -h /", deadline)
            .await
            .map(|r| parsers::parse_df(&r.stdout))
            .unwrap_or(None);

        let mut services = vec![("ssh".to_string(), {
            self.execute(key, private_key_pem, "systemctl is-active ssh", deadline)
                .await
                .map(|r| r.stdout.trim().to_string())
                .unwrap_or_else(|_| "unknown".to_string())
        })];
        for svc in extra_services {
            let status = self
                .execute(
                    key,
                    private_key_pem,
                    &format!("systemctl is-active {svc}"),
                    deadline,
                )
                .await
                .map(|r| r.stdout.trim().to_string())
                .unwrap_or_else(|_| "unknown".to_string());
            services.push((svc.clone(), status));
        }

        HostHealth {
            setup_status: sentinel,
            reachable,
            k3s_status,
            uptime,
            memory,
            disk,
            services,
        }
    }

    /// Opens a PTY-backed login shell and returns a stdin sink, a stdout
    /// source, and an idempotent closer. The pump runs on a dedicated
    /// blocking thread for the lifetime of the session.
    pub async fn interactive_session(
        &self,
        key: &PoolKey,
        private_key_pem: &str,
    ) -> Result<InteractiveSession, XanthusError> {
        let session = self.get_or_connect(key, private_key_pem).await?;
        let host_id = key.host.clone();

        let (stdin_tx, stdin_rx) = mpsc::channel::<Vec<u8>>(64);
        let (stdout_tx, stdout_rx) = mpsc::channel::<Vec<u8>>(64);
        let (resize_tx, resize_rx) = mpsc::channel::<(u32, u32)>(8);
        let (close_tx, close_rx) = oneshot::channel::<()>();

        std::thread::spawn(move || {
            if let Err(e) = pump_pty(session, stdin_rx, stdout_tx, resize_rx, close_rx) {
                warn!(host_id = %host_id, error = ?e, "interactive session ended with error");
            }
        });

        Ok(InteractiveSession {
            stdin: stdin_tx,
            stdout: stdout_rx,
            resize: resize_tx,
            close: Some(close_tx),
        })
    }
}

pub struct InteractiveSession {
    pub stdin: mpsc::Sender<Vec<u8>>,
    pub stdout: mpsc::Receiver<Vec<u8>>,
    pub resize: mpsc::Sender<(u32, u32)>,
    close: Option<oneshot::Sender<()>>,
}

impl InteractiveSession {
    /// Idempotent: a second call is a no-op.
    pub fn close(&mut self) {
        if let Some(tx) = self.close.take() {
            let _ = tx.send(());
        }
    }
}

async fn dial(
    key: &PoolKey,
    private_key_pem: &str,
    dial_timeout: Duration,
) -> Result<Session, XanthusError> {
    let key = key.clone();
    let private_key_pem = private_key_pem.to_string();
    let host_id = key.host.clone();

    tokio::time::timeout(
        dial_timeout,
        tokio::task::spawn_blocking(move || connect_blocking(&key, &private_key_pem)),
    )
    .await
    .map_err(|_| XanthusError::Timeout)?
    .map_err(|join_err| XanthusError::SSHFailure {
        host_id: host_id.clone(),
        source: anyhow::anyhow!(join_err),
    })?
    .map_err(|source| XanthusError::SSHFailure { host_id, source })
}

fn connect_blocking(key: &PoolKey, private_key_pem: &str) -> anyhow::Result<Session> {
    let tcp = TcpStream::connect((key.host.as_str(), key.port))?;
    let mut session = Session::new()?;
    session.set_tcp_stream(tcp);
    session.handshake()?;
    session.userauth_pubkey_memory(&key.user, None, private_key_pem, None)?;
    anyhow::ensure!(session.authenticated(), "ssh authentication failed");
    Ok(session)
}

fn run_command(session: &Arc<StdMutex<Session>>, command: &str) -> anyhow::Result<ExecResult> {
    let started = Instant::now();
    let session = session.lock().map_err(|_| anyhow::anyhow!("session lock poisoned"))?;
    let mut channel = session.channel_session()?;
    channel.exec(command)?;
    let mut stdout = String::new();
    channel.read_to_string(&mut stdout)?;
    channel.wait_close()?;
    let exit_code = channel.exit_status()?;
    Ok(ExecResult {
        stdout,
        exit_code,
        duration: started.elapsed(),
    })
}

fn pump_pty(
    session: Arc<StdMutex<Session>>,
    mut stdin_rx: mpsc::Receiver<Vec<u8>>,
    stdout_tx: mpsc::Sender<Vec<u8>>,
    mut resize_rx: mpsc::Receiver<(u32, u32)>,
    mut close_rx: oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    // Held for the whole interactive session: a PTY channel borrows its
    // parent session, so the lock can't be dropped and reacquired per loop
    // iteration the way `run_command` does for one-shot execs.
    let session = session.lock().map_err(|_| anyhow::anyhow!("session lock poisoned"))?;
    session.set_blocking(false);
    let mut channel = session.channel_session()?;
    channel.request_pty("xterm", None, Some((80, 24, 0, 0)))?;
    channel.shell()?;

    let mut buf = [0u8; 4096];
    loop {
        if close_rx.try_recv().is_ok() {
            break;
        }
        if let Ok((cols, rows)) = resize_rx.try_recv() {
            let _ = channel.request_pty_size(cols, rows, None, None);
        }
        if let Ok(data) = stdin_rx.try_recv() {
            channel.write_all(&data)?;
        }
        match channel.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if stdout_tx.blocking_send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(e) => return Err(e.into()),
        }
    }
    let _ = channel.close();
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusProbe {
    pub setup_status: String,
    pub setup_message: String,
    pub reachable: bool,
}
