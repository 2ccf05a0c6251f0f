//! Match server connection: handshake, line pump and reconnect supervisor

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::session::LinkEvent;

use super::protocol::{self, ClientMsg, ServerMsg};

/// Outbound messages queued while the runtime is busy
const OUTBOUND_CAPACITY: usize = 64;

/// What the connection task reports to the runtime
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Link(LinkEvent),
    Message(ServerMsg),
}

/// Connection errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Connect failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("No welcome from server within {0:?}")]
    AckTimeout(Duration),

    #[error("Connection closed before welcome")]
    ClosedBeforeWelcome,

    #[error("Expected welcome, got {0:?}")]
    UnexpectedHandshake(Box<ServerMsg>),

    #[error("Malformed message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An acknowledged connection
pub struct Connection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    pub server_time: u64,
}

/// Connect and wait for the server's welcome. Both must finish within `ack_timeout`.
pub async fn connect(addr: SocketAddr, ack_timeout: Duration) -> Result<Connection, ChannelError> {
    timeout(ack_timeout, handshake(addr))
        .await
        .map_err(|_| ChannelError::AckTimeout(ack_timeout))?
}

async fn handshake(addr: SocketAddr) -> Result<Connection, ChannelError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(ChannelError::Connect)?;
    stream.set_nodelay(true)?;

    let (read, writer) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    let line = lines
        .next_line()
        .await?
        .ok_or(ChannelError::ClosedBeforeWelcome)?;

    match protocol::decode(&line).map_err(ChannelError::Decode)? {
        ServerMsg::Welcome { server_time } => Ok(Connection {
            lines,
            writer,
            server_time,
        }),
        other => Err(ChannelError::UnexpectedHandshake(Box::new(other))),
    }
}

/// Handle to the supervisor task
pub struct ChannelHandle {
    outbound: mpsc::Sender<ClientMsg>,
    task: JoinHandle<()>,
}

impl ChannelHandle {
    /// Sender for outbound messages. Messages queued while disconnected are dropped.
    pub fn outbound(&self) -> mpsc::Sender<ClientMsg> {
        self.outbound.clone()
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

/// Spawn the supervisor: connect, report, pump, and reconnect after `reconnect_delay`.
pub fn spawn(
    addr: SocketAddr,
    ack_timeout: Duration,
    reconnect_delay: Duration,
    events: mpsc::Sender<ChannelEvent>,
) -> ChannelHandle {
    let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let task = tokio::spawn(supervise(
        addr,
        ack_timeout,
        reconnect_delay,
        outbound_rx,
        events,
    ));
    ChannelHandle { outbound, task }
}

async fn supervise(
    addr: SocketAddr,
    ack_timeout: Duration,
    reconnect_delay: Duration,
    mut outbound: mpsc::Receiver<ClientMsg>,
    events: mpsc::Sender<ChannelEvent>,
) {
    loop {
        let event = match connect(addr, ack_timeout).await {
            Ok(conn) => {
                info!(addr = %addr, server_time = conn.server_time, "Connected to match server");
                if events.send(ChannelEvent::Link(LinkEvent::Connected)).await.is_err() {
                    return;
                }
                match pump(conn, &mut outbound, &events).await {
                    Some(reason) => {
                        warn!(reason = %reason, "Disconnected from match server");
                        LinkEvent::Disconnected(reason)
                    }
                    None => return,
                }
            }
            Err(e) => {
                warn!(addr = %addr, error = %e, "Connect attempt failed");
                LinkEvent::ConnectFailed(e.to_string())
            }
        };

        if events.send(ChannelEvent::Link(event)).await.is_err() {
            return;
        }

        tokio::time::sleep(reconnect_delay).await;

        // Anything queued belongs to the session the disconnect aborted
        let mut dropped = 0;
        while outbound.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "Discarded messages queued while disconnected");
        }
    }
}

/// Move lines both ways until the socket ends. Returns the disconnect reason,
/// or `None` once the runtime has gone away.
async fn pump(
    conn: Connection,
    outbound: &mut mpsc::Receiver<ClientMsg>,
    events: &mpsc::Sender<ChannelEvent>,
) -> Option<String> {
    let Connection {
        mut lines,
        mut writer,
        ..
    } = conn;

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match protocol::decode(&line) {
                    Ok(msg) => {
                        if events.send(ChannelEvent::Message(msg)).await.is_err() {
                            return None;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to parse server message"),
                },
                Ok(None) => return Some("server closed the connection".to_string()),
                Err(e) => return Some(e.to_string()),
            },
            msg = outbound.recv() => match msg {
                Some(msg) => {
                    if let Err(e) = write_msg(&mut writer, &msg).await {
                        return Some(e.to_string());
                    }
                }
                None => return None,
            },
        }
    }
}

/// Write one message as a JSON line
async fn write_msg(writer: &mut OwnedWriteHalf, msg: &ClientMsg) -> Result<(), ChannelError> {
    let mut line = protocol::encode(msg)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    Ok(())
}
