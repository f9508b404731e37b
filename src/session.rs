//! HFP session state machine and receive loop.
//!
//! A session owns one already-connected RFCOMM byte stream, handed over
//! by the Bluetooth daemon after channel negotiation. It reads AT command
//! lines, acknowledges every accessory-event line with `OK`, and closes
//! as soon as the phone reports its battery level.

use bytes::BytesMut;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::protocol::at::{self, CommandLine};
use crate::protocol::FeatureSet;

/// Maximum bytes consumed from the stream per read.
pub const READ_BUFFER_SIZE: usize = 1024;

/// Indicator query optionally sent when a session starts.
const INDICATOR_QUERY: &[u8] = b"AT+CIND: (\"battchg\",(0-5))";

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Stream active, awaiting data.
    #[default]
    Open,
    /// Local or remote termination requested; stream about to be released.
    Closing,
    /// Terminal: stream released. No transition leaves this state.
    Closed,
}

impl SessionState {
    /// Check if the session has fully closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The phone reported its battery level; the session closed promptly
    /// afterwards, having no further work.
    BatteryLevel(u8),
    /// The peer closed the stream or the stream failed.
    ConnectionLost,
    /// The Connection Broker asked us to disconnect.
    Disconnected,
}

impl std::fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BatteryLevel(pct) => write!(f, "battery level {pct}%"),
            Self::ConnectionLost => write!(f, "connection lost"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// State shared between a running session and its handles.
struct Shared {
    state: RwLock<SessionState>,
    cancel: Notify,
}

/// Clonable handle to a session, used by the Connection Broker side to
/// observe and cancel it while the receive loop owns the stream.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    /// Get the current session state.
    pub fn state(&self) -> SessionState {
        *self.shared.state.read()
    }

    /// Check whether two handles refer to the same session.
    pub fn is_same_session(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Request disconnection.
    ///
    /// Marks the session `Closing` and wakes the receive loop, which
    /// releases the stream without waiting for in-flight data. Idempotent:
    /// calling this on an already-closed session is a no-op.
    pub fn request_disconnect(&self) {
        {
            let mut state = self.shared.state.write();
            if state.is_closed() {
                return;
            }
            *state = SessionState::Closing;
        }

        // The permit persists if the loop is not yet parked on a read.
        self.shared.cancel.notify_one();
    }
}

/// A single HFP service-level connection to a phone.
///
/// Constructed with [`start`](Self::start) once the Bluetooth daemon
/// hands over the connected stream; driven by [`run`](Self::run), which
/// consumes the session and returns its outcome. The stream is owned
/// exclusively and released exactly once, on every exit path.
pub struct HfpSession<S> {
    stream: S,
    version: u16,
    features: FeatureSet,
    initial_query: bool,
    shared: Arc<Shared>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> HfpSession<S> {
    /// Construct a session in the `Open` state, taking exclusive
    /// ownership of `stream`.
    ///
    /// `version` and `features` are the values negotiated by the
    /// Bluetooth daemon. Nothing is sent on the stream until the phone
    /// speaks first, unless [`with_initial_query`](Self::with_initial_query)
    /// is enabled.
    pub fn start(stream: S, version: u16, features: FeatureSet) -> Self {
        debug!("Version {version:#06x} Features {features}");

        Self {
            stream,
            version,
            features,
            initial_query: false,
            shared: Arc::new(Shared {
                state: RwLock::new(SessionState::Open),
                cancel: Notify::new(),
            }),
        }
    }

    /// Enable or disable the initial battery-indicator query.
    ///
    /// Disabled by default: most handsets volunteer the accessory event
    /// without prompting.
    pub fn with_initial_query(mut self, enabled: bool) -> Self {
        self.initial_query = enabled;
        self
    }

    /// Get a handle for observing and cancelling this session.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: self.shared.clone(),
        }
    }

    /// Get the current session state.
    pub fn state(&self) -> SessionState {
        *self.shared.state.read()
    }

    /// The protocol version negotiated for this session.
    pub fn version(&self) -> u16 {
        self.version
    }

    /// The feature bitmask negotiated for this session.
    pub fn features(&self) -> FeatureSet {
        self.features
    }

    /// Run the read-driven receive loop until the session ends.
    ///
    /// Suspends between reads; never busy-waits and never blocks the
    /// executor. Errors are confined to this session: the loop always
    /// returns an outcome.
    pub async fn run(mut self) -> SessionOutcome {
        if self.initial_query && self.send_cmd(INDICATOR_QUERY).await.is_err() {
            return self.close(SessionOutcome::ConnectionLost);
        }

        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

        let outcome = loop {
            if self.state() != SessionState::Open {
                break SessionOutcome::Disconnected;
            }

            buf.clear();

            // None means cancellation won the race against the read.
            let read = tokio::select! {
                _ = self.shared.cancel.notified() => None,
                read = self.stream.read_buf(&mut buf) => Some(read),
            };

            match read {
                None => break SessionOutcome::Disconnected,
                Some(Ok(0)) => {
                    debug!("Peer closed stream");
                    break SessionOutcome::ConnectionLost;
                }
                Some(Ok(_)) => match self.process_buffer(&buf).await {
                    Ok(Some(percentage)) => {
                        info!("Battery level is {percentage}%");
                        break SessionOutcome::BatteryLevel(percentage);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("Stream write failed: {e}");
                        break SessionOutcome::ConnectionLost;
                    }
                },
                Some(Err(e)) => {
                    warn!("Stream read failed: {e}");
                    break SessionOutcome::ConnectionLost;
                }
            }
        };

        self.close(outcome)
    }

    /// Process one read's worth of bytes, acknowledging lines and
    /// scanning for the battery report.
    ///
    /// Returns the battery percentage once found. An `Err` here means the
    /// acknowledgement could not be written; malformed lines are dropped
    /// and never surface.
    async fn process_buffer(&mut self, buf: &[u8]) -> Result<Option<u8>> {
        for line in at::split_lines(buf) {
            debug!("Received: {line}");

            // The peer acknowledging one of our commands needs no reply.
            if line.is_acknowledgement() {
                continue;
            }

            // Every accessory-event line is acknowledged before it is
            // interpreted, understood or not.
            self.send_cmd(at::ACK_OK.as_bytes()).await?;

            if let Some(percentage) = self.interpret(&line) {
                return Ok(Some(percentage));
            }
        }

        Ok(None)
    }

    /// Interpret a single non-acknowledgement line.
    fn interpret(&self, line: &CommandLine) -> Option<u8> {
        match at::parse_accessory_event(line) {
            Ok(Some(report)) => report.battery_percentage(),
            Ok(None) => None,
            Err(e) => {
                debug!("Dropping line: {e}");
                None
            }
        }
    }

    /// Send a command framed with line terminators on both sides.
    async fn send_cmd(&mut self, cmd: &[u8]) -> Result<()> {
        debug!("Sending: {}", String::from_utf8_lossy(cmd));

        self.stream.write_all(at::LINE_TERMINATOR).await?;
        self.stream.write_all(cmd).await?;
        self.stream.write_all(at::LINE_TERMINATOR).await?;
        self.stream.flush().await?;

        Ok(())
    }

    /// Transition to `Closed` and release the stream.
    fn close(self, outcome: SessionOutcome) -> SessionOutcome {
        *self.shared.state.write() = SessionState::Closed;
        debug!("Session closed: {outcome}");

        // Consuming self drops the stream; it is never touched again.
        outcome
    }
}
