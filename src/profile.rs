//! Profile registry for active HFP sessions.
//!
//! The Bluetooth daemon registers this accessory as a Hands-Free Audio
//! Gateway profile handler and then drives it through three calls: a new
//! connection delivers a connected RFCOMM stream, a disconnection request
//! names a connection to tear down, and release shuts the whole handler
//! down. [`HfpProfile`] owns the mapping from the daemon's object path to
//! the session serving it.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::protocol::FeatureSet;
use crate::session::{HfpSession, SessionHandle, SessionOutcome};

/// Bluetooth Hands-Free Audio Gateway service class UUID, used when
/// registering this profile with the Bluetooth daemon.
pub const HFP_AG_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1112_0000_1000_8000_00805f9b34fb);

/// HFP protocol version assumed when the daemon reports none.
pub const DEFAULT_HFP_VERSION: u16 = 0x0105;

/// Connection properties delivered by the Bluetooth daemon alongside a
/// new stream. Absent values fall back to protocol defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionProperties {
    /// Negotiated HFP version, if the daemon reported one.
    pub version: Option<u16>,
    /// Negotiated feature bitmask, if the daemon reported one.
    pub features: Option<u16>,
}

impl ConnectionProperties {
    /// The negotiated version, or [`DEFAULT_HFP_VERSION`].
    pub fn version_or_default(&self) -> u16 {
        self.version.unwrap_or(DEFAULT_HFP_VERSION)
    }

    /// The negotiated features, or an empty set.
    pub fn features_or_default(&self) -> FeatureSet {
        FeatureSet::from_bits(self.features.unwrap_or(0))
    }
}

/// Options for registering the profile with the Bluetooth daemon.
///
/// These mirror the daemon's registration dictionary; they do not affect
/// protocol behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileOptions {
    /// Object path the profile handler is exported under.
    pub path: String,
    /// Display name for the profile, if any.
    pub name: Option<String>,
    /// Fixed RFCOMM channel number; the daemon picks one when absent.
    pub channel: Option<u16>,
    /// Ask the daemon to connect the profile automatically when a known
    /// device comes into range.
    pub auto_connect: bool,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            path: "/bluez/hfp/battery".to_string(),
            name: None,
            channel: None,
            auto_connect: true,
        }
    }
}

/// Event emitted when a session ends.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    /// Object path of the connection that ended.
    pub path: String,
    /// How the session ended.
    pub outcome: SessionOutcome,
}

/// Registry of active HFP sessions, keyed by the daemon's object path.
///
/// One session per connected peer; sessions run on their own tokio tasks
/// and share no state with each other.
pub struct HfpProfile {
    /// Active sessions by object path.
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
    /// Channel for session-ended events.
    event_tx: broadcast::Sender<SessionEvent>,
    /// Set once the daemon releases the profile.
    released: AtomicBool,
}

impl HfpProfile {
    /// Create an empty profile registry.
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(16);

        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            released: AtomicBool::new(false),
        }
    }

    /// Accept a new connection from the Bluetooth daemon.
    ///
    /// Starts a session for the connected stream and spawns its receive
    /// loop. The returned handle can observe or cancel the session; the
    /// session's outcome is also broadcast once it ends (see
    /// [`subscribe`](Self::subscribe)).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Released`] after [`release`](Self::release) has
    /// been called.
    pub fn new_connection<S>(
        &self,
        path: impl Into<String>,
        stream: S,
        properties: ConnectionProperties,
    ) -> Result<SessionHandle>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let path = path.into();

        let session = HfpSession::start(
            stream,
            properties.version_or_default(),
            properties.features_or_default(),
        );
        let handle = session.handle();

        // The released check shares the sessions critical section with the
        // insert, so a racing release() can never drain the map and then
        // miss a session registered just after.
        let replaced = {
            let mut sessions = self.sessions.write();
            if self.released.load(Ordering::SeqCst) {
                warn!("Rejecting connection: profile released");
                return Err(Error::Released);
            }
            sessions.insert(path.clone(), handle.clone())
        };

        info!("New connection: {path}");

        if let Some(old) = replaced {
            warn!("Replacing existing session for {path}");
            old.request_disconnect();
        }

        let sessions = self.sessions.clone();
        let event_tx = self.event_tx.clone();
        let task_handle = handle.clone();
        let task_path = path;

        tokio::spawn(async move {
            let outcome = session.run().await;

            // Remove our own entry, unless the path was reused for a
            // newer session in the meantime.
            {
                let mut sessions = sessions.write();
                let ours = sessions
                    .get(&task_path)
                    .map_or(false, |h| h.is_same_session(&task_handle));
                if ours {
                    sessions.remove(&task_path);
                }
            }

            debug!("Session {task_path} ended: {outcome}");
            let _ = event_tx.send(SessionEvent {
                path: task_path,
                outcome,
            });
        });

        Ok(handle)
    }

    /// Force-close the session for `path` at the daemon's request.
    ///
    /// Takes effect immediately; the stream is released without waiting
    /// for in-flight reads.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownConnection`] if no session is registered
    /// under `path`. This is benign and should be treated as a no-op.
    pub fn request_disconnection(&self, path: &str) -> Result<()> {
        match self.sessions.write().remove(path) {
            Some(handle) => {
                handle.request_disconnect();
                debug!("Disconnected: {path}");
                Ok(())
            }
            None => {
                debug!("Disconnection requested for unknown path: {path}");
                Err(Error::UnknownConnection {
                    path: path.to_string(),
                })
            }
        }
    }

    /// Release the profile: stop accepting new connections and disconnect
    /// every live session. Idempotent.
    pub fn release(&self) {
        let handles: Vec<_> = {
            let mut sessions = self.sessions.write();
            if self.released.swap(true, Ordering::SeqCst) {
                return;
            }
            sessions.drain().collect()
        };

        info!("Release");

        for (path, handle) in handles {
            debug!("Disconnecting: {path}");
            handle.request_disconnect();
        }
    }

    /// Check whether the profile has been released.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Number of active sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Subscribe to session-ended events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }
}

impl Default for HfpProfile {
    fn default() -> Self {
        Self::new()
    }
}
