// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # hfp-battery
//!
//! Accessory-side engine for a Bluetooth Hands-Free Profile (HFP)
//! session whose sole purpose is reading a phone's battery level from
//! the `IPHONEACCEV` vendor AT extension.
//!
//! The Bluetooth daemon (BlueZ) brokers the link: it negotiates the
//! RFCOMM channel and hands this crate an already-connected byte stream
//! per peer. This crate supplies the per-connection protocol engine:
//!
//! - **AT line parsing**: splitting stream reads into command lines and
//!   extracting the battery report
//! - **Acknowledgement**: every accessory-event line is answered with
//!   `OK`, understood or not
//! - **Prompt teardown**: one battery reading is the session's whole job;
//!   the RFCOMM channel is released as soon as it is obtained
//! - **Session registry**: sessions keyed by the daemon's object path,
//!   with disconnection and release driven by the daemon
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hfp_battery::{ConnectionProperties, HfpProfile, SessionOutcome};
//!
//! # async fn accept(profile: &HfpProfile, stream: tokio::io::DuplexStream) -> hfp_battery::Result<()> {
//! let mut events = profile.subscribe();
//!
//! // Called once per connection the Bluetooth daemon hands over.
//! profile.new_connection("/org/bluez/hci0/dev_00_11_22", stream, ConnectionProperties::default())?;
//!
//! if let Ok(event) = events.recv().await {
//!     if let SessionOutcome::BatteryLevel(pct) = event.outcome {
//!         println!("Phone battery: {pct}%");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Scope
//!
//! Link establishment, RFCOMM negotiation, service discovery, and
//! authentication all belong to the daemon. AT commands other than the
//! battery event are acknowledged generically but not acted on.

// Public modules
pub mod error;
pub mod profile;
pub mod protocol;
pub mod session;

// Re-exports for convenience
pub use error::{Error, Result};
pub use profile::{
    ConnectionProperties, HfpProfile, ProfileOptions, SessionEvent, DEFAULT_HFP_VERSION,
    HFP_AG_SERVICE_UUID,
};
pub use session::{HfpSession, SessionHandle, SessionOutcome, SessionState};

// Re-export commonly used types from submodules
pub use protocol::{BatteryReport, CommandLine, FeatureSet};
