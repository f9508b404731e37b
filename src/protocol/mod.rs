//! Protocol module for parsing AT command traffic.
//!
//! This module contains the implementations for:
//! - AT command line splitting and accessory-event parsing
//! - The HFP hands-free feature bitmask

pub mod at;
pub mod features;

pub use at::{parse_accessory_event, split_lines, BatteryReport, CommandLine};
pub use features::FeatureSet;
