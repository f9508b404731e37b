//! HFP hands-free capability flags.
//!
//! The feature bitmask is negotiated by the Bluetooth daemon during SLC
//! setup and handed to us read-only with each new connection.

use std::fmt;

/// Bitmask of HFP hands-free capability flags.
///
/// Immutable once negotiated. The raw bit values follow the HFP
/// "supported features" bitmap for the hands-free role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureSet(u16);

impl FeatureSet {
    /// Noise reduction / echo cancellation.
    pub const NREC: Self = Self(0x0001);
    /// Three-way calling.
    pub const THREE_WAY_CALLING: Self = Self(0x0002);
    /// Caller-ID presentation (CLI).
    pub const CALLER_ID: Self = Self(0x0004);
    /// Voice recognition activation.
    pub const VOICE_RECOGNITION: Self = Self(0x0008);
    /// Remote volume control.
    pub const REMOTE_VOLUME: Self = Self(0x0010);
    /// Enhanced call status.
    pub const ENHANCED_CALL_STATUS: Self = Self(0x0020);
    /// Enhanced call control.
    pub const ENHANCED_CALL_CONTROL: Self = Self(0x0040);
    /// Codec negotiation.
    pub const CODEC_NEGOTIATION: Self = Self(0x0080);

    /// An empty feature set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// The fixed feature set this accessory advertises: caller-ID and
    /// remote volume control.
    pub const fn advertised() -> Self {
        Self(Self::CALLER_ID.0 | Self::REMOTE_VOLUME.0)
    }

    /// Create from a raw bitmask.
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Get the raw bitmask.
    pub const fn bits(&self) -> u16 {
        self.0
    }

    /// Check whether all flags in `other` are set.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check whether no flags are set.
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for FeatureSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for FeatureSet {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advertised_features() {
        let advertised = FeatureSet::advertised();
        assert!(advertised.contains(FeatureSet::CALLER_ID));
        assert!(advertised.contains(FeatureSet::REMOTE_VOLUME));
        assert!(!advertised.contains(FeatureSet::CODEC_NEGOTIATION));
        assert_eq!(advertised.bits(), 0x0014);
    }

    #[test]
    fn test_union_and_contains() {
        let set = FeatureSet::NREC | FeatureSet::THREE_WAY_CALLING;
        assert!(set.contains(FeatureSet::NREC));
        assert!(set.contains(FeatureSet::THREE_WAY_CALLING));
        assert!(!set.contains(FeatureSet::VOICE_RECOGNITION));
        assert!(set.contains(FeatureSet::empty()));
    }

    #[test]
    fn test_empty_and_default() {
        assert!(FeatureSet::empty().is_empty());
        assert_eq!(FeatureSet::default(), FeatureSet::empty());
        assert!(!FeatureSet::advertised().is_empty());
    }

    #[test]
    fn test_bits_roundtrip() {
        let set = FeatureSet::from_bits(0x00FF);
        assert_eq!(set.bits(), 0x00FF);
        assert!(set.contains(FeatureSet::CODEC_NEGOTIATION));
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", FeatureSet::advertised()), "0x0014");
        assert_eq!(format!("{}", FeatureSet::empty()), "0x0000");
    }
}
