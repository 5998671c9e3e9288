//! A2DP (Advanced Audio Distribution Profile) Codec Negotiation
//!
//! This module decides which codec configuration, bitpool range and content
//! protection scheme an audio stream uses, and keeps every connected peer in
//! step with the single configuration that drives the local encoder.
//!
//! ## Architecture
//!
//! - **Codec helpers** ([`codec`]): validate, compare and intersect the fixed
//!   size codec information elements exchanged over AVDTP
//! - **Peer table** ([`peer`]): one slot per audio connection holding the
//!   capabilities discovered on the remote device
//! - **Content protection** ([`content_protection`]): SCMS-T descriptors and
//!   the copy-control flag
//! - **Shared state** ([`state`]): the active codec configuration behind one
//!   critical-section lock
//! - **Coordinator** ([`coordinator`]): the call-outs invoked by the session
//!   layer, codec selection and encoder parameter derivation
//! - **Session call-ins** ([`session`]): accept/reject and reconfigure
//!   notifications sent back to the session layer
//!
//! ## Usage
//!
//! ```rust
//! use bondybird_a2dp::a2dp::{CodecCoordinator, CoordinatorOptions, SessionChannel, ServiceClass};
//! use bondybird_a2dp::BluetoothAddress;
//!
//! let channel = SessionChannel::new();
//! let mut coordinator = CodecCoordinator::new(CoordinatorOptions::default(), &channel);
//!
//! let handle = 0x41;
//! coordinator.discovery_result(
//!     handle,
//!     2,
//!     1,
//!     1,
//!     BluetoothAddress::new([0x00, 0x1B, 0xDC, 0x0F, 0xAA, 0x01]),
//!     ServiceClass::AudioSource,
//! )
//! .unwrap();
//! assert!(coordinator.peer(handle).is_ok());
//! ```

pub mod codec;
pub mod content_protection;
pub mod coordinator;
pub mod media;
pub mod peer;
pub mod session;
pub mod state;

pub use codec::*;
pub use content_protection::*;
pub use coordinator::*;
pub use media::*;
pub use peer::*;
pub use session::*;
pub use state::*;

use crate::constants::{UUID_AUDIO_SINK, UUID_AUDIO_SOURCE};

/// Audio/video connection handle assigned by the session layer
///
/// The upper two bits carry the channel tag, the low bits the one-based
/// stream slot.
pub type AvHandle = u8;

/// Stream Endpoint Identifier (SEID) assigned by the peer
pub type StreamEndpointId = u8;

/// AVDTP stream handle echoed back in the set-configuration call-in
pub type AvdtHandle = u8;

/// Local stream endpoint type being configured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AvdtpRole {
    /// Local endpoint is an audio source (peer is a sink)
    Source = 0,
    /// Local endpoint is an audio sink (peer is a source)
    Sink = 1,
}

/// Audio service classes used to pick the discovery direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServiceClass {
    /// Audio Source (0x110A)
    AudioSource,
    /// Audio Sink (0x110B)
    AudioSink,
}

impl ServiceClass {
    /// 16-bit service class UUID
    #[must_use]
    pub const fn uuid(self) -> u16 {
        match self {
            Self::AudioSource => UUID_AUDIO_SOURCE,
            Self::AudioSink => UUID_AUDIO_SINK,
        }
    }

    /// Look up a service class by its 16-bit UUID
    #[must_use]
    pub const fn from_uuid(uuid: u16) -> Option<Self> {
        match uuid {
            UUID_AUDIO_SOURCE => Some(Self::AudioSource),
            UUID_AUDIO_SINK => Some(Self::AudioSink),
            _ => None,
        }
    }

    /// The remote role to connect to when this is the local role
    #[must_use]
    pub const fn counterpart(self) -> Self {
        match self {
            Self::AudioSource => Self::AudioSink,
            Self::AudioSink => Self::AudioSource,
        }
    }
}

/// Negotiation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum A2dpError {
    /// Handle does not map to a peer slot
    NotFound,
    /// Codec family or configuration not supported
    UnsupportedCodec,
    /// Content protection descriptor is not a single SCMS-T element
    BadContentProtectionType,
    /// No local codec matches any peer capability
    SelectionFailed,
    /// Bitpool range is malformed or empty
    InvalidRange,
    /// Codec information element failed to parse
    InvalidCodecInfo,
    /// Malformed argument
    InvalidParameter,
    /// Media buffer has no headroom left
    BufferFull,
}

impl core::fmt::Display for A2dpError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            Self::NotFound => "peer not found",
            Self::UnsupportedCodec => "unsupported codec",
            Self::BadContentProtectionType => "bad content protection type",
            Self::SelectionFailed => "codec selection failed",
            Self::InvalidRange => "invalid bitpool range",
            Self::InvalidCodecInfo => "invalid codec information",
            Self::InvalidParameter => "invalid parameter",
            Self::BufferFull => "media buffer full",
        };
        f.write_str(text)
    }
}

/// Status carried by the set-configuration call-in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ConfigStatus {
    /// Configuration accepted
    Success = 0x00,
    /// Peer slot unavailable
    Busy = 0x0B,
    /// Codec not supported for the local role
    WrongCodec = 0x0D,
    /// Content protection type not supported
    BadCpType = 0xE0,
}

/// Service category a set-configuration rejection applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ServiceCategory {
    /// Content protection capability
    ContentProtection = 0x04,
    /// Media codec capability
    MediaCodec = 0x07,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_class_uuid_round_trip() {
        assert_eq!(ServiceClass::AudioSource.uuid(), 0x110A);
        assert_eq!(ServiceClass::from_uuid(0x110B), Some(ServiceClass::AudioSink));
        assert_eq!(ServiceClass::from_uuid(0x1108), None);
        assert_eq!(
            ServiceClass::AudioSink.counterpart(),
            ServiceClass::AudioSource
        );
    }

    #[test]
    fn test_status_wire_values() {
        assert_eq!(ConfigStatus::Success as u8, 0x00);
        assert_eq!(ConfigStatus::BadCpType as u8, 0xE0);
        assert_eq!(ServiceCategory::MediaCodec as u8, 0x07);
    }
}
