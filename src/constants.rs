//! `BondyBird` A2DP Constants
//!
//! Limits, wire values and buffer sizes shared by the negotiation engine.
//! Most of them come straight from the AVDTP and A2DP specifications; the
//! capacity values size the fixed storage used in place of heap allocation.

/// Maximum number of concurrent audio connections (peer table slots)
pub const MAX_AUDIO_STREAMS: usize = 6;

/// Maximum number of capability records kept per role per peer
///
/// One per local codec endpoint index.
pub const MAX_PEER_ENDPOINTS: usize = 3;

/// Size of an AVDTP codec information element in bytes
pub const CODEC_INFO_SIZE: usize = 10;

/// Size of a content protection information element in bytes
pub const CP_INFO_SIZE: usize = 3;

/// Bits of an AV handle carrying the channel tag
pub const AV_CHANNEL_MASK: u8 = 0xC0;

/// Channel tag of audio AV handles
pub const AV_CHANNEL_AUDIO: u8 = 0x40;

/// MTU reported when no stream is open
pub const MTU_NO_LIMIT: u16 = 0xFFFF;

/// Audio Source service class UUID
pub const UUID_AUDIO_SOURCE: u16 = 0x110A;

/// Audio Sink service class UUID
pub const UUID_AUDIO_SINK: u16 = 0x110B;

/// Minimum length of service capabilities for content protection
pub const CP_LOSC: u8 = 2;

/// SCMS-T content protection type identifier
pub const CP_SCMS_T_ID: u16 = 0x0002;

/// SCMS-T content protection descriptor (length, type LSB, type MSB)
pub const SCMS_T_DESCRIPTOR: [u8; CP_INFO_SIZE] = [CP_LOSC, 0x02, 0x00];

/// Minimum SBC bitpool value
pub const SBC_MIN_BITPOOL: u8 = 2;

/// Maximum SBC bitpool value
pub const SBC_MAX_BITPOOL: u8 = 250;

/// Size of the media packet buffer
pub const MEDIA_BUFFER_SIZE: usize = 1024;

/// Bytes reserved at the start of a media buffer for the packet timestamp
pub const MEDIA_TIMESTAMP_LENGTH: usize = 4;

/// Default headroom between the timestamp area and the payload
pub const MEDIA_HEADROOM: usize = 16;

/// Mask applied to the frame count in an SBC media payload header
pub const SBC_FRAME_COUNT_MASK: u8 = 0x0F;

/// Capacity of the default session command channel
pub const SESSION_CHANNEL_SIZE: usize = 4;
