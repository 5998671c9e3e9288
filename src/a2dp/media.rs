//! Outbound Media Buffers
//!
//! A [`MediaPacket`] is one encoded audio buffer as produced by the audio
//! feeding. The first [`MEDIA_TIMESTAMP_LENGTH`] bytes hold the packet
//! timestamp (little-endian); the payload starts after a headroom region so
//! codec headers and the content protection byte can be prepended in place.

use super::A2dpError;
use crate::constants::{MEDIA_BUFFER_SIZE, MEDIA_HEADROOM, MEDIA_TIMESTAMP_LENGTH};

/// Encoded audio buffer with front headroom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPacket {
    buffer: [u8; MEDIA_BUFFER_SIZE],
    offset: usize,
    len: usize,
    /// Number of codec frames in the payload
    pub frames: u8,
}

impl MediaPacket {
    /// Empty packet with the default headroom
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: [0; MEDIA_BUFFER_SIZE],
            offset: MEDIA_TIMESTAMP_LENGTH + MEDIA_HEADROOM,
            len: 0,
            frames: 0,
        }
    }

    /// Replace the payload, keeping the current offset
    ///
    /// # Errors
    /// Returns [`A2dpError::BufferFull`] if the payload does not fit behind
    /// the current offset.
    pub fn set_payload(&mut self, payload: &[u8]) -> Result<(), A2dpError> {
        let end = self.offset + payload.len();
        if end > MEDIA_BUFFER_SIZE {
            return Err(A2dpError::BufferFull);
        }
        self.buffer[self.offset..end].copy_from_slice(payload);
        self.len = payload.len();
        Ok(())
    }

    /// Start of the payload within the buffer
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Payload length
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the payload is empty
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Payload bytes
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.offset..self.offset + self.len]
    }

    /// Whole buffer, timestamp area included
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; MEDIA_BUFFER_SIZE] {
        &self.buffer
    }

    /// Grow the payload by one byte at the front
    ///
    /// # Errors
    /// Returns [`A2dpError::BufferFull`] if only the timestamp area is left
    /// in front of the payload.
    pub fn prepend(&mut self, byte: u8) -> Result<(), A2dpError> {
        if self.offset <= MEDIA_TIMESTAMP_LENGTH {
            return Err(A2dpError::BufferFull);
        }
        self.offset -= 1;
        self.len += 1;
        self.buffer[self.offset] = byte;
        Ok(())
    }

    /// Store the timestamp in front of the buffer
    pub fn set_timestamp(&mut self, timestamp: u32) {
        self.buffer[..MEDIA_TIMESTAMP_LENGTH].copy_from_slice(&timestamp.to_le_bytes());
    }
}

impl Default for MediaPacket {
    fn default() -> Self {
        Self::new()
    }
}

/// Audio feeding queue the data path pulls encoded packets from
pub trait MediaSource {
    /// Next encoded packet, `None` when nothing is queued
    fn read_packet(&mut self) -> Option<MediaPacket>;
}

/// Tagged packet ready for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    /// Packet with codec header and content protection byte applied
    pub packet: MediaPacket,
    /// Timestamp read from the packet, zero for unsupported codecs
    pub timestamp: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_and_prepend() {
        let mut packet = MediaPacket::new();
        assert!(packet.is_empty());
        packet.set_payload(&[0xAA, 0xBB]).unwrap();
        packet.prepend(0x01).unwrap();
        assert_eq!(packet.payload(), &[0x01, 0xAA, 0xBB]);
        assert_eq!(packet.offset(), MEDIA_TIMESTAMP_LENGTH + MEDIA_HEADROOM - 1);
    }

    #[test]
    fn test_headroom_exhausted() {
        let mut packet = MediaPacket::new();
        for _ in 0..MEDIA_HEADROOM {
            packet.prepend(0).unwrap();
        }
        assert_eq!(packet.prepend(0), Err(A2dpError::BufferFull));
        assert_eq!(packet.len(), MEDIA_HEADROOM);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut packet = MediaPacket::new();
        let big = [0u8; MEDIA_BUFFER_SIZE];
        assert_eq!(packet.set_payload(&big), Err(A2dpError::BufferFull));
        assert!(packet.is_empty());
    }

    #[test]
    fn test_timestamp_area() {
        let mut packet = MediaPacket::new();
        packet.set_timestamp(0x0102_0304);
        assert_eq!(&packet.as_bytes()[..4], &[0x04, 0x03, 0x02, 0x01]);
    }
}
