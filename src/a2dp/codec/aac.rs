//! MPEG-2/4 AAC codec information
//!
//! Layout after the three header octets:
//! object type (byte 3), sampling frequency (byte 4 and the high nibble of
//! byte 5), channels (low nibble of byte 5), then a VBR flag and a 23-bit
//! bitrate spread over bytes 6..=8.
//!
//! AAC is offered as a local source codec only.

use super::{CodecInfo, CodecType, MediaType};
use crate::a2dp::A2dpError;
use crate::constants::CODEC_INFO_SIZE;

/// Length octet of an AAC codec information element
pub const AAC_INFO_LEN: u8 = 8;

/// Default bitrate of the local AAC encoder, in bits per second
pub const AAC_DEFAULT_BITRATE: u32 = 320_000;

const AAC_VBR_FLAG: u8 = 0x80;
const AAC_BITRATE_MASK: u32 = 0x007F_FFFF;

/// AAC Object Type Support (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AacObjectType(pub u8);

impl AacObjectType {
    /// MPEG-2 AAC Low Complexity
    pub const MPEG2_LC: u8 = 0x80;
    /// MPEG-4 AAC Low Complexity
    pub const MPEG4_LC: u8 = 0x40;
    /// MPEG-4 AAC Long Term Prediction
    pub const MPEG4_LTP: u8 = 0x20;
    /// MPEG-4 AAC Scalable
    pub const MPEG4_SCALABLE: u8 = 0x10;

    /// Check if object type is supported
    #[must_use]
    pub const fn supports(&self, object_type: u8) -> bool {
        (self.0 & object_type) != 0
    }
}

/// AAC Sampling Frequency Support (12-bit bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AacSamplingFrequency(pub u16);

impl AacSamplingFrequency {
    /// 8000 Hz
    pub const HZ_8000: u16 = 0x8000;
    /// 11025 Hz
    pub const HZ_11025: u16 = 0x4000;
    /// 12000 Hz
    pub const HZ_12000: u16 = 0x2000;
    /// 16000 Hz
    pub const HZ_16000: u16 = 0x1000;
    /// 22050 Hz
    pub const HZ_22050: u16 = 0x0800;
    /// 24000 Hz
    pub const HZ_24000: u16 = 0x0400;
    /// 32000 Hz
    pub const HZ_32000: u16 = 0x0200;
    /// 44100 Hz
    pub const HZ_44100: u16 = 0x0100;
    /// 48000 Hz
    pub const HZ_48000: u16 = 0x0080;
    /// 64000 Hz
    pub const HZ_64000: u16 = 0x0040;
    /// 88200 Hz
    pub const HZ_88200: u16 = 0x0020;
    /// 96000 Hz
    pub const HZ_96000: u16 = 0x0010;

    const TABLE: [(u16, u32); 12] = [
        (Self::HZ_8000, 8_000),
        (Self::HZ_11025, 11_025),
        (Self::HZ_12000, 12_000),
        (Self::HZ_16000, 16_000),
        (Self::HZ_22050, 22_050),
        (Self::HZ_24000, 24_000),
        (Self::HZ_32000, 32_000),
        (Self::HZ_44100, 44_100),
        (Self::HZ_48000, 48_000),
        (Self::HZ_64000, 64_000),
        (Self::HZ_88200, 88_200),
        (Self::HZ_96000, 96_000),
    ];

    /// Check if frequency is supported
    #[must_use]
    pub const fn supports(&self, freq: u16) -> bool {
        (self.0 & freq) != 0
    }

    /// Frequency in Hz, when exactly one bit is set
    #[must_use]
    pub fn hz(&self) -> Option<u32> {
        Self::TABLE
            .iter()
            .find(|(bit, _)| *bit == self.0)
            .map(|(_, hz)| *hz)
    }

    /// Bit for a frequency in Hz
    #[must_use]
    pub fn from_hz(hz: u32) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(_, rate)| *rate == hz)
            .map(|(bit, _)| Self(*bit))
    }
}

/// AAC Channels Support (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AacChannels(pub u8);

impl AacChannels {
    /// One channel
    pub const MONO: u8 = 0x08;
    /// Two channels
    pub const STEREO: u8 = 0x04;

    /// Check if channel layout is supported
    #[must_use]
    pub const fn supports(&self, channels: u8) -> bool {
        (self.0 & channels) != 0
    }

    /// Channel count, when exactly one bit is set
    #[must_use]
    pub const fn count(&self) -> Option<u8> {
        match self.0 {
            Self::MONO => Some(1),
            Self::STEREO => Some(2),
            _ => None,
        }
    }
}

/// Decoded AAC codec information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AacCapabilities {
    /// Object type support (bitfield)
    pub object_types: AacObjectType,
    /// Sampling frequency support (bitfield)
    pub sampling_frequencies: AacSamplingFrequency,
    /// Channel support (bitfield)
    pub channels: AacChannels,
    /// Variable bitrate supported or selected
    pub variable_bitrate: bool,
    /// Peak bitrate in bits per second, 0 when unspecified
    pub bitrate: u32,
}

impl AacCapabilities {
    /// Capabilities of the local AAC encoder
    #[must_use]
    pub const fn local_source() -> Self {
        Self {
            object_types: AacObjectType(AacObjectType::MPEG2_LC),
            sampling_frequencies: AacSamplingFrequency(
                AacSamplingFrequency::HZ_44100 | AacSamplingFrequency::HZ_48000,
            ),
            channels: AacChannels(AacChannels::MONO | AacChannels::STEREO),
            variable_bitrate: false,
            bitrate: AAC_DEFAULT_BITRATE,
        }
    }

    /// Default source configuration: MPEG-2 LC, 44.1 kHz stereo, 320 kbit/s
    #[must_use]
    pub const fn default_config() -> Self {
        Self {
            object_types: AacObjectType(AacObjectType::MPEG2_LC),
            sampling_frequencies: AacSamplingFrequency(AacSamplingFrequency::HZ_44100),
            channels: AacChannels(AacChannels::STEREO),
            variable_bitrate: false,
            bitrate: AAC_DEFAULT_BITRATE,
        }
    }

    /// Decode an AAC codec information element
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidCodecInfo`] if the element is not a well
    /// formed AAC element of the requested kind.
    pub fn from_codec_info(info: &CodecInfo, is_capability: bool) -> Result<Self, A2dpError> {
        let bytes = info.as_bytes();
        if bytes[0] != AAC_INFO_LEN
            || info.media_type() != Some(MediaType::Audio)
            || info.codec_type() != Some(CodecType::Mpeg24Aac)
        {
            return Err(A2dpError::InvalidCodecInfo);
        }

        let caps = Self {
            object_types: AacObjectType(bytes[3]),
            sampling_frequencies: AacSamplingFrequency(
                (u16::from(bytes[4]) << 8 | u16::from(bytes[5])) & 0xFFF0,
            ),
            channels: AacChannels(bytes[5] & 0x0C),
            variable_bitrate: bytes[6] & AAC_VBR_FLAG != 0,
            bitrate: u32::from_be_bytes([0, bytes[6], bytes[7], bytes[8]]) & AAC_BITRATE_MASK,
        };

        let ones = [
            caps.object_types.0.count_ones(),
            caps.sampling_frequencies.0.count_ones(),
            caps.channels.0.count_ones(),
        ];
        let fields_ok = if is_capability {
            ones.iter().all(|&n| n != 0)
        } else {
            ones.iter().all(|&n| n == 1)
        };
        if fields_ok {
            Ok(caps)
        } else {
            Err(A2dpError::InvalidCodecInfo)
        }
    }

    /// Encode into a codec information element
    #[must_use]
    pub fn to_codec_info(&self) -> CodecInfo {
        let [freq_high, freq_low] = self.sampling_frequencies.0.to_be_bytes();
        let [_, rate_high, rate_mid, rate_low] = (self.bitrate & AAC_BITRATE_MASK).to_be_bytes();
        let mut bytes = [0u8; CODEC_INFO_SIZE];
        bytes[0] = AAC_INFO_LEN;
        bytes[1] = (MediaType::Audio as u8) << 4;
        bytes[2] = CodecType::Mpeg24Aac as u8;
        bytes[3] = self.object_types.0;
        bytes[4] = freq_high;
        bytes[5] = freq_low | self.channels.0;
        bytes[6] = rate_high | if self.variable_bitrate { AAC_VBR_FLAG } else { 0 };
        bytes[7] = rate_mid;
        bytes[8] = rate_low;
        CodecInfo(bytes)
    }

    /// Every field of `self` is contained in the matching field of `caps`
    #[must_use]
    pub const fn fields_within(&self, caps: &Self) -> bool {
        self.object_types.0 & !caps.object_types.0 == 0
            && self.sampling_frequencies.0 & !caps.sampling_frequencies.0 == 0
            && self.channels.0 & !caps.channels.0 == 0
    }

    /// Every field of `self` shares at least one bit with `other`
    #[must_use]
    pub const fn fields_intersect(&self, other: &Self) -> bool {
        self.object_types.0 & other.object_types.0 != 0
            && self.sampling_frequencies.0 & other.sampling_frequencies.0 != 0
            && self.channels.0 & other.channels.0 != 0
    }

    /// Narrow a configuration to what `caps` accepts
    ///
    /// The bitrate is capped at the peer's advertised peak when it has one,
    /// and VBR survives only if both sides allow it.
    ///
    /// # Errors
    /// Returns [`A2dpError::UnsupportedCodec`] if a field is outside `caps`.
    pub fn restrict_to(&self, caps: &Self) -> Result<Self, A2dpError> {
        if !self.fields_within(caps) {
            return Err(A2dpError::UnsupportedCodec);
        }
        let bitrate = if caps.bitrate == 0 {
            self.bitrate
        } else {
            self.bitrate.min(caps.bitrate)
        };
        Ok(Self {
            variable_bitrate: self.variable_bitrate && caps.variable_bitrate,
            bitrate,
            ..*self
        })
    }

    /// Same stream parameters, ignoring the bitrate
    #[must_use]
    pub fn same_stream_parameters(&self, other: &Self) -> bool {
        self.object_types == other.object_types
            && self.sampling_frequencies == other.sampling_frequencies
            && self.channels == other.channels
            && self.variable_bitrate == other.variable_bitrate
    }
}

impl Default for AacCapabilities {
    fn default() -> Self {
        Self::default_config()
    }
}
