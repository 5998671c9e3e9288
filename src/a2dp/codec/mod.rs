//! Audio Codec Information for A2DP
//!
//! Codec parameters travel over AVDTP as a fixed-size codec information
//! element. [`CodecInfo`] wraps that element and dispatches every query to
//! the codec family it names ([`sbc`] or [`aac`]); elements of any other
//! family are carried opaquely and fail every support check.

pub mod aac;
pub mod sbc;

pub use aac::AacCapabilities;
pub use sbc::SbcCapabilities;

use super::A2dpError;
use super::content_protection::ContentProtection;
use super::media::MediaPacket;
use crate::constants::{CODEC_INFO_SIZE, MEDIA_TIMESTAMP_LENGTH, SBC_FRAME_COUNT_MASK};

/// Media type carried in the high nibble of byte 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MediaType {
    /// Audio
    Audio = 0x00,
    /// Video
    Video = 0x01,
    /// Multimedia
    Multimedia = 0x02,
}

/// Supported audio codec types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CodecType {
    /// SBC (Sub-Band Coding) - Mandatory codec for A2DP
    Sbc = 0x00,
    /// MPEG-1,2 Audio (MP3)
    Mpeg12Audio = 0x01,
    /// MPEG-2,4 AAC
    Mpeg24Aac = 0x02,
    /// ATRAC family
    Atrac = 0x04,
    /// Vendor-specific codec
    VendorSpecific = 0xFF,
}

impl CodecType {
    /// Decode the codec type octet
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Sbc),
            0x01 => Some(Self::Mpeg12Audio),
            0x02 => Some(Self::Mpeg24Aac),
            0x04 => Some(Self::Atrac),
            0xFF => Some(Self::VendorSpecific),
            _ => None,
        }
    }
}

/// Codec families the negotiation engine can configure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Sbc(SbcCapabilities),
    Aac(AacCapabilities),
}

/// AVDTP codec information element
///
/// Byte 0 is the length of the codec specific part, byte 1 holds the media
/// type, byte 2 the codec type; the rest is codec specific. Bytes past the
/// declared length are ignored by every comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CodecInfo(pub [u8; CODEC_INFO_SIZE]);

impl CodecInfo {
    /// All-zero element, never valid
    pub const EMPTY: Self = Self([0; CODEC_INFO_SIZE]);

    /// Wrap raw bytes
    #[must_use]
    pub const fn new(bytes: [u8; CODEC_INFO_SIZE]) -> Self {
        Self(bytes)
    }

    /// Copy up to [`CODEC_INFO_SIZE`] bytes, zero filling the rest
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut info = [0u8; CODEC_INFO_SIZE];
        let len = bytes.len().min(CODEC_INFO_SIZE);
        info[..len].copy_from_slice(&bytes[..len]);
        Self(info)
    }

    /// Raw bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; CODEC_INFO_SIZE] {
        &self.0
    }

    /// Whether every byte is zero
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Media type, if known
    #[must_use]
    pub const fn media_type(&self) -> Option<MediaType> {
        match self.0[1] >> 4 {
            0x00 => Some(MediaType::Audio),
            0x01 => Some(MediaType::Video),
            0x02 => Some(MediaType::Multimedia),
            _ => None,
        }
    }

    /// Raw codec type octet
    #[must_use]
    pub const fn raw_codec_type(&self) -> u8 {
        self.0[2]
    }

    /// Codec type, if known
    #[must_use]
    pub const fn codec_type(&self) -> Option<CodecType> {
        CodecType::from_u8(self.0[2])
    }

    /// Human readable codec name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self.codec_type() {
            Some(CodecType::Sbc) => "SBC",
            Some(CodecType::Mpeg24Aac) => "AAC",
            Some(CodecType::VendorSpecific) => "UNKNOWN VENDOR CODEC",
            _ => "UNKNOWN CODEC",
        }
    }

    /// Vendor identifier of a vendor-specific codec
    #[must_use]
    pub fn vendor_id(&self) -> Option<u32> {
        (self.codec_type() == Some(CodecType::VendorSpecific))
            .then(|| u32::from_le_bytes([self.0[3], self.0[4], self.0[5], self.0[6]]))
    }

    /// Vendor codec identifier of a vendor-specific codec
    #[must_use]
    pub fn vendor_codec_id(&self) -> Option<u16> {
        (self.codec_type() == Some(CodecType::VendorSpecific))
            .then(|| u16::from_le_bytes([self.0[7], self.0[8]]))
    }

    fn family(&self, is_capability: bool) -> Result<Family, A2dpError> {
        match self.codec_type() {
            Some(CodecType::Sbc) => {
                SbcCapabilities::from_codec_info(self, is_capability).map(Family::Sbc)
            }
            Some(CodecType::Mpeg24Aac) => {
                AacCapabilities::from_codec_info(self, is_capability).map(Family::Aac)
            }
            _ => Err(A2dpError::UnsupportedCodec),
        }
    }

    fn family_any(&self) -> Result<Family, A2dpError> {
        self.family(false).or_else(|_| self.family(true))
    }

    fn config(&self) -> Result<Family, A2dpError> {
        self.family(false)
    }

    /// Whether this element decodes as a configuration or capability of a
    /// known family
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.family_any().is_ok()
    }

    /// Whether this element decodes as a single-valued configuration
    #[must_use]
    pub fn is_valid_config(&self) -> bool {
        self.config().is_ok()
    }

    /// Whether this element is a well formed capability a peer sink can
    /// report
    #[must_use]
    pub fn is_peer_sink_codec_valid(&self) -> bool {
        self.family(true).is_ok()
    }

    /// Whether this element is a well formed capability of a peer source
    /// the local sink can decode
    #[must_use]
    pub fn is_peer_source_codec_valid(&self) -> bool {
        matches!(self.family(true), Ok(Family::Sbc(_)))
    }

    /// Same configuration with the family's default bitpool range
    ///
    /// Families without a bitpool, and elements that do not decode as a
    /// configuration, are returned unchanged.
    #[must_use]
    pub fn with_default_bitpool(&self) -> Self {
        match self.config() {
            Ok(Family::Sbc(mut sbc)) => {
                let default = SbcCapabilities::default_config();
                sbc.min_bitpool = default.min_bitpool;
                sbc.max_bitpool = default.max_bitpool;
                sbc.to_codec_info()
            }
            Ok(Family::Aac(_)) | Err(_) => *self,
        }
    }

    /// Whether the local source side can produce a stream within this element
    #[must_use]
    pub fn is_source_codec_supported(&self) -> bool {
        match self.family_any() {
            Ok(Family::Sbc(sbc)) => {
                let local = SbcCapabilities::local_source();
                sbc.fields_intersect(&local) && sbc.bitpool_overlaps(&local)
            }
            Ok(Family::Aac(aac)) => aac.fields_intersect(&AacCapabilities::local_source()),
            Err(_) => false,
        }
    }

    /// Whether the local sink side can consume a stream within this element
    #[must_use]
    pub fn is_sink_codec_supported(&self) -> bool {
        match self.family_any() {
            Ok(Family::Sbc(sbc)) => {
                let local = SbcCapabilities::local_sink();
                sbc.fields_intersect(&local) && sbc.bitpool_overlaps(&local)
            }
            Ok(Family::Aac(_)) | Err(_) => false,
        }
    }

    /// Whether a peer source advertising this capability can feed the local
    /// sink
    #[must_use]
    pub fn is_peer_source_codec_supported(&self) -> bool {
        match self.family(true) {
            Ok(Family::Sbc(sbc)) => {
                let local = SbcCapabilities::local_sink();
                sbc.fields_intersect(&local) && sbc.bitpool_overlaps(&local)
            }
            Ok(Family::Aac(_)) | Err(_) => false,
        }
    }

    /// Same codec family; vendor codecs also compare vendor and codec ids
    #[must_use]
    pub fn codec_type_equals(&self, other: &Self) -> bool {
        if self.raw_codec_type() != other.raw_codec_type() {
            return false;
        }
        match self.codec_type() {
            Some(CodecType::VendorSpecific) => {
                self.vendor_id() == other.vendor_id()
                    && self.vendor_codec_id() == other.vendor_codec_id()
            }
            _ => true,
        }
    }

    /// Identical configurations of a known family, trailing bytes ignored
    #[must_use]
    pub fn codec_equals(&self, other: &Self) -> bool {
        match (self.family_any(), other.family_any()) {
            (Ok(Family::Sbc(a)), Ok(Family::Sbc(b))) => a == b,
            (Ok(Family::Aac(a)), Ok(Family::Aac(b))) => a == b,
            _ => false,
        }
    }

    /// Whether switching from `other` to `self` needs a stream
    /// reconfiguration
    ///
    /// Bitpool and bitrate changes do not; anything that fails to decode does.
    #[must_use]
    pub fn requires_reconfig(&self, other: &Self) -> bool {
        match (self.config(), other.config()) {
            (Ok(Family::Sbc(a)), Ok(Family::Sbc(b))) => !a.same_stream_parameters(&b),
            (Ok(Family::Aac(a)), Ok(Family::Aac(b))) => !a.same_stream_parameters(&b),
            _ => true,
        }
    }

    /// Whether this configuration fits within the capability `caps`
    #[must_use]
    pub fn config_matches_capabilities(&self, caps: &Self) -> bool {
        match (self.config(), caps.family(true)) {
            (Ok(Family::Sbc(config)), Ok(Family::Sbc(caps))) => {
                config.fields_within(&caps) && config.bitpool_overlaps(&caps)
            }
            (Ok(Family::Aac(config)), Ok(Family::Aac(caps))) => config.fields_within(&caps),
            _ => false,
        }
    }

    /// Build the configuration to send to a peer sink from a local
    /// configuration and the sink's capability
    ///
    /// # Errors
    /// Returns [`A2dpError::UnsupportedCodec`] if the configuration does not
    /// fit the capability and [`A2dpError::InvalidRange`] if the bitpool
    /// ranges do not overlap.
    pub fn build_sink_config(&self, sink_caps: &Self) -> Result<Self, A2dpError> {
        match (self.config()?, sink_caps.family(true)?) {
            (Family::Sbc(config), Family::Sbc(caps)) => {
                Ok(config.restrict_to(&caps)?.to_codec_info())
            }
            (Family::Aac(config), Family::Aac(caps)) => {
                Ok(config.restrict_to(&caps)?.to_codec_info())
            }
            _ => Err(A2dpError::UnsupportedCodec),
        }
    }

    /// Build the preferred local sink configuration from a peer source
    /// capability
    ///
    /// # Errors
    /// Returns [`A2dpError::UnsupportedCodec`] if the capability has nothing
    /// in common with the local sink and [`A2dpError::InvalidRange`] if the
    /// bitpool ranges do not overlap.
    pub fn build_source_to_sink_config(&self) -> Result<Self, A2dpError> {
        match self.family(true)? {
            Family::Sbc(caps) => {
                let local = SbcCapabilities::local_sink();
                let common = caps.intersection(&local);
                if common.min_bitpool > common.max_bitpool {
                    return Err(A2dpError::InvalidRange);
                }
                Ok(common.preferred_config()?.to_codec_info())
            }
            Family::Aac(_) => Err(A2dpError::UnsupportedCodec),
        }
    }

    /// Sampling frequency in Hz
    #[must_use]
    pub fn sampling_frequency(&self) -> Option<u32> {
        match self.config().ok()? {
            Family::Sbc(sbc) => sbc.sampling_frequencies.hz(),
            Family::Aac(aac) => aac.sampling_frequencies.hz(),
        }
    }

    /// Number of audio channels
    #[must_use]
    pub fn channel_count(&self) -> Option<u8> {
        match self.config().ok()? {
            Family::Sbc(sbc) => sbc.channel_modes.channel_count(),
            Family::Aac(aac) => aac.channels.count(),
        }
    }

    fn sbc_config(&self) -> Option<SbcCapabilities> {
        match self.config().ok()? {
            Family::Sbc(sbc) => Some(sbc),
            Family::Aac(_) => None,
        }
    }

    /// SBC subband count
    #[must_use]
    pub fn number_of_subbands(&self) -> Option<u8> {
        self.sbc_config()?.subbands.count()
    }

    /// SBC block count
    #[must_use]
    pub fn number_of_blocks(&self) -> Option<u8> {
        self.sbc_config()?.block_lengths.count()
    }

    /// SBC allocation method code
    #[must_use]
    pub fn allocation_method_code(&self) -> Option<u8> {
        self.sbc_config()?.allocation_methods.code()
    }

    /// SBC channel mode code
    #[must_use]
    pub fn channel_mode_code(&self) -> Option<u8> {
        self.sbc_config()?.channel_modes.code()
    }

    /// SBC sampling frequency code
    #[must_use]
    pub fn sampling_frequency_code(&self) -> Option<u8> {
        self.sbc_config()?.sampling_frequencies.code()
    }

    /// Minimum bitpool, for configurations and capabilities alike
    #[must_use]
    pub fn min_bitpool(&self) -> Option<u8> {
        match self.family_any().ok()? {
            Family::Sbc(sbc) => Some(sbc.min_bitpool),
            Family::Aac(_) => None,
        }
    }

    /// Maximum bitpool, for configurations and capabilities alike
    #[must_use]
    pub fn max_bitpool(&self) -> Option<u8> {
        match self.family_any().ok()? {
            Family::Sbc(sbc) => Some(sbc.max_bitpool),
            Family::Aac(_) => None,
        }
    }

    /// Read the timestamp stored in front of an encoded media buffer
    #[must_use]
    pub fn packet_timestamp(&self, data: &[u8]) -> Option<u32> {
        match self.codec_type()? {
            CodecType::Sbc | CodecType::Mpeg24Aac => {
                let stamp = data.get(..MEDIA_TIMESTAMP_LENGTH)?;
                Some(u32::from_le_bytes([stamp[0], stamp[1], stamp[2], stamp[3]]))
            }
            _ => None,
        }
    }

    /// Prepend the codec's media payload header
    ///
    /// # Errors
    /// Returns [`A2dpError::UnsupportedCodec`] for codecs without a known
    /// header, or [`A2dpError::BufferFull`] if the packet has no headroom.
    pub fn build_codec_header(
        &self,
        packet: &mut MediaPacket,
        frames: u8,
    ) -> Result<(), A2dpError> {
        match self.codec_type() {
            Some(CodecType::Sbc) => packet.prepend(frames & SBC_FRAME_COUNT_MASK),
            Some(CodecType::Mpeg24Aac) => Ok(()),
            _ => Err(A2dpError::UnsupportedCodec),
        }
    }
}

impl From<[u8; CODEC_INFO_SIZE]> for CodecInfo {
    fn from(bytes: [u8; CODEC_INFO_SIZE]) -> Self {
        Self(bytes)
    }
}

/// Local stream endpoint indices
///
/// Source indices come first; their order is the selection ladder, walked
/// from the highest index down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CodecIndex {
    /// SBC encoder endpoint
    SourceSbc = 0,
    /// AAC encoder endpoint
    SourceAac = 1,
    /// SBC decoder endpoint
    SinkSbc = 2,
}

impl CodecIndex {
    /// Every source index, lowest first
    pub const SOURCES: &'static [Self] = &[Self::SourceSbc, Self::SourceAac];

    /// Every index, lowest first
    pub const ALL: &'static [Self] = &[Self::SourceSbc, Self::SourceAac, Self::SinkSbc];

    /// Display name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SourceSbc => "SBC",
            Self::SourceAac => "AAC",
            Self::SinkSbc => "SBC SINK",
        }
    }

    /// Whether this is an encoder endpoint
    #[must_use]
    pub const fn is_source(self) -> bool {
        matches!(self, Self::SourceSbc | Self::SourceAac)
    }

    /// Codec type served by this endpoint
    #[must_use]
    pub const fn codec_type(self) -> CodecType {
        match self {
            Self::SourceSbc | Self::SinkSbc => CodecType::Sbc,
            Self::SourceAac => CodecType::Mpeg24Aac,
        }
    }

    /// Default configuration of a source index, capability of a sink index
    #[must_use]
    pub fn codec_info(self) -> CodecInfo {
        match self {
            Self::SourceSbc => SbcCapabilities::default_config().to_codec_info(),
            Self::SourceAac => AacCapabilities::default_config().to_codec_info(),
            Self::SinkSbc => SbcCapabilities::local_sink().to_codec_info(),
        }
    }

    /// Endpoint registration: codec element plus the content protection
    /// advertised for it
    #[must_use]
    pub fn init_config(self, content_protection: bool) -> AvdtConfig {
        AvdtConfig {
            codec_info: self.codec_info(),
            protection: if content_protection {
                ContentProtection::scms_t()
            } else {
                ContentProtection::none()
            },
        }
    }

    /// Derive a source configuration from the audio feeding format
    ///
    /// Returns `None` for sink indices and for feedings the encoder cannot
    /// take.
    #[must_use]
    pub fn source_config_from_feeding(self, feeding: &FeedingParams) -> Option<CodecInfo> {
        match self {
            Self::SourceSbc => {
                if !matches!(feeding.channel_count, 1 | 2)
                    || !matches!(feeding.bits_per_sample, 8 | 16 | 24 | 32)
                {
                    return None;
                }
                let mut config = SbcCapabilities::default_config();
                config.sampling_frequencies = sbc::SbcSamplingFrequency(match feeding.sample_rate {
                    11_025 | 22_050 | 44_100 => sbc::SbcSamplingFrequency::HZ_44100,
                    8_000 | 12_000 | 16_000 | 24_000 | 32_000 | 48_000 => {
                        sbc::SbcSamplingFrequency::HZ_48000
                    }
                    _ => return None,
                });
                Some(config.to_codec_info())
            }
            Self::SourceAac => {
                if !matches!(feeding.bits_per_sample, 16 | 24 | 32)
                    || !matches!(feeding.sample_rate, 44_100 | 48_000)
                {
                    return None;
                }
                let mut config = AacCapabilities::default_config();
                config.sampling_frequencies =
                    aac::AacSamplingFrequency::from_hz(feeding.sample_rate)?;
                config.channels = aac::AacChannels(match feeding.channel_count {
                    1 => aac::AacChannels::MONO,
                    2 => aac::AacChannels::STEREO,
                    _ => return None,
                });
                Some(config.to_codec_info())
            }
            Self::SinkSbc => None,
        }
    }
}

/// Codec and content protection configuration of a local endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AvdtConfig {
    /// Codec information element
    pub codec_info: CodecInfo,
    /// Content protection descriptors
    pub protection: ContentProtection,
}

/// PCM format delivered by the audio feeding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FeedingParams {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channel_count: u8,
    /// Bits per sample
    pub bits_per_sample: u8,
}

impl FeedingParams {
    /// Create feeding parameters
    #[must_use]
    pub const fn new(sample_rate: u32, channel_count: u8, bits_per_sample: u8) -> Self {
        Self {
            sample_rate,
            channel_count,
            bits_per_sample,
        }
    }
}
