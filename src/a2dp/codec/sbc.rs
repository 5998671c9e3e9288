//! SBC (Sub-Band Coding) codec information
//!
//! SBC is the mandatory A2DP codec. Its codec information element is six
//! bytes long after the length octet:
//!
//! | Byte | Bits 7..4            | Bits 3..0                          |
//! |------|----------------------|------------------------------------|
//! | 3    | sampling frequency   | channel mode                       |
//! | 4    | block length         | subbands (3..2), allocation (1..0) |
//! | 5    | minimum bitpool      |                                    |
//! | 6    | maximum bitpool      |                                    |
//!
//! Each bitfield newtype below stores its bits relative to its own field;
//! [`SbcCapabilities::from_codec_info`] and [`SbcCapabilities::to_codec_info`]
//! shift them into place.

use super::{CodecInfo, CodecType, MediaType};
use crate::a2dp::A2dpError;
use crate::constants::{CODEC_INFO_SIZE, SBC_MAX_BITPOOL, SBC_MIN_BITPOOL};

/// Length octet of an SBC codec information element
pub const SBC_INFO_LEN: u8 = 6;

/// Largest bitpool the local encoder produces
pub const SBC_SOURCE_MAX_BITPOOL: u8 = 53;

/// SBC Sampling Frequency Support (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcSamplingFrequency(pub u8);

impl SbcSamplingFrequency {
    /// 16000 Hz
    pub const HZ_16000: u8 = 0x08;
    /// 32000 Hz
    pub const HZ_32000: u8 = 0x04;
    /// 44100 Hz
    pub const HZ_44100: u8 = 0x02;
    /// 48000 Hz
    pub const HZ_48000: u8 = 0x01;

    /// Preference order used when picking a single value
    const PREFERENCE: [u8; 4] = [Self::HZ_44100, Self::HZ_48000, Self::HZ_32000, Self::HZ_16000];

    /// All frequencies
    #[must_use]
    pub const fn all() -> Self {
        Self(Self::HZ_16000 | Self::HZ_32000 | Self::HZ_44100 | Self::HZ_48000)
    }

    /// 44.1 kHz and 48 kHz
    #[must_use]
    pub const fn standard() -> Self {
        Self(Self::HZ_44100 | Self::HZ_48000)
    }

    /// Check if frequency is supported
    #[must_use]
    pub const fn supports(&self, freq: u8) -> bool {
        (self.0 & freq) != 0
    }

    /// Frequency in Hz, when exactly one bit is set
    #[must_use]
    pub const fn hz(&self) -> Option<u32> {
        match self.0 {
            Self::HZ_16000 => Some(16_000),
            Self::HZ_32000 => Some(32_000),
            Self::HZ_44100 => Some(44_100),
            Self::HZ_48000 => Some(48_000),
            _ => None,
        }
    }

    /// Encoder code (16 kHz = 0 .. 48 kHz = 3)
    #[must_use]
    pub const fn code(&self) -> Option<u8> {
        match self.0 {
            Self::HZ_16000 => Some(0),
            Self::HZ_32000 => Some(1),
            Self::HZ_44100 => Some(2),
            Self::HZ_48000 => Some(3),
            _ => None,
        }
    }
}

/// SBC Channel Mode Support (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcChannelMode(pub u8);

impl SbcChannelMode {
    /// Mono
    pub const MONO: u8 = 0x08;
    /// Dual Channel
    pub const DUAL_CHANNEL: u8 = 0x04;
    /// Stereo
    pub const STEREO: u8 = 0x02;
    /// Joint Stereo
    pub const JOINT_STEREO: u8 = 0x01;

    const PREFERENCE: [u8; 4] = [
        Self::JOINT_STEREO,
        Self::STEREO,
        Self::DUAL_CHANNEL,
        Self::MONO,
    ];

    /// All modes
    #[must_use]
    pub const fn all() -> Self {
        Self(Self::MONO | Self::DUAL_CHANNEL | Self::STEREO | Self::JOINT_STEREO)
    }

    /// Check if mode is supported
    #[must_use]
    pub const fn supports(&self, mode: u8) -> bool {
        (self.0 & mode) != 0
    }

    /// Encoder code (mono = 0, dual = 1, stereo = 2, joint = 3)
    #[must_use]
    pub const fn code(&self) -> Option<u8> {
        match self.0 {
            Self::MONO => Some(0),
            Self::DUAL_CHANNEL => Some(1),
            Self::STEREO => Some(2),
            Self::JOINT_STEREO => Some(3),
            _ => None,
        }
    }

    /// Number of audio channels carried
    #[must_use]
    pub const fn channel_count(&self) -> Option<u8> {
        match self.0 {
            Self::MONO => Some(1),
            Self::DUAL_CHANNEL | Self::STEREO | Self::JOINT_STEREO => Some(2),
            _ => None,
        }
    }
}

/// SBC Block Length Support (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcBlockLength(pub u8);

impl SbcBlockLength {
    /// 4 blocks
    pub const BLOCKS_4: u8 = 0x08;
    /// 8 blocks
    pub const BLOCKS_8: u8 = 0x04;
    /// 12 blocks
    pub const BLOCKS_12: u8 = 0x02;
    /// 16 blocks
    pub const BLOCKS_16: u8 = 0x01;

    const PREFERENCE: [u8; 4] = [
        Self::BLOCKS_16,
        Self::BLOCKS_12,
        Self::BLOCKS_8,
        Self::BLOCKS_4,
    ];

    /// All block lengths
    #[must_use]
    pub const fn all() -> Self {
        Self(Self::BLOCKS_4 | Self::BLOCKS_8 | Self::BLOCKS_12 | Self::BLOCKS_16)
    }

    /// Check if block length is supported
    #[must_use]
    pub const fn supports(&self, blocks: u8) -> bool {
        (self.0 & blocks) != 0
    }

    /// Number of blocks, when exactly one bit is set
    #[must_use]
    pub const fn count(&self) -> Option<u8> {
        match self.0 {
            Self::BLOCKS_4 => Some(4),
            Self::BLOCKS_8 => Some(8),
            Self::BLOCKS_12 => Some(12),
            Self::BLOCKS_16 => Some(16),
            _ => None,
        }
    }
}

/// SBC Subbands Support (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcSubbands(pub u8);

impl SbcSubbands {
    /// 4 subbands
    pub const SUBBANDS_4: u8 = 0x02;
    /// 8 subbands
    pub const SUBBANDS_8: u8 = 0x01;

    const PREFERENCE: [u8; 2] = [Self::SUBBANDS_8, Self::SUBBANDS_4];

    /// All subband counts
    #[must_use]
    pub const fn all() -> Self {
        Self(Self::SUBBANDS_4 | Self::SUBBANDS_8)
    }

    /// Check if subband count is supported
    #[must_use]
    pub const fn supports(&self, subbands: u8) -> bool {
        (self.0 & subbands) != 0
    }

    /// Number of subbands, when exactly one bit is set
    #[must_use]
    pub const fn count(&self) -> Option<u8> {
        match self.0 {
            Self::SUBBANDS_4 => Some(4),
            Self::SUBBANDS_8 => Some(8),
            _ => None,
        }
    }
}

/// SBC Allocation Method Support (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcAllocationMethod(pub u8);

impl SbcAllocationMethod {
    /// SNR allocation method
    pub const SNR: u8 = 0x02;
    /// Loudness allocation method
    pub const LOUDNESS: u8 = 0x01;

    const PREFERENCE: [u8; 2] = [Self::LOUDNESS, Self::SNR];

    /// All allocation methods
    #[must_use]
    pub const fn all() -> Self {
        Self(Self::SNR | Self::LOUDNESS)
    }

    /// Check if allocation method is supported
    #[must_use]
    pub const fn supports(&self, method: u8) -> bool {
        (self.0 & method) != 0
    }

    /// Encoder code (loudness = 0, SNR = 1)
    #[must_use]
    pub const fn code(&self) -> Option<u8> {
        match self.0 {
            Self::LOUDNESS => Some(0),
            Self::SNR => Some(1),
            _ => None,
        }
    }
}

/// Decoded SBC codec information
///
/// Holds either a capability (any number of bits per field) or a
/// configuration (exactly one bit per field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcCapabilities {
    /// Sampling frequency support (bitfield)
    pub sampling_frequencies: SbcSamplingFrequency,
    /// Channel mode support (bitfield)
    pub channel_modes: SbcChannelMode,
    /// Block length support (bitfield)
    pub block_lengths: SbcBlockLength,
    /// Subbands support (bitfield)
    pub subbands: SbcSubbands,
    /// Allocation method support (bitfield)
    pub allocation_methods: SbcAllocationMethod,
    /// Minimum bitpool value (2-250)
    pub min_bitpool: u8,
    /// Maximum bitpool value (2-250)
    pub max_bitpool: u8,
}

impl SbcCapabilities {
    /// Capabilities of the local SBC encoder
    #[must_use]
    pub const fn local_source() -> Self {
        Self {
            sampling_frequencies: SbcSamplingFrequency::standard(),
            channel_modes: SbcChannelMode::all(),
            block_lengths: SbcBlockLength(SbcBlockLength::BLOCKS_16),
            subbands: SbcSubbands(SbcSubbands::SUBBANDS_8),
            allocation_methods: SbcAllocationMethod(SbcAllocationMethod::LOUDNESS),
            min_bitpool: SBC_MIN_BITPOOL,
            max_bitpool: SBC_SOURCE_MAX_BITPOOL,
        }
    }

    /// Capabilities of the local SBC decoder
    #[must_use]
    pub const fn local_sink() -> Self {
        Self {
            sampling_frequencies: SbcSamplingFrequency::standard(),
            channel_modes: SbcChannelMode::all(),
            block_lengths: SbcBlockLength::all(),
            subbands: SbcSubbands::all(),
            allocation_methods: SbcAllocationMethod::all(),
            min_bitpool: SBC_MIN_BITPOOL,
            max_bitpool: SBC_MAX_BITPOOL,
        }
    }

    /// Default source configuration: 44.1 kHz joint stereo, 16 blocks,
    /// 8 subbands, loudness, bitpool 2..53
    #[must_use]
    pub const fn default_config() -> Self {
        Self {
            sampling_frequencies: SbcSamplingFrequency(SbcSamplingFrequency::HZ_44100),
            channel_modes: SbcChannelMode(SbcChannelMode::JOINT_STEREO),
            block_lengths: SbcBlockLength(SbcBlockLength::BLOCKS_16),
            subbands: SbcSubbands(SbcSubbands::SUBBANDS_8),
            allocation_methods: SbcAllocationMethod(SbcAllocationMethod::LOUDNESS),
            min_bitpool: SBC_MIN_BITPOOL,
            max_bitpool: SBC_SOURCE_MAX_BITPOOL,
        }
    }

    /// Decode an SBC codec information element
    ///
    /// With `is_capability` set, every field needs at least one bit; otherwise
    /// every field needs exactly one.
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidCodecInfo`] if the element is not a well
    /// formed SBC element of the requested kind.
    pub fn from_codec_info(info: &CodecInfo, is_capability: bool) -> Result<Self, A2dpError> {
        let bytes = info.as_bytes();
        if bytes[0] != SBC_INFO_LEN
            || info.media_type() != Some(MediaType::Audio)
            || info.codec_type() != Some(CodecType::Sbc)
        {
            return Err(A2dpError::InvalidCodecInfo);
        }

        let caps = Self {
            sampling_frequencies: SbcSamplingFrequency(bytes[3] >> 4),
            channel_modes: SbcChannelMode(bytes[3] & 0x0F),
            block_lengths: SbcBlockLength(bytes[4] >> 4),
            subbands: SbcSubbands((bytes[4] >> 2) & 0x03),
            allocation_methods: SbcAllocationMethod(bytes[4] & 0x03),
            min_bitpool: bytes[5],
            max_bitpool: bytes[6],
        };

        let fields = [
            caps.sampling_frequencies.0,
            caps.channel_modes.0,
            caps.block_lengths.0,
            caps.subbands.0,
            caps.allocation_methods.0,
        ];
        let fields_ok = if is_capability {
            fields.iter().all(|&bits| bits != 0)
        } else {
            fields.iter().all(|&bits| bits.count_ones() == 1)
        };
        if !fields_ok {
            return Err(A2dpError::InvalidCodecInfo);
        }

        if caps.min_bitpool < SBC_MIN_BITPOOL
            || caps.max_bitpool > SBC_MAX_BITPOOL
            || caps.min_bitpool > caps.max_bitpool
        {
            return Err(A2dpError::InvalidCodecInfo);
        }

        Ok(caps)
    }

    /// Encode into a codec information element
    #[must_use]
    pub const fn to_codec_info(&self) -> CodecInfo {
        let mut bytes = [0u8; CODEC_INFO_SIZE];
        bytes[0] = SBC_INFO_LEN;
        bytes[1] = (MediaType::Audio as u8) << 4;
        bytes[2] = CodecType::Sbc as u8;
        bytes[3] = (self.sampling_frequencies.0 << 4) | self.channel_modes.0;
        bytes[4] = (self.block_lengths.0 << 4) | (self.subbands.0 << 2) | self.allocation_methods.0;
        bytes[5] = self.min_bitpool;
        bytes[6] = self.max_bitpool;
        CodecInfo(bytes)
    }

    const fn field_bits(&self) -> [u8; 5] {
        [
            self.sampling_frequencies.0,
            self.channel_modes.0,
            self.block_lengths.0,
            self.subbands.0,
            self.allocation_methods.0,
        ]
    }

    /// Every field of `self` is contained in the matching field of `caps`
    #[must_use]
    pub fn fields_within(&self, caps: &Self) -> bool {
        self.field_bits()
            .iter()
            .zip(caps.field_bits().iter())
            .all(|(&mine, &theirs)| mine & !theirs == 0)
    }

    /// Every field of `self` shares at least one bit with `other`
    #[must_use]
    pub fn fields_intersect(&self, other: &Self) -> bool {
        self.field_bits()
            .iter()
            .zip(other.field_bits().iter())
            .all(|(&mine, &theirs)| mine & theirs != 0)
    }

    /// Bitpool ranges of `self` and `other` overlap
    #[must_use]
    pub const fn bitpool_overlaps(&self, other: &Self) -> bool {
        self.min_bitpool <= other.max_bitpool && other.min_bitpool <= self.max_bitpool
    }

    /// Narrow a configuration to what `caps` accepts
    ///
    /// Fields come from `self`; the bitpool becomes the overlap of both ranges.
    ///
    /// # Errors
    /// Returns [`A2dpError::UnsupportedCodec`] if a field is outside `caps`
    /// and [`A2dpError::InvalidRange`] if the bitpool ranges are disjoint.
    pub fn restrict_to(&self, caps: &Self) -> Result<Self, A2dpError> {
        if !self.fields_within(caps) {
            return Err(A2dpError::UnsupportedCodec);
        }
        let min_bitpool = self.min_bitpool.max(caps.min_bitpool);
        let max_bitpool = self.max_bitpool.min(caps.max_bitpool);
        if min_bitpool > max_bitpool {
            return Err(A2dpError::InvalidRange);
        }
        Ok(Self {
            min_bitpool,
            max_bitpool,
            ..*self
        })
    }

    /// Pick one value per field from a capability, most preferred first
    ///
    /// The bitpool range is kept as advertised.
    ///
    /// # Errors
    /// Returns [`A2dpError::UnsupportedCodec`] if a field has no bit left.
    pub fn preferred_config(&self) -> Result<Self, A2dpError> {
        Ok(Self {
            sampling_frequencies: SbcSamplingFrequency(pick_preferred(
                self.sampling_frequencies.0,
                &SbcSamplingFrequency::PREFERENCE,
            )?),
            channel_modes: SbcChannelMode(pick_preferred(
                self.channel_modes.0,
                &SbcChannelMode::PREFERENCE,
            )?),
            block_lengths: SbcBlockLength(pick_preferred(
                self.block_lengths.0,
                &SbcBlockLength::PREFERENCE,
            )?),
            subbands: SbcSubbands(pick_preferred(
                self.subbands.0,
                &SbcSubbands::PREFERENCE,
            )?),
            allocation_methods: SbcAllocationMethod(pick_preferred(
                self.allocation_methods.0,
                &SbcAllocationMethod::PREFERENCE,
            )?),
            min_bitpool: self.min_bitpool,
            max_bitpool: self.max_bitpool,
        })
    }

    /// Intersection of two capabilities, field by field
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        Self {
            sampling_frequencies: SbcSamplingFrequency(
                self.sampling_frequencies.0 & other.sampling_frequencies.0,
            ),
            channel_modes: SbcChannelMode(self.channel_modes.0 & other.channel_modes.0),
            block_lengths: SbcBlockLength(self.block_lengths.0 & other.block_lengths.0),
            subbands: SbcSubbands(self.subbands.0 & other.subbands.0),
            allocation_methods: SbcAllocationMethod(
                self.allocation_methods.0 & other.allocation_methods.0,
            ),
            min_bitpool: self.min_bitpool.max(other.min_bitpool),
            max_bitpool: self.max_bitpool.min(other.max_bitpool),
        }
    }

    /// Same stream parameters, ignoring the bitpool range
    #[must_use]
    pub fn same_stream_parameters(&self, other: &Self) -> bool {
        self.field_bits() == other.field_bits()
    }
}

fn pick_preferred(bits: u8, order: &[u8]) -> Result<u8, A2dpError> {
    order
        .iter()
        .copied()
        .find(|&bit| bits & bit != 0)
        .ok_or(A2dpError::UnsupportedCodec)
}

impl Default for SbcCapabilities {
    fn default() -> Self {
        Self::default_config()
    }
}
