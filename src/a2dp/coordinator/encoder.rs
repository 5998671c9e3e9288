//! Encoder parameters and outbound payload tagging

use super::CodecCoordinator;
use crate::a2dp::A2dpError;
use crate::a2dp::codec::{CodecInfo, CodecType};
use crate::a2dp::media::{MediaPayload, MediaSource};
use crate::a2dp::session::SessionLayer;
use crate::constants::MTU_NO_LIMIT;

/// Codec specific encoder settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncoderCodecParams {
    /// SBC encoder settings, as codes of the codec information element
    Sbc {
        /// Number of subbands
        subbands: u8,
        /// Number of blocks
        blocks: u8,
        /// Allocation method code
        allocation_method: u8,
        /// Channel mode code
        channel_mode: u8,
        /// Sampling frequency code
        sampling_frequency: u8,
    },
    /// AAC encoder settings
    Aac {
        /// Sample rate in Hz
        sample_rate: u32,
        /// Number of channels
        channel_count: u8,
    },
}

/// Parameters to start the encoder with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EncoderInitParams {
    /// Smallest MTU of the open streams, [`MTU_NO_LIMIT`] when none is open
    pub mtu: u16,
    /// Codec settings derived from the active configuration
    pub codec: EncoderCodecParams,
}

/// Parameters the encoder adapts while streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EncoderUpdateParams {
    /// Smallest MTU of the open streams
    pub min_mtu: u16,
    /// Lowest bitpool every open sink accepts
    pub min_bitpool: u8,
    /// Highest bitpool every open sink accepts
    pub max_bitpool: u8,
}

impl Default for EncoderUpdateParams {
    fn default() -> Self {
        Self {
            min_mtu: MTU_NO_LIMIT,
            min_bitpool: 0,
            max_bitpool: 0,
        }
    }
}

impl<S: SessionLayer> CodecCoordinator<S> {
    /// Encoder settings for the active configuration
    ///
    /// # Errors
    /// Returns [`A2dpError::UnsupportedCodec`] if the active configuration
    /// has no encoder and [`A2dpError::InvalidCodecInfo`] if it does not
    /// decode.
    pub fn encoder_init_params(&self) -> Result<EncoderInitParams, A2dpError> {
        let config = self.state.lock(|state| state.codec_config);
        let mtu = self
            .peers
            .iter_open()
            .map(|(_, peer)| peer.mtu)
            .fold(MTU_NO_LIMIT, u16::min);
        Ok(EncoderInitParams {
            mtu,
            codec: codec_params(&config)?,
        })
    }

    /// Narrow the bitpool range to what every open sink accepts
    ///
    /// Starts from the active configuration's range, intersects it with the
    /// first sink of the active codec type of each open peer, then with the
    /// bitpool preference a peer sent through set-configuration. `params` is
    /// only written on success.
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidRange`] if the active configuration has no
    /// bitpool range or the intersection is empty.
    pub fn encoder_update_params(&self, params: &mut EncoderUpdateParams) -> Result<(), A2dpError> {
        let (min_mtu, min_bitpool, max_bitpool) = self.state.lock(|state| {
            let config = state.codec_config;
            let (Some(mut min_bitpool), Some(mut max_bitpool)) =
                (config.min_bitpool(), config.max_bitpool())
            else {
                error!("no bitpool range in codec {}", config.name());
                return Err(A2dpError::InvalidRange);
            };

            let mut min_mtu = MTU_NO_LIMIT;
            for (handle, peer) in self.peers.iter_open() {
                min_mtu = min_mtu.min(peer.mtu);
                let Some(sink) = peer
                    .sinks
                    .records()
                    .iter()
                    .find(|sink| config.codec_type_equals(&sink.codec_caps))
                else {
                    continue;
                };
                if let Some(peer_min) = sink.codec_caps.min_bitpool() {
                    min_bitpool = min_bitpool.max(peer_min);
                }
                if let Some(peer_max) = sink.codec_caps.max_bitpool() {
                    max_bitpool = max_bitpool.min(peer_max);
                }
                trace!("peer {} bitpool [{}, {}]", handle, min_bitpool, max_bitpool);
            }

            let preference = state.setconfig_preference;
            if preference.is_valid_config() && config.codec_type_equals(&preference) {
                if let Some(pref_min) = preference.min_bitpool() {
                    min_bitpool = min_bitpool.max(pref_min);
                }
                if let Some(pref_max) = preference.max_bitpool() {
                    max_bitpool = max_bitpool.min(pref_max);
                }
                trace!("preferred bitpool [{}, {}]", min_bitpool, max_bitpool);
            }
            Ok((min_mtu, min_bitpool, max_bitpool))
        })?;

        if min_bitpool > max_bitpool {
            error!("empty bitpool range [{}, {}]", min_bitpool, max_bitpool);
            return Err(A2dpError::InvalidRange);
        }

        params.min_mtu = min_mtu;
        params.min_bitpool = min_bitpool;
        params.max_bitpool = max_bitpool;
        Ok(())
    }

    /// Pull the next encoded packet and tag it for transmission
    ///
    /// Reads the timestamp, prepends the codec's payload header and, while
    /// content protection is active, the copy-control flag. Returns `None`
    /// when the source has nothing queued.
    pub fn next_payload<M: MediaSource>(
        &self,
        codec_info: &CodecInfo,
        source: &mut M,
    ) -> Option<MediaPayload> {
        let mut packet = source.read_packet()?;

        let timestamp = codec_info.packet_timestamp(packet.as_bytes());
        let frames = packet.frames;
        let header = codec_info.build_codec_header(&mut packet, frames);
        if timestamp.is_none() || header.is_err() {
            error!("unsupported codec type ({})", codec_info.raw_codec_type());
        }

        let content_protection = self.state.lock(|state| state.content_protection);
        if content_protection.active()
            && packet.prepend(content_protection.flag() as u8).is_err()
        {
            error!("no headroom for the content protection flag");
        }

        Some(MediaPayload {
            packet,
            timestamp: timestamp.unwrap_or(0),
        })
    }
}

fn codec_params(config: &CodecInfo) -> Result<EncoderCodecParams, A2dpError> {
    let missing = || A2dpError::InvalidCodecInfo;
    match config.codec_type() {
        Some(CodecType::Sbc) => Ok(EncoderCodecParams::Sbc {
            subbands: config.number_of_subbands().ok_or_else(missing)?,
            blocks: config.number_of_blocks().ok_or_else(missing)?,
            allocation_method: config.allocation_method_code().ok_or_else(missing)?,
            channel_mode: config.channel_mode_code().ok_or_else(missing)?,
            sampling_frequency: config.sampling_frequency_code().ok_or_else(missing)?,
        }),
        Some(CodecType::Mpeg24Aac) => Ok(EncoderCodecParams::Aac {
            sample_rate: config.sampling_frequency().ok_or_else(missing)?,
            channel_count: config.channel_count().ok_or_else(missing)?,
        }),
        _ => Err(A2dpError::UnsupportedCodec),
    }
}
