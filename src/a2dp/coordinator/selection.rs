//! Codec selection against discovered peer endpoints

use super::CoordinatorOptions;
use crate::a2dp::codec::{CodecIndex, CodecInfo};
use crate::a2dp::content_protection::ContentProtection;
use crate::a2dp::peer::{PeerRecord, PeerTable};
use crate::a2dp::session::SessionCommand;
use crate::a2dp::state::NegotiationState;

/// Enabled source codecs, highest index first
pub(super) fn source_ladder(options: &CoordinatorOptions) -> impl Iterator<Item = CodecIndex> + '_ {
    CodecIndex::SOURCES
        .iter()
        .rev()
        .copied()
        .filter(|index| options.source_codecs.contains(index))
}

/// First sink of `peer`, in arrival order, that takes `config`
///
/// With `cp_required` the sink must also advertise SCMS-T.
pub(super) fn find_peer_sink_supports_codec(
    config: &CodecInfo,
    peer: &PeerRecord,
    cp_required: bool,
) -> Option<usize> {
    peer.sinks.position(|sink| {
        config.config_matches_capabilities(&sink.codec_caps)
            && (!cp_required || sink.protection.has_scms_t())
    })
}

/// First source of `peer` of the same codec type as `active` that the local
/// sink can consume
pub(super) fn find_peer_source_supports_codec(
    active: &CodecInfo,
    peer: &PeerRecord,
) -> Option<usize> {
    peer.sources.position(|source| {
        active.codec_type_equals(&source.codec_caps)
            && source.codec_caps.is_peer_source_codec_supported()
    })
}

/// Walk the source ladder and return the first codec with a matching sink
///
/// Codec preference dominates arrival order; within one codec the earliest
/// sink wins.
pub(super) fn select_peer_sink(
    options: &CoordinatorOptions,
    peer: &PeerRecord,
) -> Option<(CodecIndex, usize)> {
    source_ladder(options).find_map(|codec| {
        debug!("trying codec {}", codec.name());
        let config = codec.init_config(options.content_protection).codec_info;
        find_peer_sink_supports_codec(&config, peer, options.content_protection)
            .map(|index| (codec, index))
    })
}

/// Configure the first open peer whose sinks take `config`
///
/// Stores the resulting configuration as the active one and returns the
/// reconfiguration to send to that peer.
pub(super) fn select_open_peer(
    options: &CoordinatorOptions,
    state: &mut NegotiationState,
    peers: &mut PeerTable,
    config: &CodecInfo,
) -> Option<SessionCommand> {
    for (handle, peer) in peers.iter_open_mut() {
        let Some(index) = find_peer_sink_supports_codec(config, peer, options.content_protection)
        else {
            debug!("peer {} does not support codec {}", handle, config.name());
            continue;
        };
        let Some(&sink) = peer.sinks.get(index) else {
            continue;
        };

        if !state.content_protection.sink_acceptable(&sink.protection) {
            debug!("sink of peer {} does not support content protection", handle);
            continue;
        }

        let Ok(peer_config) = config.build_sink_config(&sink.codec_caps) else {
            continue;
        };

        state.codec_config = peer_config;
        peer.select_sink(index);
        peer.codec_config = peer_config;

        let cp_active = options.content_protection && sink.protection.has_scms_t();
        peer.cp_active = cp_active;
        state.content_protection.set_active(cp_active);

        debug!("reconfigure h:{}", handle);
        return Some(SessionCommand::Reconfigure {
            handle,
            sep_info_idx: sink.sep_info_idx,
            codec_config: peer_config,
            protection: if cp_active {
                ContentProtection::scms_t()
            } else {
                ContentProtection::none()
            },
        });
    }
    None
}
