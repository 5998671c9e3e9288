//! Codec Coordinator
//!
//! [`CodecCoordinator`] owns the peer table and the shared negotiation state
//! and exposes the call-outs the AVDTP session layer drives during stream
//! setup. Results that the session layer must act on are delivered through
//! its [`SessionLayer`] as fire-and-forget [`SessionCommand`]s.
//!
//! Operations on one handle are expected to be serialized by the session
//! layer; everything touching the active configuration goes through the
//! shared state lock, and call-ins are only sent once it is released.

mod encoder;
mod selection;

pub use encoder::*;

use super::codec::{AvdtConfig, CodecIndex, CodecInfo, CodecType, FeedingParams};
use super::content_protection::{ContentProtection, ScmsFlag};
use super::peer::{Collection, EndpointCapability, PeerRecord, PeerTable};
use super::session::{SessionCommand, SessionLayer};
use super::state::{NegotiationState, SharedNegotiationState};
use super::{
    A2dpError, AvHandle, AvdtHandle, AvdtpRole, ConfigStatus, ServiceCategory, ServiceClass,
    StreamEndpointId,
};
use crate::BluetoothAddress;

/// Options for configuring a [`CodecCoordinator`]
///
/// # Examples
///
/// ```rust
/// use bondybird_a2dp::a2dp::{CodecIndex, CoordinatorOptions};
///
/// // SBC only, with SCMS-T content protection
/// let options = CoordinatorOptions {
///     content_protection: true,
///     source_codecs: &[CodecIndex::SourceSbc],
/// };
/// assert!(options.source_codecs.contains(&CodecIndex::SourceSbc));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorOptions {
    /// Advertise and negotiate SCMS-T content protection
    pub content_protection: bool,
    /// Local source codecs taking part in selection
    ///
    /// The order here does not matter; selection always walks
    /// [`CodecIndex::SOURCES`] from the highest index down.
    pub source_codecs: &'static [CodecIndex],
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            content_protection: false,
            source_codecs: CodecIndex::SOURCES,
        }
    }
}

/// Endpoint configuration exchanged with the session layer in
/// [`CodecCoordinator::get_config`]
///
/// On input it describes the remote endpoint being reported; once selection
/// succeeds as initiator it holds the configuration to propose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EndpointConfig {
    /// Codec capability in, codec configuration out
    pub codec_info: CodecInfo,
    /// Discovery index of the endpoint
    pub sep_info_idx: u8,
    /// Stream endpoint identifier assigned by the peer
    pub seid: StreamEndpointId,
    /// Content protection descriptors
    pub protection: ContentProtection,
}

/// Progress of capability collection reported by
/// [`CodecCoordinator::get_config`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GetConfigStatus {
    /// More endpoint capabilities are expected
    Collecting,
    /// A configuration was selected for the peer
    Selected,
}

/// A2DP codec negotiation engine
pub struct CodecCoordinator<S: SessionLayer> {
    options: CoordinatorOptions,
    peers: PeerTable,
    state: SharedNegotiationState,
    session: S,
}

impl<S: SessionLayer> CodecCoordinator<S> {
    /// Create a coordinator reporting to `session`
    ///
    /// The copy-control flag starts at copy never when content protection is
    /// enabled and copy free otherwise; the active configuration starts at
    /// the default SBC configuration.
    #[must_use]
    pub fn new(options: CoordinatorOptions, session: S) -> Self {
        let coordinator = Self {
            options,
            peers: PeerTable::new(),
            state: SharedNegotiationState::new(options.content_protection),
            session,
        };
        coordinator.reset_codec();
        coordinator
    }

    /// Options in use
    #[must_use]
    pub const fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    /// Session layer receiving the call-ins
    #[must_use]
    pub const fn session(&self) -> &S {
        &self.session
    }

    /// Peer record of `handle`
    ///
    /// # Errors
    /// Returns [`A2dpError::NotFound`] if the handle maps outside the table.
    pub fn peer(&self, handle: AvHandle) -> Result<&PeerRecord, A2dpError> {
        self.peers.get(handle)
    }

    /// Shared negotiation state
    #[must_use]
    pub const fn shared_state(&self) -> &SharedNegotiationState {
        &self.state
    }

    /// Configuration to register a local stream endpoint with
    ///
    /// Clears the set-configuration preference. Returns `None` for source
    /// indices disabled in the options.
    pub fn init_endpoint(&self, index: CodecIndex) -> Option<AvdtConfig> {
        self.state
            .lock(|state| state.setconfig_preference = CodecInfo::EMPTY);
        if index.is_source() && !self.options.source_codecs.contains(&index) {
            debug!("codec {} disabled", index.name());
            return None;
        }
        Some(index.init_config(self.options.content_protection))
    }

    /// Reset the active configuration to the default codec
    pub fn reset_codec(&self) {
        self.state
            .lock(|state| state.codec_config = CodecIndex::SourceSbc.codec_info());
    }

    /// Record the result of endpoint discovery on `handle`
    ///
    /// Starts a new capability collection round for the peer. `local` is the
    /// local service class the connection was made for; capabilities are
    /// then collected for the opposite role.
    ///
    /// # Errors
    /// Returns [`A2dpError::NotFound`] if the handle maps outside the table.
    pub fn discovery_result(
        &mut self,
        handle: AvHandle,
        num_seps: u8,
        num_sinks: u8,
        num_sources: u8,
        addr: BluetoothAddress,
        local: ServiceClass,
    ) -> Result<(), A2dpError> {
        debug!(
            "discovery h:{} seps:{} sinks:{} sources:{}",
            handle, num_seps, num_sinks, num_sources
        );
        let peer = self.peer_mut(handle)?;
        if peer.opened {
            error!("peer {} already opened", handle);
        }
        peer.begin_discovery(addr, num_seps, num_sinks, num_sources, local);
        Ok(())
    }

    /// Collect one remote endpoint capability and, once collection is
    /// complete, select the configuration for the peer
    ///
    /// When the local side initiates the configuration, `endpoint` is
    /// rewritten with the configuration to propose. When the peer is the
    /// acceptor, `endpoint.sep_info_idx` is set past the last endpoint so no
    /// further capabilities are fetched, and a reconfiguration is requested
    /// if the accepted configuration needs one.
    ///
    /// # Errors
    /// Returns [`A2dpError::NotFound`] for an unknown handle and
    /// [`A2dpError::SelectionFailed`] if no local codec matches the peer.
    pub fn get_config(
        &mut self,
        handle: AvHandle,
        endpoint: &mut EndpointConfig,
    ) -> Result<GetConfigStatus, A2dpError> {
        let Self {
            options,
            peers,
            state,
            session,
        } = self;
        let Ok(peer) = peers.get_mut(handle) else {
            error!("get_config: no peer for handle {}", handle);
            return Err(A2dpError::NotFound);
        };

        debug!(
            "get_config h:{} codec:{} seid:{}",
            handle,
            endpoint.codec_info.name(),
            endpoint.seid
        );

        let query_sources = peer.uuid_to_connect == Some(ServiceClass::AudioSource);
        let valid = if query_sources {
            endpoint.codec_info.is_peer_source_codec_valid()
        } else {
            endpoint.codec_info.is_peer_sink_codec_valid()
        };
        let record = valid.then_some(EndpointCapability {
            sep_info_idx: endpoint.sep_info_idx,
            seid: endpoint.seid,
            codec_caps: endpoint.codec_info,
            protection: endpoint.protection,
        });

        if query_sources {
            if peer.sources.offer(record) == Collection::Pending {
                return Ok(GetConfigStatus::Collecting);
            }
            debug!("last source reached");
            state.lock(|state| configure_from_peer_source(state, peer, endpoint))?;
            return Ok(GetConfigStatus::Selected);
        }

        if peer.sinks.offer(record) == Collection::Pending {
            return Ok(GetConfigStatus::Collecting);
        }
        debug!("last sink reached");
        let reconfigure =
            state.lock(|state| configure_for_peer_sink(options, state, handle, peer, endpoint))?;
        if let Some(command) = reconfigure {
            session.send(command);
        }
        Ok(GetConfigStatus::Selected)
    }

    /// Validate a configuration proposed by the peer
    ///
    /// The verdict is sent to the session layer as a
    /// [`SessionCommand::SetConfigResponse`]. Content protection is checked
    /// first, then codec support for the local role. On acceptance the
    /// proposal is kept as the bitpool preference; a local sink adopts it as
    /// the active configuration outright.
    #[allow(clippy::too_many_arguments)]
    pub fn set_config(
        &mut self,
        handle: AvHandle,
        codec_info: &CodecInfo,
        seid: StreamEndpointId,
        addr: BluetoothAddress,
        protection: &ContentProtection,
        local_role: AvdtpRole,
        avdt_handle: AvdtHandle,
    ) {
        debug!(
            "set_config h:{} seid:{} addr:{} codec:{} cp:{}",
            handle,
            seid,
            addr,
            codec_info.name(),
            protection.count
        );
        let Self {
            options,
            peers,
            state,
            session,
        } = self;

        let Ok(peer) = peers.get_mut(handle) else {
            error!("set_config: no peer for handle {}", handle);
            session.send(SessionCommand::SetConfigResponse {
                handle,
                status: ConfigStatus::Busy,
                category: Some(ServiceCategory::MediaCodec),
                reconfig_needed: false,
                avdt_handle,
            });
            return;
        };
        if peer.opened {
            error!("set_config: peer {} already in use", handle);
        }

        let verdict = protection
            .validate_proposal(options.content_protection)
            .map_err(|_| (ConfigStatus::BadCpType, ServiceCategory::ContentProtection))
            .and_then(|()| {
                let supported = match local_role {
                    AvdtpRole::Sink => codec_info.is_sink_codec_supported(),
                    AvdtpRole::Source => codec_info.is_source_codec_supported(),
                };
                if supported {
                    Ok(())
                } else {
                    Err((ConfigStatus::WrongCodec, ServiceCategory::MediaCodec))
                }
            });

        if let Err((status, category)) = verdict {
            error!("set_config: reject status {} category {}", status, category);
            session.send(SessionCommand::SetConfigResponse {
                handle,
                status,
                category: Some(category),
                reconfig_needed: false,
                avdt_handle,
            });
            return;
        }

        let reconfig_needed = state.lock(|state| {
            let mut reconfig_needed = codec_info.requires_reconfig(&state.codec_config)
                || (protection.count == 1 && !state.content_protection.active());
            state.setconfig_preference = *codec_info;
            if local_role == AvdtpRole::Sink {
                state.codec_config = *codec_info;
                reconfig_needed = false;
            }
            reconfig_needed
        });

        peer.acceptor = true;
        peer.reconfig_needed = reconfig_needed;
        debug!("set_config: accept h:{} reconfig:{}", handle, reconfig_needed);
        session.send(SessionCommand::SetConfigResponse {
            handle,
            status: ConfigStatus::Success,
            category: None,
            reconfig_needed,
            avdt_handle,
        });
    }

    /// Mark the stream of `handle` open
    ///
    /// # Errors
    /// Returns [`A2dpError::NotFound`] if the handle maps outside the table.
    pub fn open(
        &mut self,
        handle: AvHandle,
        codec_info: &CodecInfo,
        mtu: u16,
    ) -> Result<(), A2dpError> {
        debug!("open h:{} mtu:{} codec:{}", handle, mtu, codec_info.name());
        let peer = self.peer_mut(handle)?;
        peer.opened = true;
        peer.mtu = mtu;
        Ok(())
    }

    /// Mark the stream of `handle` closed and forget the peer
    ///
    /// The set-configuration preference is cleared even if the handle is
    /// unknown. Closing a known peer also widens the active configuration's
    /// bitpool back to the codec default, so the range the next
    /// [`encoder_update_params`](Self::encoder_update_params) derives only
    /// reflects the peers still open.
    ///
    /// # Errors
    /// Returns [`A2dpError::NotFound`] if the handle maps outside the table.
    pub fn close(&mut self, handle: AvHandle) -> Result<(), A2dpError> {
        debug!("close h:{}", handle);
        let result = self.peers.reset(handle);
        if result.is_err() {
            error!("close: no peer for handle {}", handle);
        }
        self.state.lock(|state| {
            state.setconfig_preference = CodecInfo::EMPTY;
            if result.is_ok() {
                state.codec_config = state.codec_config.with_default_bitpool();
            }
        });
        result
    }

    /// Forget the configuration negotiated with `handle`, keeping the
    /// discovered capabilities
    ///
    /// # Errors
    /// Returns [`A2dpError::NotFound`] if the handle maps outside the table.
    pub fn discard_config(&mut self, handle: AvHandle) -> Result<(), A2dpError> {
        self.peer_mut(handle)?.discard_config();
        Ok(())
    }

    /// Pick a source codec for a new audio feeding format
    ///
    /// Walks the source ladder from the highest index down, derives each
    /// codec's configuration from `feeding` and tries it against the open
    /// peers. The first peer that accepts it is reconfigured. Returns whether
    /// a codec was selected.
    pub fn set_codec_from_feeding(&mut self, feeding: &FeedingParams) -> bool {
        let Self {
            options,
            peers,
            state,
            session,
        } = self;

        let reconfigure = state.lock(|state| {
            for index in selection::source_ladder(options) {
                debug!("trying codec {}", index.name());
                let Some(config) = index.source_config_from_feeding(feeding) else {
                    debug!("cannot set up source codec {}", index.name());
                    continue;
                };
                if let Some(command) = selection::select_open_peer(options, state, peers, &config) {
                    debug!("selected codec {}", index.name());
                    return Some(command);
                }
                debug!("cannot select source codec {}", index.name());
            }
            None
        });

        match reconfigure {
            Some(command) => {
                session.send(command);
                true
            }
            None => false,
        }
    }

    /// Whether every open peer has a sink that takes the active
    /// configuration under the current copy-control policy
    #[must_use]
    pub fn codec_supported(&self) -> bool {
        self.state.lock(|state| {
            self.peers.iter_open().all(|(handle, peer)| {
                let supported = selection::find_peer_sink_supports_codec(
                    &state.codec_config,
                    peer,
                    self.options.content_protection,
                )
                .and_then(|index| peer.sinks.get(index))
                .is_some_and(|sink| state.content_protection.sink_acceptable(&sink.protection));
                if !supported {
                    debug!("peer {} does not support the active codec", handle);
                }
                supported
            })
        })
    }

    /// Whether the first sink of `handle` with the active codec type
    /// advertises SCMS-T
    ///
    /// # Errors
    /// Returns [`A2dpError::NotFound`] if the handle maps outside the table.
    pub fn peer_cp_supported(&self, handle: AvHandle) -> Result<bool, A2dpError> {
        let peer = self.peers.get(handle)?;
        Ok(self.state.lock(|state| {
            peer.sinks
                .records()
                .iter()
                .find(|sink| state.codec_config.codec_type_equals(&sink.codec_caps))
                .is_some_and(|sink| sink.protection.has_scms_t())
        }))
    }

    /// Bitpool range the peer asked for through set-configuration, if it
    /// applies to the active codec
    #[must_use]
    pub fn remote_bitpool_preference(&self) -> Option<(u8, u8)> {
        self.state.lock(|state| {
            let preference = state.setconfig_preference;
            if !preference.is_valid_config()
                || !state.codec_config.codec_type_equals(&preference)
            {
                return None;
            }
            Some((preference.min_bitpool()?, preference.max_bitpool()?))
        })
    }

    /// Active codec configuration
    #[must_use]
    pub fn active_codec(&self) -> CodecInfo {
        self.state.lock(|state| state.codec_config)
    }

    /// Codec type of the active configuration
    #[must_use]
    pub fn active_codec_type(&self) -> Option<CodecType> {
        self.active_codec().codec_type()
    }

    /// Whether the active stream carries SCMS-T
    #[must_use]
    pub fn cp_is_active(&self) -> bool {
        self.state.lock(|state| state.content_protection.active())
    }

    /// Current copy-control flag
    #[must_use]
    pub fn cp_flag(&self) -> ScmsFlag {
        self.state.lock(|state| state.content_protection.flag())
    }

    /// Change the copy-control flag
    ///
    /// Fails, leaving the flag unchanged, when content protection is disabled
    /// and `flag` is not [`ScmsFlag::CopyFree`].
    pub fn set_cp_flag(&self, flag: ScmsFlag) -> bool {
        self.state.lock(|state| state.content_protection.set_flag(flag))
    }

    fn peer_mut(&mut self, handle: AvHandle) -> Result<&mut PeerRecord, A2dpError> {
        self.peers.get_mut(handle).inspect_err(|_| {
            error!("no peer for handle {}", handle);
        })
    }
}

/// Local sink: take the first peer source of the active codec type and
/// derive the preferred configuration from it
fn configure_from_peer_source(
    state: &mut NegotiationState,
    peer: &mut PeerRecord,
    endpoint: &mut EndpointConfig,
) -> Result<(), A2dpError> {
    let Some(index) = selection::find_peer_source_supports_codec(&state.codec_config, peer) else {
        error!("no peer source for codec {}", state.codec_config.name());
        return Err(A2dpError::SelectionFailed);
    };
    let source = peer.sources.get(index).copied().ok_or(A2dpError::SelectionFailed)?;
    let config = source.codec_caps.build_source_to_sink_config()?;

    peer.select_source(index);
    peer.codec_config = config;
    peer.cp_active = false;
    state.content_protection.set_active(false);

    endpoint.protection = ContentProtection::none();
    endpoint.sep_info_idx = source.sep_info_idx;
    endpoint.codec_info = config;
    Ok(())
}

/// Local source: walk the codec ladder against the peer's sinks and store
/// the winning configuration
///
/// Returns the reconfiguration to request when an accepted configuration
/// has to be replaced.
fn configure_for_peer_sink(
    options: &CoordinatorOptions,
    state: &mut NegotiationState,
    handle: AvHandle,
    peer: &mut PeerRecord,
    endpoint: &mut EndpointConfig,
) -> Result<Option<SessionCommand>, A2dpError> {
    let Some((codec, index)) = selection::select_peer_sink(options, peer) else {
        error!("cannot find peer sink for any local codec");
        return Err(A2dpError::SelectionFailed);
    };
    let sink = peer.sinks.get(index).copied().ok_or(A2dpError::SelectionFailed)?;

    let config = codec.codec_info().build_sink_config(&sink.codec_caps)?;
    if peer.acceptor {
        debug!("no need to fetch more endpoints");
        endpoint.sep_info_idx = peer.num_seps;
    }

    state.codec_config = config;
    peer.select_sink(index);
    peer.codec_config = config;

    let cp_active = options.content_protection && sink.protection.has_scms_t();
    peer.cp_active = cp_active;
    state.content_protection.set_active(cp_active);
    let protection = if cp_active {
        ContentProtection::scms_t()
    } else {
        ContentProtection::none()
    };
    endpoint.protection = protection;

    if peer.acceptor {
        if peer.reconfig_needed {
            debug!("reconfigure h:{}", handle);
            return Ok(Some(SessionCommand::Reconfigure {
                handle,
                sep_info_idx: sink.sep_info_idx,
                codec_config: config,
                protection,
            }));
        }
    } else if !peer.opened {
        endpoint.sep_info_idx = sink.sep_info_idx;
        endpoint.codec_info = config;
    }
    Ok(None)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::a2dp::codec::test_vectors::{NON_A2DP, SBC, SBC_SINK, sbc_sink_with_bitpool};
    use crate::a2dp::content_protection::ContentProtectionState;
    use crate::a2dp::session::SessionChannel;
    use crate::constants::SCMS_T_DESCRIPTOR;

    pub const AAC_SINK: CodecInfo = CodecInfo([8, 0, 2, 0x80, 0x01, 0x8C, 0x84, 0xE2, 0x00, 0]);
    pub const PEER: BluetoothAddress = BluetoothAddress::new([0x00, 0x1B, 0xDC, 0x0F, 0xAA, 0x01]);

    pub fn sink(seid: u8, codec_info: CodecInfo, protection: ContentProtection) -> EndpointConfig {
        EndpointConfig {
            codec_info,
            sep_info_idx: seid,
            seid,
            protection,
        }
    }

    /// Propose `codec_info` through set-configuration from [`PEER`]
    pub fn propose<S: SessionLayer>(
        coordinator: &mut CodecCoordinator<S>,
        handle: AvHandle,
        codec_info: &CodecInfo,
        protection: ContentProtection,
        local_role: AvdtpRole,
        avdt_handle: AvdtHandle,
    ) {
        coordinator.set_config(handle, codec_info, 1, PEER, &protection, local_role, avdt_handle);
    }

    /// Discover `caps` as the sinks of `handle`, returning the final status
    pub fn discover_sinks<S: SessionLayer>(
        coordinator: &mut CodecCoordinator<S>,
        handle: AvHandle,
        caps: &[EndpointConfig],
    ) -> (Result<GetConfigStatus, A2dpError>, EndpointConfig) {
        let count = caps.len() as u8;
        coordinator
            .discovery_result(handle, count, count, 0, PEER, ServiceClass::AudioSource)
            .unwrap();
        let mut last = (Ok(GetConfigStatus::Collecting), caps[0]);
        for cap in caps {
            let mut endpoint = *cap;
            let status = coordinator.get_config(handle, &mut endpoint);
            last = (status, endpoint);
        }
        last
    }

    #[test]
    fn test_new_resets_codec_and_flag() {
        let channel = SessionChannel::new();
        let coordinator = CodecCoordinator::new(CoordinatorOptions::default(), &channel);
        assert_eq!(coordinator.active_codec_type(), Some(CodecType::Sbc));
        assert_eq!(&coordinator.active_codec().as_bytes()[..7], &SBC.as_bytes()[..7]);
        assert_eq!(coordinator.cp_flag(), ScmsFlag::CopyFree);
        assert!(!coordinator.set_cp_flag(ScmsFlag::CopyNever));

        let protected = CodecCoordinator::new(
            CoordinatorOptions {
                content_protection: true,
                ..CoordinatorOptions::default()
            },
            &channel,
        );
        assert_eq!(protected.cp_flag(), ScmsFlag::CopyNever);
        assert!(protected.set_cp_flag(ScmsFlag::CopyOnce));
        assert_eq!(protected.cp_flag(), ScmsFlag::CopyOnce);
    }

    #[test]
    fn test_init_endpoint() {
        let channel = SessionChannel::new();
        let coordinator = CodecCoordinator::new(
            CoordinatorOptions {
                content_protection: true,
                source_codecs: &[CodecIndex::SourceSbc],
            },
            &channel,
        );
        let config = coordinator.init_endpoint(CodecIndex::SourceSbc).unwrap();
        assert_eq!(config.protection.info, SCMS_T_DESCRIPTOR);
        assert!(coordinator.init_endpoint(CodecIndex::SourceAac).is_none());
        assert!(coordinator.init_endpoint(CodecIndex::SinkSbc).is_some());
    }

    #[test]
    fn test_unknown_handle() {
        let channel = SessionChannel::new();
        let mut coordinator = CodecCoordinator::new(CoordinatorOptions::default(), &channel);
        let mut endpoint = sink(1, SBC_SINK, ContentProtection::none());
        assert_eq!(coordinator.get_config(0x4F, &mut endpoint), Err(A2dpError::NotFound));
        assert_eq!(
            coordinator.discovery_result(0x00, 1, 1, 0, PEER, ServiceClass::AudioSource),
            Err(A2dpError::NotFound)
        );
        assert_eq!(coordinator.open(0x47, &SBC, 672), Err(A2dpError::NotFound));
        assert_eq!(coordinator.close(0x47), Err(A2dpError::NotFound));
        assert_eq!(coordinator.peer_cp_supported(0x47), Err(A2dpError::NotFound));
    }

    #[test]
    fn test_collection_fires_once() {
        let channel = SessionChannel::new();
        let mut coordinator = CodecCoordinator::new(CoordinatorOptions::default(), &channel);
        coordinator
            .discovery_result(0x41, 2, 2, 0, PEER, ServiceClass::AudioSource)
            .unwrap();

        let mut first = sink(1, SBC_SINK, ContentProtection::none());
        assert_eq!(
            coordinator.get_config(0x41, &mut first),
            Ok(GetConfigStatus::Collecting)
        );
        assert_eq!(first.codec_info, SBC_SINK);

        let mut second = sink(2, SBC_SINK, ContentProtection::none());
        assert_eq!(
            coordinator.get_config(0x41, &mut second),
            Ok(GetConfigStatus::Selected)
        );
        assert_eq!(second.sep_info_idx, 1);

        let mut extra = sink(3, SBC_SINK, ContentProtection::none());
        assert_eq!(
            coordinator.get_config(0x41, &mut extra),
            Ok(GetConfigStatus::Collecting)
        );
    }

    #[test]
    fn test_collection_fires_early_at_capacity() {
        let channel = SessionChannel::new();
        let mut coordinator = CodecCoordinator::new(CoordinatorOptions::default(), &channel);
        coordinator
            .discovery_result(0x41, 5, 5, 0, PEER, ServiceClass::AudioSource)
            .unwrap();
        let mut statuses = [GetConfigStatus::Collecting; 5];
        for (seid, status) in statuses.iter_mut().enumerate() {
            let mut endpoint = sink(seid as u8, SBC_SINK, ContentProtection::none());
            *status = coordinator.get_config(0x41, &mut endpoint).unwrap();
        }
        assert_eq!(
            statuses,
            [
                GetConfigStatus::Collecting,
                GetConfigStatus::Collecting,
                GetConfigStatus::Selected,
                GetConfigStatus::Collecting,
                GetConfigStatus::Collecting,
            ]
        );
        assert_eq!(coordinator.peer(0x41).unwrap().sinks.received(), 5);
    }

    #[test]
    fn test_initiator_gets_intersected_config() {
        let channel = SessionChannel::new();
        let mut coordinator = CodecCoordinator::new(
            CoordinatorOptions {
                content_protection: false,
                source_codecs: &[CodecIndex::SourceSbc],
            },
            &channel,
        );
        let caps = sbc_sink_with_bitpool(2, 53);
        let (status, endpoint) =
            discover_sinks(&mut coordinator, 0x41, &[sink(4, caps, ContentProtection::none())]);
        assert_eq!(status, Ok(GetConfigStatus::Selected));

        let expected = CodecIndex::SourceSbc.codec_info().build_sink_config(&caps).unwrap();
        assert_eq!(endpoint.codec_info, expected);
        assert_eq!(endpoint.sep_info_idx, 4);
        assert_eq!(endpoint.protection.count, 0);
        assert_eq!(coordinator.active_codec(), expected);
        assert_eq!(coordinator.peer(0x41).unwrap().codec_config, expected);
        assert!(!expected.requires_reconfig(&expected));

        coordinator.open(0x41, &expected, 672).unwrap();
        assert_eq!(coordinator.encoder_init_params().unwrap().mtu, 672);
        assert!(channel.try_receive().is_err());
    }

    #[test]
    fn test_family_preference_dominates_arrival_order() {
        let channel = SessionChannel::new();
        let mut coordinator = CodecCoordinator::new(CoordinatorOptions::default(), &channel);
        let caps = [
            sink(1, SBC_SINK, ContentProtection::none()),
            sink(2, AAC_SINK, ContentProtection::none()),
            sink(3, SBC_SINK, ContentProtection::none()),
        ];
        for _ in 0..2 {
            let (status, endpoint) = discover_sinks(&mut coordinator, 0x41, &caps);
            assert_eq!(status, Ok(GetConfigStatus::Selected));
            assert_eq!(endpoint.codec_info.codec_type(), Some(CodecType::Mpeg24Aac));
            assert_eq!(endpoint.sep_info_idx, 2);
            assert_eq!(coordinator.peer(0x41).unwrap().selected_sink().map(|s| s.seid), Some(2));
        }

        // Without AAC the earliest SBC sink wins
        let mut coordinator = CodecCoordinator::new(
            CoordinatorOptions {
                content_protection: false,
                source_codecs: &[CodecIndex::SourceSbc],
            },
            &channel,
        );
        let (_, endpoint) = discover_sinks(&mut coordinator, 0x41, &caps);
        assert_eq!(endpoint.sep_info_idx, 1);
    }

    #[test]
    fn test_content_protection_gate() {
        let channel = SessionChannel::new();
        let options = CoordinatorOptions {
            content_protection: true,
            source_codecs: &[CodecIndex::SourceSbc],
        };

        let mut coordinator = CodecCoordinator::new(options, &channel);
        let (status, _) =
            discover_sinks(&mut coordinator, 0x41, &[sink(1, SBC_SINK, ContentProtection::none())]);
        assert_eq!(status, Err(A2dpError::SelectionFailed));
        assert!(coordinator.peer(0x41).unwrap().selected_sink().is_none());

        let mut coordinator = CodecCoordinator::new(options, &channel);
        let (status, endpoint) = discover_sinks(
            &mut coordinator,
            0x41,
            &[
                sink(1, SBC_SINK, ContentProtection::none()),
                sink(2, SBC_SINK, ContentProtection::scms_t()),
            ],
        );
        assert_eq!(status, Ok(GetConfigStatus::Selected));
        assert_eq!(endpoint.sep_info_idx, 2);
        assert_eq!(endpoint.protection, ContentProtection::scms_t());
        assert!(coordinator.cp_is_active());
        assert!(coordinator.peer(0x41).unwrap().cp_active);
        assert_eq!(coordinator.peer_cp_supported(0x41), Ok(false));
    }

    #[test]
    fn test_acceptor_stops_fetching_and_reconfigures() {
        let channel = SessionChannel::new();
        let mut coordinator = CodecCoordinator::new(CoordinatorOptions::default(), &channel);
        coordinator
            .discovery_result(0x42, 4, 2, 0, PEER, ServiceClass::AudioSource)
            .unwrap();

        coordinator.set_config(
            0x42,
            &SBC,
            1,
            PEER,
            &ContentProtection::none(),
            AvdtpRole::Source,
            9,
        );
        let Ok(SessionCommand::SetConfigResponse {
            status,
            reconfig_needed,
            ..
        }) = channel.try_receive()
        else {
            panic!("expected set-config response");
        };
        assert_eq!(status, ConfigStatus::Success);
        assert!(!reconfig_needed);
        coordinator.peer_mut(0x42).unwrap().reconfig_needed = true;

        let mut first = sink(1, SBC_SINK, ContentProtection::none());
        coordinator.get_config(0x42, &mut first).unwrap();
        let mut second = sink(2, AAC_SINK, ContentProtection::none());
        assert_eq!(
            coordinator.get_config(0x42, &mut second),
            Ok(GetConfigStatus::Selected)
        );
        assert_eq!(second.sep_info_idx, 4);
        assert_eq!(second.codec_info, AAC_SINK);

        let Ok(SessionCommand::Reconfigure {
            handle,
            sep_info_idx,
            codec_config,
            ..
        }) = channel.try_receive()
        else {
            panic!("expected reconfigure");
        };
        assert_eq!(handle, 0x42);
        assert_eq!(sep_info_idx, 2);
        assert_eq!(codec_config.codec_type(), Some(CodecType::Mpeg24Aac));
    }

    #[test]
    fn test_acceptor_reconfigure_carries_scms_t() {
        let channel = SessionChannel::new();
        let mut coordinator = CodecCoordinator::new(
            CoordinatorOptions {
                content_protection: true,
                source_codecs: &[CodecIndex::SourceSbc],
            },
            &channel,
        );
        coordinator
            .discovery_result(0x42, 3, 1, 0, PEER, ServiceClass::AudioSource)
            .unwrap();

        propose(&mut coordinator, 0x42, &SBC, ContentProtection::scms_t(), AvdtpRole::Source, 6);
        let Ok(SessionCommand::SetConfigResponse {
            status,
            reconfig_needed,
            ..
        }) = channel.try_receive()
        else {
            panic!("expected set-config response");
        };
        assert_eq!(status, ConfigStatus::Success);
        assert!(reconfig_needed);

        let mut endpoint = sink(1, SBC_SINK, ContentProtection::scms_t());
        assert_eq!(
            coordinator.get_config(0x42, &mut endpoint),
            Ok(GetConfigStatus::Selected)
        );
        assert_eq!(endpoint.sep_info_idx, 3);
        assert_eq!(endpoint.protection, ContentProtection::scms_t());

        let Ok(SessionCommand::Reconfigure {
            handle,
            sep_info_idx,
            protection,
            ..
        }) = channel.try_receive()
        else {
            panic!("expected reconfigure");
        };
        assert_eq!(handle, 0x42);
        assert_eq!(sep_info_idx, 1);
        assert_eq!(protection.count, 1);
        assert_eq!(protection.info, SCMS_T_DESCRIPTOR);
        assert!(coordinator.cp_is_active());
    }

    #[test]
    fn test_failed_selection_leaves_endpoint_untouched() {
        let channel = SessionChannel::new();
        let mut coordinator = CodecCoordinator::new(
            CoordinatorOptions {
                content_protection: true,
                source_codecs: &[CodecIndex::SourceSbc],
            },
            &channel,
        );
        coordinator
            .discovery_result(0x41, 3, 1, 0, PEER, ServiceClass::AudioSource)
            .unwrap();
        propose(&mut coordinator, 0x41, &SBC, ContentProtection::none(), AvdtpRole::Source, 1);

        let original = sink(1, SBC_SINK, ContentProtection::none());
        let mut endpoint = original;
        assert_eq!(
            coordinator.get_config(0x41, &mut endpoint),
            Err(A2dpError::SelectionFailed)
        );
        assert_eq!(endpoint, original);
    }

    #[test]
    fn test_set_config_content_protection_count() {
        let channel = SessionChannel::new();
        let mut coordinator = CodecCoordinator::new(
            CoordinatorOptions {
                content_protection: true,
                ..CoordinatorOptions::default()
            },
            &channel,
        );

        let two = ContentProtection::new(2, &SCMS_T_DESCRIPTOR);
        coordinator.set_config(0x41, &SBC, 1, PEER, &two, AvdtpRole::Source, 3);
        assert_eq!(
            channel.try_receive().ok(),
            Some(SessionCommand::SetConfigResponse {
                handle: 0x41,
                status: ConfigStatus::BadCpType,
                category: Some(ServiceCategory::ContentProtection),
                reconfig_needed: false,
                avdt_handle: 3,
            })
        );
        assert!(!coordinator.peer(0x41).unwrap().acceptor);

        propose(&mut coordinator, 0x41, &SBC, ContentProtection::none(), AvdtpRole::Source, 3);
        assert_eq!(
            channel.try_receive().ok(),
            Some(SessionCommand::SetConfigResponse {
                handle: 0x41,
                status: ConfigStatus::Success,
                category: None,
                reconfig_needed: false,
                avdt_handle: 3,
            })
        );
        assert!(coordinator.peer(0x41).unwrap().acceptor);

        // SCMS-T proposed while inactive forces a reconfiguration
        propose(&mut coordinator, 0x43, &SBC, ContentProtection::scms_t(), AvdtpRole::Source, 4);
        let Ok(SessionCommand::SetConfigResponse {
            status,
            reconfig_needed,
            ..
        }) = channel.try_receive()
        else {
            panic!("expected set-config response");
        };
        assert_eq!(status, ConfigStatus::Success);
        assert!(reconfig_needed);
    }

    #[test]
    fn test_set_config_rejects_cp_when_disabled() {
        let channel = SessionChannel::new();
        let mut coordinator = CodecCoordinator::new(CoordinatorOptions::default(), &channel);
        propose(&mut coordinator, 0x41, &SBC, ContentProtection::scms_t(), AvdtpRole::Source, 1);
        assert!(matches!(
            channel.try_receive(),
            Ok(SessionCommand::SetConfigResponse {
                status: ConfigStatus::BadCpType,
                ..
            })
        ));
    }

    #[test]
    fn test_set_config_wrong_codec_for_sink() {
        let channel = SessionChannel::new();
        let mut coordinator = CodecCoordinator::new(CoordinatorOptions::default(), &channel);
        let aac = CodecIndex::SourceAac.codec_info();
        propose(&mut coordinator, 0x41, &aac, ContentProtection::none(), AvdtpRole::Sink, 5);
        assert_eq!(
            channel.try_receive().ok(),
            Some(SessionCommand::SetConfigResponse {
                handle: 0x41,
                status: ConfigStatus::WrongCodec,
                category: Some(ServiceCategory::MediaCodec),
                reconfig_needed: false,
                avdt_handle: 5,
            })
        );
        let peer = coordinator.peer(0x41).unwrap();
        assert!(!peer.acceptor);
        assert!(!peer.reconfig_needed);
        assert_eq!(coordinator.active_codec_type(), Some(CodecType::Sbc));
    }

    #[test]
    fn test_set_config_sink_adopts_proposal() {
        let channel = SessionChannel::new();
        let mut coordinator = CodecCoordinator::new(CoordinatorOptions::default(), &channel);
        let mut proposal = SBC;
        proposal.0[3] = 0x10 | 0x08;
        propose(&mut coordinator, 0x41, &proposal, ContentProtection::none(), AvdtpRole::Sink, 5);
        assert!(matches!(
            channel.try_receive(),
            Ok(SessionCommand::SetConfigResponse {
                status: ConfigStatus::Success,
                reconfig_needed: false,
                ..
            })
        ));
        assert_eq!(coordinator.active_codec(), proposal);
        assert_eq!(coordinator.remote_bitpool_preference(), Some((2, 53)));
    }

    #[test]
    fn test_set_config_unknown_handle_is_busy() {
        let channel = SessionChannel::new();
        let mut coordinator = CodecCoordinator::new(CoordinatorOptions::default(), &channel);
        propose(&mut coordinator, 0x47, &SBC, ContentProtection::none(), AvdtpRole::Source, 2);
        assert!(matches!(
            channel.try_receive(),
            Ok(SessionCommand::SetConfigResponse {
                status: ConfigStatus::Busy,
                category: Some(ServiceCategory::MediaCodec),
                ..
            })
        ));
    }

    #[test]
    fn test_peer_source_selection() {
        let channel = SessionChannel::new();
        let mut coordinator = CodecCoordinator::new(CoordinatorOptions::default(), &channel);
        coordinator
            .discovery_result(0x41, 2, 0, 2, PEER, ServiceClass::AudioSink)
            .unwrap();

        let mut aac = sink(1, AAC_SINK, ContentProtection::none());
        assert_eq!(
            coordinator.get_config(0x41, &mut aac),
            Ok(GetConfigStatus::Collecting)
        );
        let mut sbc = sink(2, SBC_SINK, ContentProtection::scms_t());
        assert_eq!(
            coordinator.get_config(0x41, &mut sbc),
            Ok(GetConfigStatus::Selected)
        );
        assert_eq!(sbc.sep_info_idx, 2);
        assert_eq!(sbc.protection.count, 0);
        assert_eq!(sbc.codec_info, SBC_SINK.build_source_to_sink_config().unwrap());
        assert!(sbc.codec_info.is_valid_config());

        let peer = coordinator.peer(0x41).unwrap();
        assert_eq!(peer.selected_source().map(|s| s.seid), Some(2));
        assert_eq!(peer.sources.records().len(), 1);
        assert!(!peer.cp_active);
    }

    #[test]
    fn test_peer_source_selection_fails_without_match() {
        let channel = SessionChannel::new();
        let mut coordinator = CodecCoordinator::new(CoordinatorOptions::default(), &channel);
        coordinator
            .discovery_result(0x41, 1, 0, 1, PEER, ServiceClass::AudioSink)
            .unwrap();

        let mut aac = sink(1, AAC_SINK, ContentProtection::none());
        assert_eq!(
            coordinator.get_config(0x41, &mut aac),
            Err(A2dpError::SelectionFailed)
        );
        assert_eq!(aac, sink(1, AAC_SINK, ContentProtection::none()));

        let peer = coordinator.peer(0x41).unwrap();
        assert_eq!(peer.sources.received(), 1);
        assert!(peer.sources.records().is_empty());
        assert!(peer.selected_source().is_none());
    }

    #[test]
    fn test_invalid_capability_counts_but_is_not_stored() {
        let channel = SessionChannel::new();
        let mut coordinator = CodecCoordinator::new(CoordinatorOptions::default(), &channel);
        coordinator
            .discovery_result(0x41, 2, 2, 0, PEER, ServiceClass::AudioSource)
            .unwrap();

        let mut vendor = sink(1, NON_A2DP, ContentProtection::none());
        assert_eq!(
            coordinator.get_config(0x41, &mut vendor),
            Ok(GetConfigStatus::Collecting)
        );
        assert_eq!(coordinator.peer(0x41).unwrap().sinks.received(), 1);
        assert!(coordinator.peer(0x41).unwrap().sinks.records().is_empty());

        let mut sbc = sink(2, SBC_SINK, ContentProtection::none());
        assert_eq!(
            coordinator.get_config(0x41, &mut sbc),
            Ok(GetConfigStatus::Selected)
        );
        assert_eq!(sbc.sep_info_idx, 2);
        let peer = coordinator.peer(0x41).unwrap();
        assert_eq!(peer.sinks.records().len(), 1);
        assert_eq!(peer.selected_sink().map(|s| s.seid), Some(2));
    }

    #[test]
    fn test_close_clears_peer_and_preference() {
        let channel = SessionChannel::new();
        let mut coordinator = CodecCoordinator::new(CoordinatorOptions::default(), &channel);
        propose(&mut coordinator, 0x41, &SBC, ContentProtection::none(), AvdtpRole::Source, 1);
        coordinator.open(0x41, &SBC, 672).unwrap();
        assert_eq!(coordinator.remote_bitpool_preference(), Some((2, 53)));

        coordinator.close(0x41).unwrap();
        assert_eq!(coordinator.remote_bitpool_preference(), None);
        assert_eq!(coordinator.peer(0x41).unwrap(), &PeerRecord::default());

        propose(&mut coordinator, 0x41, &SBC, ContentProtection::none(), AvdtpRole::Source, 1);
        assert!(coordinator.close(0x40).is_err());
        assert_eq!(coordinator.remote_bitpool_preference(), None);
    }

    #[test]
    fn test_discard_config() {
        let channel = SessionChannel::new();
        let mut coordinator = CodecCoordinator::new(CoordinatorOptions::default(), &channel);
        discover_sinks(&mut coordinator, 0x41, &[sink(1, SBC_SINK, ContentProtection::none())])
            .0
            .unwrap();
        coordinator.discard_config(0x41).unwrap();
        let peer = coordinator.peer(0x41).unwrap();
        assert!(peer.selected_sink().is_none());
        assert!(peer.codec_config.is_empty());
        assert_eq!(peer.sinks.records().len(), 1);
    }

    #[test]
    fn test_set_codec_from_feeding() {
        let channel = SessionChannel::new();
        let mut coordinator = CodecCoordinator::new(CoordinatorOptions::default(), &channel);
        assert!(!coordinator.set_codec_from_feeding(&FeedingParams::new(44_100, 2, 16)));

        discover_sinks(&mut coordinator, 0x43, &[sink(7, SBC_SINK, ContentProtection::none())])
            .0
            .unwrap();
        coordinator.open(0x43, &SBC, 895).unwrap();
        assert!(coordinator.codec_supported());

        assert!(coordinator.set_codec_from_feeding(&FeedingParams::new(48_000, 1, 16)));
        let Ok(SessionCommand::Reconfigure {
            handle,
            sep_info_idx,
            codec_config,
            protection,
        }) = channel.try_receive()
        else {
            panic!("expected reconfigure");
        };
        assert_eq!(handle, 0x43);
        assert_eq!(sep_info_idx, 7);
        assert_eq!(codec_config.sampling_frequency(), Some(48_000));
        assert_eq!(protection.count, 0);
        assert_eq!(coordinator.active_codec(), codec_config);
        assert!(coordinator.codec_supported());

        assert!(!coordinator.set_codec_from_feeding(&FeedingParams::new(96_000, 2, 16)));
    }

    #[test]
    fn test_codec_supported_respects_copy_policy() {
        let channel = SessionChannel::new();
        let mut coordinator = CodecCoordinator::new(CoordinatorOptions::default(), &channel);
        discover_sinks(&mut coordinator, 0x41, &[sink(1, SBC_SINK, ContentProtection::none())])
            .0
            .unwrap();
        coordinator.open(0x41, &SBC, 672).unwrap();
        assert!(coordinator.codec_supported());

        coordinator
            .shared_state()
            .lock(|state| state.content_protection = ContentProtectionState::new(true));
        assert!(!coordinator.codec_supported());
    }
}
