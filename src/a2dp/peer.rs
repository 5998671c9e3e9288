//! Peer Table and Capability Collection
//!
//! One [`PeerRecord`] per audio connection slot. AV handles map onto slots
//! arithmetically: strip the channel tag and subtract one. Capability records
//! discovered on the remote device accumulate in per-role
//! [`EndpointCollection`]s, which report completion exactly once.

use heapless::Vec;

use super::codec::CodecInfo;
use super::content_protection::ContentProtection;
use super::{A2dpError, AvHandle, ServiceClass, StreamEndpointId};
use crate::BluetoothAddress;
use crate::constants::{AV_CHANNEL_AUDIO, AV_CHANNEL_MASK, MAX_AUDIO_STREAMS, MAX_PEER_ENDPOINTS};

/// Capabilities of one remote stream endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EndpointCapability {
    /// Index of the endpoint in the session layer's discovery table
    pub sep_info_idx: u8,
    /// Stream endpoint identifier assigned by the peer
    pub seid: StreamEndpointId,
    /// Codec capability element
    pub codec_caps: CodecInfo,
    /// Content protection descriptors
    pub protection: ContentProtection,
}

/// Outcome of offering a discovery response to a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Collection {
    /// More responses are expected, or completion was already reported
    Pending,
    /// This response completed the collection
    Complete,
}

/// Capability records of one role, in arrival order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointCollection {
    expected: u8,
    received: u8,
    records: Vec<EndpointCapability, MAX_PEER_ENDPOINTS>,
    completed: bool,
}

impl EndpointCollection {
    /// Empty collection awaiting `expected` responses
    #[must_use]
    pub const fn new(expected: u8) -> Self {
        Self {
            expected,
            received: 0,
            records: Vec::new(),
            completed: false,
        }
    }

    /// Number of responses seen so far, stored or not
    #[must_use]
    pub const fn received(&self) -> u8 {
        self.received
    }

    /// Stored records
    #[must_use]
    pub fn records(&self) -> &[EndpointCapability] {
        &self.records
    }

    /// Record at `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&EndpointCapability> {
        self.records.get(index)
    }

    /// Account for one discovery response
    ///
    /// `record` is `None` when the response failed the validity check for
    /// this role; it still counts as received. Records arriving once storage
    /// is full are dropped. The collection completes when every advertised
    /// endpoint has answered or storage fills up, whichever happens first.
    pub fn offer(&mut self, record: Option<EndpointCapability>) -> Collection {
        self.received = self.received.saturating_add(1);

        if let Some(record) = record {
            if self.records.push(record).is_err() {
                warn!(
                    "no room for endpoint seid {}, dropping ({} stored)",
                    record.seid,
                    self.records.len()
                );
            }
        }

        if self.completed {
            return Collection::Pending;
        }
        if self.received >= self.expected || self.records.is_full() {
            self.completed = true;
            return Collection::Complete;
        }
        Collection::Pending
    }

    /// Index of the first record satisfying `predicate`
    pub fn position(&self, predicate: impl FnMut(&EndpointCapability) -> bool) -> Option<usize> {
        self.records.iter().position(predicate)
    }
}

/// Negotiation state of one audio connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerRecord {
    /// Remote device address
    pub addr: BluetoothAddress,
    /// Sink endpoints discovered on the peer
    pub sinks: EndpointCollection,
    /// Source endpoints discovered on the peer
    pub sources: EndpointCollection,
    /// Total number of endpoints the peer advertised
    pub num_seps: u8,
    selected_sink: Option<usize>,
    selected_source: Option<usize>,
    /// Configuration negotiated with this peer
    pub codec_config: CodecInfo,
    /// Whether the stream to this peer carries SCMS-T
    pub cp_active: bool,
    /// Whether the peer initiated the configuration
    pub acceptor: bool,
    /// Whether the accepted configuration must be replaced once selection runs
    pub reconfig_needed: bool,
    /// Whether the stream is open
    pub opened: bool,
    /// MTU of the open stream
    pub mtu: u16,
    /// Remote service class to query capabilities of
    pub uuid_to_connect: Option<ServiceClass>,
}

impl PeerRecord {
    /// Selected sink record, if any
    #[must_use]
    pub fn selected_sink(&self) -> Option<&EndpointCapability> {
        self.sinks.get(self.selected_sink?)
    }

    /// Selected source record, if any
    #[must_use]
    pub fn selected_source(&self) -> Option<&EndpointCapability> {
        self.sources.get(self.selected_source?)
    }

    /// Select the sink record at `index` of this peer's own sinks
    pub(crate) fn select_sink(&mut self, index: usize) {
        self.selected_sink = (index < self.sinks.records().len()).then_some(index);
    }

    /// Select the source record at `index` of this peer's own sources
    pub(crate) fn select_source(&mut self, index: usize) {
        self.selected_source = (index < self.sources.records().len()).then_some(index);
    }

    /// Forget the negotiated configuration, keeping discovery data
    pub fn discard_config(&mut self) {
        self.selected_sink = None;
        self.selected_source = None;
        self.codec_config = CodecInfo::EMPTY;
        self.cp_active = false;
        self.reconfig_needed = false;
    }

    /// Start a new discovery round
    pub(crate) fn begin_discovery(
        &mut self,
        addr: BluetoothAddress,
        num_seps: u8,
        num_sinks: u8,
        num_sources: u8,
        local: ServiceClass,
    ) {
        self.addr = addr;
        self.num_seps = num_seps;
        self.sinks = EndpointCollection::new(num_sinks);
        self.sources = EndpointCollection::new(num_sources);
        self.selected_sink = None;
        self.selected_source = None;
        self.uuid_to_connect = Some(local.counterpart());
    }
}

/// Fixed-capacity table of peer records indexed by AV handle
#[derive(Debug, Clone)]
pub struct PeerTable {
    peers: [PeerRecord; MAX_AUDIO_STREAMS],
}

impl PeerTable {
    /// Table with every slot reset
    #[must_use]
    pub fn new() -> Self {
        Self {
            peers: core::array::from_fn(|_| PeerRecord::default()),
        }
    }

    /// Slot index of an AV handle
    #[must_use]
    pub const fn handle_to_index(handle: AvHandle) -> Option<usize> {
        let index = ((handle & !AV_CHANNEL_MASK) as usize).wrapping_sub(1);
        if index < MAX_AUDIO_STREAMS {
            Some(index)
        } else {
            None
        }
    }

    /// Audio AV handle of a slot index
    #[must_use]
    pub const fn index_to_handle(index: usize) -> AvHandle {
        (index as u8 + 1) | AV_CHANNEL_AUDIO
    }

    /// Peer record of `handle`
    ///
    /// # Errors
    /// Returns [`A2dpError::NotFound`] if the handle maps outside the table.
    pub fn get(&self, handle: AvHandle) -> Result<&PeerRecord, A2dpError> {
        Self::handle_to_index(handle)
            .map(|index| &self.peers[index])
            .ok_or(A2dpError::NotFound)
    }

    /// Mutable peer record of `handle`
    ///
    /// # Errors
    /// Returns [`A2dpError::NotFound`] if the handle maps outside the table.
    pub fn get_mut(&mut self, handle: AvHandle) -> Result<&mut PeerRecord, A2dpError> {
        Self::handle_to_index(handle)
            .map(|index| &mut self.peers[index])
            .ok_or(A2dpError::NotFound)
    }

    /// Zero the slot of `handle`
    ///
    /// # Errors
    /// Returns [`A2dpError::NotFound`] if the handle maps outside the table.
    pub fn reset(&mut self, handle: AvHandle) -> Result<(), A2dpError> {
        *self.get_mut(handle)? = PeerRecord::default();
        Ok(())
    }

    /// Open peers with their handles
    pub fn iter_open(&self) -> impl Iterator<Item = (AvHandle, &PeerRecord)> {
        self.peers
            .iter()
            .enumerate()
            .filter(|(_, peer)| peer.opened)
            .map(|(index, peer)| (Self::index_to_handle(index), peer))
    }

    /// Open peers with their handles, mutably
    pub fn iter_open_mut(&mut self) -> impl Iterator<Item = (AvHandle, &mut PeerRecord)> {
        self.peers
            .iter_mut()
            .enumerate()
            .filter(|(_, peer)| peer.opened)
            .map(|(index, peer)| (Self::index_to_handle(index), peer))
    }
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}
