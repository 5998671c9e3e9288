//! Session Layer Call-ins
//!
//! Results the coordinator reports back to the AVDTP session layer. Both are
//! fire-and-forget: the coordinator never waits for the session layer to act
//! on them, and never sends one while holding the shared state lock.

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::channel::{Channel, TrySendError};

use super::codec::CodecInfo;
use super::content_protection::ContentProtection;
use super::{AvHandle, AvdtHandle, ConfigStatus, ServiceCategory};
use crate::constants::SESSION_CHANNEL_SIZE;

/// Notification for the session layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionCommand {
    /// Accept or reject a peer's set-configuration request
    SetConfigResponse {
        /// Connection the request arrived on
        handle: AvHandle,
        /// Result of validation
        status: ConfigStatus,
        /// Rejected service category, `None` on success
        category: Option<ServiceCategory>,
        /// Whether a reconfiguration will follow once selection runs
        reconfig_needed: bool,
        /// Stream handle of the request
        avdt_handle: AvdtHandle,
    },
    /// Reconfigure an established stream
    Reconfigure {
        /// Connection to reconfigure
        handle: AvHandle,
        /// Discovery index of the selected peer endpoint
        sep_info_idx: u8,
        /// New codec configuration
        codec_config: CodecInfo,
        /// Content protection descriptors to send with it
        protection: ContentProtection,
    },
}

/// Receiver of the coordinator's call-ins
pub trait SessionLayer {
    /// Deliver a call-in without blocking
    fn send(&self, command: SessionCommand);
}

impl<T: SessionLayer + ?Sized> SessionLayer for &T {
    fn send(&self, command: SessionCommand) {
        (**self).send(command);
    }
}

impl<M: RawMutex, const N: usize> SessionLayer for Channel<M, SessionCommand, N> {
    fn send(&self, command: SessionCommand) {
        if let Err(TrySendError::Full(command)) = self.try_send(command) {
            warn!("session channel full, dropping {}", command);
        }
    }
}

/// Default session command queue
pub type SessionChannel = Channel<CriticalSectionRawMutex, SessionCommand, SESSION_CHANNEL_SIZE>;
