//! Shared Negotiation State
//!
//! The active codec configuration drives the encoder for every open stream,
//! so it lives in one place behind one lock. Callers only ever see it
//! through the closure passed to [`SharedNegotiationState::lock`]; the lock
//! is released on every exit path, early returns included.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};

use super::codec::CodecInfo;
use super::content_protection::ContentProtectionState;

/// Data guarded by the shared state lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NegotiationState {
    /// Configuration the encoder runs with
    pub codec_config: CodecInfo,
    /// Last configuration proposed by a peer through set-configuration
    ///
    /// Only a bitpool hint; cleared on every stream close.
    pub setconfig_preference: CodecInfo,
    /// Copy-control flag and activation
    pub content_protection: ContentProtectionState,
}

impl NegotiationState {
    /// Zeroed state
    #[must_use]
    pub const fn new(content_protection: bool) -> Self {
        Self {
            codec_config: CodecInfo::EMPTY,
            setconfig_preference: CodecInfo::EMPTY,
            content_protection: ContentProtectionState::new(content_protection),
        }
    }
}

/// Process-wide negotiation state behind a critical-section mutex
pub struct SharedNegotiationState {
    inner: Mutex<CriticalSectionRawMutex, RefCell<NegotiationState>>,
}

impl SharedNegotiationState {
    /// Zeroed state
    #[must_use]
    pub const fn new(content_protection: bool) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(NegotiationState::new(content_protection))),
        }
    }

    /// Run `f` with exclusive access to the state
    ///
    /// # Panics
    /// Panics if called again from inside `f`.
    pub fn lock<R>(&self, f: impl FnOnce(&mut NegotiationState) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a2dp::codec::test_vectors::SBC;
    use crate::a2dp::content_protection::ScmsFlag;

    #[test]
    fn test_initial_state() {
        let shared = SharedNegotiationState::new(true);
        let state = shared.lock(|state| *state);
        assert!(state.codec_config.is_empty());
        assert!(state.setconfig_preference.is_empty());
        assert_eq!(state.content_protection.flag(), ScmsFlag::CopyNever);
        assert!(!state.content_protection.active());
    }

    #[test]
    fn test_lock_returns_closure_result() {
        let shared = SharedNegotiationState::new(false);
        let previous = shared.lock(|state| {
            let previous = state.codec_config;
            state.codec_config = SBC;
            previous
        });
        assert_eq!(previous, CodecInfo::EMPTY);
        assert_eq!(shared.lock(|state| state.codec_config), SBC);
    }
}
