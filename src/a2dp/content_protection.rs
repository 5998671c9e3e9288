//! SCMS-T Content Protection
//!
//! AVDTP carries content protection as a list of length-prefixed
//! descriptors: one length octet followed by a little-endian protection type
//! and optional type-specific data. Only SCMS-T (type 0x0002) is supported.
//! When it is active, every media payload starts with one copy-control byte.

use super::A2dpError;
use crate::constants::{CP_INFO_SIZE, CP_LOSC, CP_SCMS_T_ID, SCMS_T_DESCRIPTOR};

/// SCMS-T copy-control flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ScmsFlag {
    /// Copying permitted
    #[default]
    CopyFree = 0,
    /// One generation of copies permitted
    CopyOnce = 1,
    /// Copying prohibited
    CopyNever = 2,
}

/// Content protection descriptors attached to an endpoint or configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ContentProtection {
    /// Number of descriptors in `info`
    pub count: u8,
    /// Raw descriptor bytes
    pub info: [u8; CP_INFO_SIZE],
}

impl ContentProtection {
    /// No content protection
    #[must_use]
    pub const fn none() -> Self {
        Self {
            count: 0,
            info: [0; CP_INFO_SIZE],
        }
    }

    /// A single SCMS-T descriptor
    #[must_use]
    pub const fn scms_t() -> Self {
        Self {
            count: 1,
            info: SCMS_T_DESCRIPTOR,
        }
    }

    /// Copy descriptors received from the session layer
    ///
    /// Bytes beyond [`CP_INFO_SIZE`] are dropped.
    #[must_use]
    pub fn new(count: u8, bytes: &[u8]) -> Self {
        let mut info = [0u8; CP_INFO_SIZE];
        let len = bytes.len().min(CP_INFO_SIZE);
        info[..len].copy_from_slice(&bytes[..len]);
        Self { count, info }
    }

    /// Scan the descriptor list for SCMS-T
    #[must_use]
    pub fn has_scms_t(&self) -> bool {
        let mut rest = &self.info[..];
        for _ in 0..self.count {
            let Some(&losc) = rest.first() else {
                break;
            };
            if is_scms_t(rest) {
                return true;
            }
            rest = rest.get(usize::from(losc) + 1..).unwrap_or(&[]);
        }
        false
    }

    /// Validate a configuration proposed by a peer
    ///
    /// No descriptor at all is fine. Otherwise exactly one SCMS-T descriptor
    /// is accepted, and only when content protection is enabled locally.
    ///
    /// # Errors
    /// Returns [`A2dpError::BadContentProtectionType`] for anything else.
    pub fn validate_proposal(&self, enabled: bool) -> Result<(), A2dpError> {
        match self.count {
            0 => Ok(()),
            1 if enabled && is_scms_t(&self.info) => Ok(()),
            _ => Err(A2dpError::BadContentProtectionType),
        }
    }
}

/// Whether a single descriptor names SCMS-T
#[must_use]
pub fn is_scms_t(descriptor: &[u8]) -> bool {
    match descriptor {
        [losc, lo, hi, ..] if *losc >= CP_LOSC => u16::from_le_bytes([*lo, *hi]) == CP_SCMS_T_ID,
        _ => false,
    }
}

/// Copy-control policy and activation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ContentProtectionState {
    enabled: bool,
    active: bool,
    flag: ScmsFlag,
}

impl ContentProtectionState {
    /// Initial state: copy never when protection is enabled, copy free
    /// otherwise, and inactive until a protected sink is selected
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self {
            enabled,
            active: false,
            flag: if enabled {
                ScmsFlag::CopyNever
            } else {
                ScmsFlag::CopyFree
            },
        }
    }

    /// Whether the current stream carries SCMS-T
    #[must_use]
    pub const fn active(&self) -> bool {
        self.active
    }

    /// Mark the current stream as protected or not
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Current copy-control flag
    #[must_use]
    pub const fn flag(&self) -> ScmsFlag {
        self.flag
    }

    /// Change the copy-control flag
    ///
    /// Returns `false` and leaves the flag unchanged if content protection is
    /// disabled and `flag` is not [`ScmsFlag::CopyFree`].
    pub fn set_flag(&mut self, flag: ScmsFlag) -> bool {
        if !self.enabled && flag != ScmsFlag::CopyFree {
            return false;
        }
        self.flag = flag;
        true
    }

    /// Whether a sink with these descriptors may receive the stream under
    /// the current flag
    #[must_use]
    pub fn sink_acceptable(&self, protection: &ContentProtection) -> bool {
        self.flag == ScmsFlag::CopyFree || protection.has_scms_t()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_scms_t() {
        assert!(is_scms_t(&SCMS_T_DESCRIPTOR));
        assert!(!is_scms_t(&[1, 0x02, 0x00]));
        assert!(!is_scms_t(&[2, 0x01, 0x00]));
        assert!(!is_scms_t(&[2, 0x02]));
        assert!(!is_scms_t(&[]));
    }

    #[test]
    fn test_has_scms_t_walks_descriptors() {
        assert!(ContentProtection::scms_t().has_scms_t());
        assert!(!ContentProtection::none().has_scms_t());
        assert!(!ContentProtection::new(0, &SCMS_T_DESCRIPTOR).has_scms_t());

        // A one-byte descriptor of another type followed by a truncated one
        assert!(!ContentProtection::new(2, &[0, 2, 2]).has_scms_t());
        assert!(!ContentProtection::new(5, &[0, 0, 0]).has_scms_t());
    }

    #[test]
    fn test_validate_proposal() {
        assert_eq!(ContentProtection::none().validate_proposal(false), Ok(()));
        assert_eq!(ContentProtection::scms_t().validate_proposal(true), Ok(()));
        assert_eq!(
            ContentProtection::scms_t().validate_proposal(false),
            Err(A2dpError::BadContentProtectionType)
        );
        assert_eq!(
            ContentProtection::new(2, &SCMS_T_DESCRIPTOR).validate_proposal(true),
            Err(A2dpError::BadContentProtectionType)
        );
        assert_eq!(
            ContentProtection::new(1, &[2, 0x01, 0x00]).validate_proposal(true),
            Err(A2dpError::BadContentProtectionType)
        );
    }

    #[test]
    fn test_flag_policy() {
        let mut disabled = ContentProtectionState::new(false);
        assert_eq!(disabled.flag(), ScmsFlag::CopyFree);
        assert!(!disabled.set_flag(ScmsFlag::CopyNever));
        assert_eq!(disabled.flag(), ScmsFlag::CopyFree);
        assert!(disabled.set_flag(ScmsFlag::CopyFree));
        assert!(disabled.sink_acceptable(&ContentProtection::none()));

        let mut enabled = ContentProtectionState::new(true);
        assert_eq!(enabled.flag(), ScmsFlag::CopyNever);
        assert!(!enabled.sink_acceptable(&ContentProtection::none()));
        assert!(enabled.sink_acceptable(&ContentProtection::scms_t()));
        assert!(enabled.set_flag(ScmsFlag::CopyOnce));
        assert_eq!(enabled.flag(), ScmsFlag::CopyOnce);
    }
}
