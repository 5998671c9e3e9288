#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod a2dp;
mod address;
pub mod constants;

pub use a2dp::A2dpError;
pub use address::BluetoothAddress;
