//! Host side driver for XBee radio modules (cellular LTE/NB-IoT and LoRaWAN) talking the
//! checksummed API frame protocol over a serial line.
//!
//! The crate is split into the wire level pieces ([`api`], [`at`], [`hex`]), the platform seam
//! ([`transport`]) and the driver itself ([`device`]) which pairs one generic frame engine with a
//! module family: [`device::cellular`] or [`device::lr`].

#![cfg_attr(any(not(feature = "std"), not(test)), no_std)]

// must stay first so the logging macros are visible in every module below
#[macro_use]
mod fmt;

pub mod api;
pub mod at;
pub mod config;
pub mod device;
pub mod hex;
pub mod transport;

// include defmt::Format implementations
// we don't want them derive()d in the modules unless defmt-impl feature is set
#[cfg(feature = "defmt-impl")]
pub mod defmt;

#[cfg(test)]
mod mock;

// reexport heapless
pub use heapless;

pub use config::{Config, ConnectMode};
pub use device::{Callbacks, Device, Error, XBee};
pub use transport::{Transport, TransportError};
