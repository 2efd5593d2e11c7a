//! Host side of the PS/2 serial protocol over two general-purpose lines.
//!
//! The transport bit-bangs clock and data through a [`hw_trait::Platform`],
//! so the same code runs against real pins or against the simulated bus in
//! [`sim`].

pub mod config;
pub mod error;
pub mod hw_trait;
pub mod peripheral;
pub mod ps2;
pub mod sim;
pub mod tracing;

pub use error::{Error, Phase, Result};
