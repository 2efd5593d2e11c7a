//! Drivers for devices on the PS/2 transport.

pub mod mouse;

pub use mouse::Ps2Mouse;
