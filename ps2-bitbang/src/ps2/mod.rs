//! PS/2 protocol support.
//!
//! Protocol constants shared by the transport, the mouse driver and the
//! simulated device, plus the transport itself.
//!
//! Reference: <https://www.burtonsys.com/ps2_chapweske.htm>

pub mod frame;
pub mod line;
pub mod transport;
pub mod wait;

pub use frame::{Frame, FrameError};
pub use transport::{ConnectionState, Ps2Transport};

/// Electrical timings. These follow the protocol, not preference; changing
/// them risks violating what a physical device expects.
pub mod timing {
    use std::time::Duration;

    /// Bound on every individual wait for a line transition.
    pub const TIMEOUT: Duration = Duration::from_millis(5);
    /// Both lines released before the host claims the bus for a write.
    pub const BUS_IDLE: Duration = Duration::from_micros(300);
    /// Clock held low to claim the bus (inhibit and request-to-send).
    pub const CLAIM_HOLD: Duration = Duration::from_micros(300);
    /// Data held low before the clock is released to signal the start bit.
    pub const START_SETUP: Duration = Duration::from_micros(10);
    /// Data released for the stop bit before watching for its clock.
    pub const STOP_BIT_SETTLE: Duration = Duration::from_micros(50);
    /// Lines released before a host read starts watching the clock.
    pub const READ_RELEASE: Duration = Duration::from_micros(50);
    /// Delay after the device first pulls the clock low on a read.
    pub const START_BIT_DELAY: Duration = Duration::from_micros(5);
    /// Settle time at the end of the mouse handshake.
    pub const SETTLE: Duration = Duration::from_micros(100);
}

/// Host-to-mouse command bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::FromRepr)]
#[repr(u8)]
pub enum Command {
    SetStreamMode = 0xEA,
    ReadData = 0xEB,
    SetRemoteMode = 0xF0,
    GetDeviceId = 0xF2,
    EnableReporting = 0xF4,
    DisableReporting = 0xF5,
    SetDefaults = 0xF6,
    Resend = 0xFE,
    Reset = 0xFF,
}

/// Mouse-to-host response bytes
pub mod response {
    pub const ACK: u8 = 0xFA;
    pub const BAT_OK: u8 = 0xAA;
    pub const BAT_ERROR: u8 = 0xFC;
    pub const RESEND: u8 = 0xFE;
    /// Device ID of a standard three-byte-packet mouse
    pub const MOUSE_ID: u8 = 0x00;
}
