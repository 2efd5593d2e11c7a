//! Common error types for ps2-bitbang.
//!
//! Every failure on the wire collapses into a single kind: a bounded wait
//! for a line transition ran out. The [`Phase`] only says where it happened.

use std::fmt;
use thiserror::Error;

/// Main error type for transport operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The device did not move a line within the timeout budget. The
    /// transport has been marked disconnected.
    #[error("PS/2 device timed out {0}")]
    TimeoutDisconnect(Phase),
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Step of a byte transfer during which a bounded wait expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Host write: device never started clocking after the request-to-send.
    RequestToSend,
    /// Host write: clock pulse for data bit n.
    WriteBit(u8),
    /// Host write: clock pulse for the parity bit.
    WriteParity,
    /// Host write: device never clocked in the stop bit.
    StopBit,
    /// Host write: lines did not return to idle after the device ack.
    Acknowledge,
    /// Host read: device never pulled the clock low to begin a frame.
    StartRequest,
    /// Host read: start bit clock pulse.
    StartBit,
    /// Host read: clock pulse for data bit n.
    ReadBit(u8),
    /// Host read: parity and stop bits together exceeded the budget.
    FrameTail,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::RequestToSend => write!(f, "waiting to clock a host write"),
            Phase::WriteBit(n) => write!(f, "clocking out data bit {}", n),
            Phase::WriteParity => write!(f, "clocking out the parity bit"),
            Phase::StopBit => write!(f, "waiting for the stop bit clock"),
            Phase::Acknowledge => write!(f, "waiting for the lines to return idle"),
            Phase::StartRequest => write!(f, "waiting for the device to start a frame"),
            Phase::StartBit => write!(f, "clocking in the start bit"),
            Phase::ReadBit(n) => write!(f, "clocking in data bit {}", n),
            Phase::FrameTail => write!(f, "clocking in the parity and stop bits"),
        }
    }
}
