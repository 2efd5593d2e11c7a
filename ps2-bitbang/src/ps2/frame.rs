//! The 11-bit PS/2 frame.
//!
//! ```text
//! bit:   0      1 ..= 8         9        10
//!      start  data, LSB first  parity   stop
//!        0                      odd       1
//! ```

use bitvec::prelude::*;
use thiserror::Error;

pub const FRAME_BITS: usize = 11;

const START: usize = 0;
const DATA: std::ops::Range<usize> = 1..9;
const PARITY: usize = 9;
const STOP: usize = 10;

/// Value of the parity bit that makes the count of ones across data and
/// parity odd.
pub fn odd_parity(byte: u8) -> bool {
    byte.count_ones() % 2 == 0
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("start bit is not 0")]
    StartBit,
    #[error("stop bit is not 1")]
    StopBit,
    #[error("parity mismatch on data 0x{data:02X}")]
    Parity { data: u8 },
}

/// One frame as it appears on the data line, bit 0 first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame(u16);

impl Frame {
    /// Frame a byte with correct start, parity and stop bits.
    pub fn encode(byte: u8) -> Self {
        let mut raw = 0u16;
        let bits = raw.view_bits_mut::<Lsb0>();
        bits.set(START, false);
        bits[DATA].store_le(byte);
        bits.set(PARITY, odd_parity(byte));
        bits.set(STOP, true);
        Self(raw)
    }

    /// Wrap bits sampled off the wire. Bits above the stop bit are dropped.
    pub fn from_raw(raw: u16) -> Self {
        Self(raw & ((1 << FRAME_BITS) - 1))
    }

    pub fn raw(&self) -> u16 {
        self.0
    }

    /// Bit `index` of the frame, or `None` past the stop bit.
    pub fn bit(&self, index: usize) -> Option<bool> {
        (index < FRAME_BITS).then(|| self.at(index))
    }

    fn at(&self, index: usize) -> bool {
        self.0.view_bits::<Lsb0>()[index]
    }

    /// The data byte, without checking framing.
    pub fn data(&self) -> u8 {
        self.0.view_bits::<Lsb0>()[DATA].load_le()
    }

    pub fn parity(&self) -> bool {
        self.at(PARITY)
    }

    /// Same frame with the parity bit inverted.
    pub fn with_parity_flipped(self) -> Self {
        Self(self.0 ^ (1 << PARITY))
    }

    /// Check framing and parity, returning the data byte.
    pub fn decode(&self) -> Result<u8, FrameError> {
        if self.at(START) {
            return Err(FrameError::StartBit);
        }
        if !self.at(STOP) {
            return Err(FrameError::StopBit);
        }
        let data = self.data();
        if self.parity() != odd_parity(data) {
            return Err(FrameError::Parity { data });
        }
        Ok(data)
    }
}
