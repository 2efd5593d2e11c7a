//! Hardware abstraction layer traits.
//!
//! The PS/2 code never touches pins directly. It drives lines and reads time
//! through [`Platform`], which firmware implements over its GPIO and timer
//! peripherals and tests implement over a simulated bus.

use std::fmt;
use std::time::{Duration, Instant};

/// Direction of a GPIO line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Input,
    Output,
}

/// Logic level of a GPIO line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }

    pub fn is_low(self) -> bool {
        self == Level::Low
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// GPIO and timing capability consumed by the PS/2 transport.
///
/// All calls are infallible; pin I/O errors are not modelled at this layer.
pub trait Platform {
    /// Handle to one physical line, e.g. a pin number.
    type Line: Copy + fmt::Debug;

    fn set_line_mode(&mut self, line: Self::Line, mode: Mode);

    /// Only meaningful while the line is in [`Mode::Output`]. In input mode
    /// a high level enables the pull-up.
    fn set_line_level(&mut self, line: Self::Line, level: Level);

    fn read_line_level(&mut self, line: Self::Line) -> Level;

    /// Monotonic time. Millisecond resolution is enough for the timeout
    /// checks.
    fn now(&self) -> Instant;

    /// Block for at least `duration`. Microsecond accuracy is expected.
    fn sleep(&mut self, duration: Duration);
}

impl<P: Platform + ?Sized> Platform for &mut P {
    type Line = P::Line;

    fn set_line_mode(&mut self, line: Self::Line, mode: Mode) {
        (**self).set_line_mode(line, mode)
    }

    fn set_line_level(&mut self, line: Self::Line, level: Level) {
        (**self).set_line_level(line, level)
    }

    fn read_line_level(&mut self, line: Self::Line) -> Level {
        (**self).read_line_level(line)
    }

    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&mut self, duration: Duration) {
        (**self).sleep(duration)
    }
}
