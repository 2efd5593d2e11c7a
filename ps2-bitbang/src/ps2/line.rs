//! Line driver.
//!
//! PS/2 lines are open-collector: either side may pull a line low, nobody
//! drives it high. Releasing a line means switching it to input with the
//! pull-up on so the other party is free to pull it down.

use crate::hw_trait::{Level, Mode, Platform};

/// Let the line float high (input mode, pull-up).
pub fn release<P: Platform + ?Sized>(platform: &mut P, line: P::Line) {
    platform.set_line_mode(line, Mode::Input);
    platform.set_line_level(line, Level::High);
}

/// Actively hold the line low (output mode, low).
pub fn assert_low<P: Platform + ?Sized>(platform: &mut P, line: P::Line) {
    platform.set_line_mode(line, Mode::Output);
    platform.set_line_level(line, Level::Low);
}

/// Put a bit value on the line: released for 1, held low for 0.
pub fn drive<P: Platform + ?Sized>(platform: &mut P, line: P::Line, high: bool) {
    if high {
        release(platform, line);
    } else {
        assert_low(platform, line);
    }
}
