//! Simulated PS/2 bus.
//!
//! [`SimBus`] implements [`Platform`] on a virtual clock. Time moves only
//! when the host sleeps or polls a line, and the attached [`Device`] is
//! stepped once per virtual microsecond, so the transport can be exercised
//! bit for bit without real hardware or real delays.
//!
//! Lines are open-drain: a line reads low when either the host or the
//! device pulls it low.

mod mouse;

pub use mouse::{
    Fault, MouseConfig, SimMouse, DEFAULT_HALF_PERIOD_US, MAX_HALF_PERIOD_US, MIN_HALF_PERIOD_US,
};

use std::time::{Duration, Instant};

use crate::hw_trait::{Level, Mode, Platform};

const MICROSECOND: Duration = Duration::from_micros(1);

/// The two lines of the simulated bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimLine {
    Clock,
    Data,
}

/// Which lines one side is pulling low.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Drive {
    pub clock_low: bool,
    pub data_low: bool,
}

impl Drive {
    pub const RELEASED: Drive = Drive {
        clock_low: false,
        data_low: false,
    };
}

/// Device side of the bus.
pub trait Device {
    /// Advance one microsecond, seeing what the host pulls low, and return
    /// what the device pulls low afterwards.
    fn tick(&mut self, host: Drive) -> Drive;
}

/// A bus with nothing attached; lines only move when the host moves them.
#[derive(Debug, Default)]
pub struct NoDevice;

impl Device for NoDevice {
    fn tick(&mut self, _host: Drive) -> Drive {
        Drive::RELEASED
    }
}

#[derive(Debug, Clone, Copy)]
struct HostPin {
    mode: Mode,
    level: Level,
}

impl HostPin {
    fn pulls_low(&self) -> bool {
        self.mode == Mode::Output && self.level == Level::Low
    }
}

/// Host-facing side of the simulated bus.
pub struct SimBus<D> {
    epoch: Instant,
    elapsed: Duration,
    poll_cost: Duration,
    clock: HostPin,
    data: HostPin,
    device: D,
    device_drive: Drive,
}

impl<D: Device> SimBus<D> {
    pub fn new(device: D) -> Self {
        let released = HostPin {
            mode: Mode::Input,
            level: Level::High,
        };
        Self {
            epoch: Instant::now(),
            elapsed: Duration::ZERO,
            poll_cost: MICROSECOND,
            clock: released,
            data: released,
            device,
            device_drive: Drive::RELEASED,
        }
    }

    /// Virtual time charged for each line read. Rounded down to whole
    /// microseconds.
    pub fn with_poll_cost(mut self, cost: Duration) -> Self {
        self.poll_cost = cost;
        self
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Virtual time since the bus was created.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Mode and level the host last set on a line.
    pub fn host_pin(&self, line: SimLine) -> (Mode, Level) {
        let pin = self.pin(line);
        (pin.mode, pin.level)
    }

    /// Current level of a line, without advancing time.
    pub fn level(&self, line: SimLine) -> Level {
        let host = self.host_drive();
        let low = match line {
            SimLine::Clock => host.clock_low || self.device_drive.clock_low,
            SimLine::Data => host.data_low || self.device_drive.data_low,
        };
        Level::from(!low)
    }

    /// Run the device forward. Host pins stay as they are.
    pub fn advance(&mut self, duration: Duration) {
        let micros = duration.as_micros();
        for _ in 0..micros {
            self.device_drive = self.device.tick(self.host_drive());
            self.elapsed += MICROSECOND;
        }
    }

    fn host_drive(&self) -> Drive {
        Drive {
            clock_low: self.clock.pulls_low(),
            data_low: self.data.pulls_low(),
        }
    }

    fn pin(&self, line: SimLine) -> &HostPin {
        match line {
            SimLine::Clock => &self.clock,
            SimLine::Data => &self.data,
        }
    }

    fn pin_mut(&mut self, line: SimLine) -> &mut HostPin {
        match line {
            SimLine::Clock => &mut self.clock,
            SimLine::Data => &mut self.data,
        }
    }
}

impl<D: Device> Platform for SimBus<D> {
    type Line = SimLine;

    fn set_line_mode(&mut self, line: SimLine, mode: Mode) {
        self.pin_mut(line).mode = mode;
    }

    fn set_line_level(&mut self, line: SimLine, level: Level) {
        self.pin_mut(line).level = level;
    }

    fn read_line_level(&mut self, line: SimLine) -> Level {
        self.advance(self.poll_cost);
        self.level(line)
    }

    fn now(&self) -> Instant {
        self.epoch + self.elapsed
    }

    fn sleep(&mut self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Pulls the clock low between two virtual times.
    struct ClockPulse {
        t: u32,
        from: u32,
        to: u32,
        seen: Vec<Drive>,
    }

    impl Device for ClockPulse {
        fn tick(&mut self, host: Drive) -> Drive {
            self.seen.push(host);
            self.t += 1;
            Drive {
                clock_low: (self.from..self.to).contains(&self.t),
                data_low: false,
            }
        }
    }

    #[test]
    fn test_open_drain_levels() {
        let mut bus = SimBus::new(ClockPulse {
            t: 0,
            from: 10,
            to: 20,
            seen: Vec::new(),
        });
        assert_eq!(bus.level(SimLine::Clock), Level::High);

        bus.sleep(Duration::from_micros(12));
        assert_eq!(bus.level(SimLine::Clock), Level::Low);

        // Host releasing does not override a device pull-down
        bus.set_line_mode(SimLine::Clock, Mode::Input);
        bus.set_line_level(SimLine::Clock, Level::High);
        assert_eq!(bus.level(SimLine::Clock), Level::Low);

        bus.sleep(Duration::from_micros(10));
        assert_eq!(bus.level(SimLine::Clock), Level::High);
        assert_eq!(bus.elapsed(), Duration::from_micros(22));
    }

    #[test]
    fn test_device_sees_host_drive() {
        let mut bus = SimBus::new(ClockPulse {
            t: 0,
            from: 0,
            to: 0,
            seen: Vec::new(),
        });
        bus.set_line_mode(SimLine::Data, Mode::Output);
        bus.set_line_level(SimLine::Data, Level::Low);
        bus.read_line_level(SimLine::Data);

        assert_eq!(
            bus.device().seen,
            vec![Drive {
                clock_low: false,
                data_low: true
            }]
        );
    }

    #[test]
    fn test_poll_cost_and_clock() {
        let mut bus = SimBus::new(NoDevice).with_poll_cost(Duration::from_micros(3));
        let start = bus.now();
        for _ in 0..4 {
            bus.read_line_level(SimLine::Clock);
        }
        assert_eq!(bus.now() - start, Duration::from_micros(12));
    }
}
