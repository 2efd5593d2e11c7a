//! PS/2 transport.
//!
//! Byte-level write and read built from timed clock/data bit sequences.
//! Every wait on the device is bounded by [`timing::TIMEOUT`]; the first
//! expired wait aborts the byte and marks the transport disconnected. No
//! partial byte is ever returned and nothing is retried here.
//!
//! Both directions end with the host holding the clock low, which stops the
//! device from sending until the next operation releases the bus.

use std::time::Duration;

use crate::config::{FirstClockWait, TransportConfig};
use crate::error::{Error, Phase, Result};
use crate::hw_trait::Platform;
use crate::tracing::prelude::*;

use super::line;
use super::timing;
use super::wait;

/// Whether the device is believed present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Host side of a PS/2 link over two bit-banged lines.
///
/// Not reentrant: calls must not overlap, and nothing inside yields.
pub struct Ps2Transport<P: Platform> {
    platform: P,
    clock: P::Line,
    data: P::Line,
    connection: ConnectionState,
    first_clock_wait: FirstClockWait,
}

impl<P: Platform> Ps2Transport<P> {
    /// Take ownership of the two lines and release them to idle.
    pub fn new(platform: P, clock: P::Line, data: P::Line) -> Self {
        Self::with_config(platform, clock, data, &TransportConfig::default())
    }

    pub fn with_config(
        mut platform: P,
        clock: P::Line,
        data: P::Line,
        config: &TransportConfig,
    ) -> Self {
        line::release(&mut platform, clock);
        line::release(&mut platform, data);
        Self {
            platform,
            clock,
            data,
            connection: ConnectionState::Connected,
            first_clock_wait: config.first_clock_wait,
        }
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn into_platform(self) -> P {
        self.platform
    }

    /// Only a complete device handshake may bring the link back.
    pub(crate) fn restore_connection(&mut self) {
        self.connection = ConnectionState::Connected;
    }

    /// Send one byte to the device.
    ///
    /// Runs even when already disconnected; a device that is still absent
    /// simply fails again.
    pub fn write(&mut self, byte: u8) -> Result<()> {
        let result = self.clock_out(byte);
        self.settle(result)?;
        trace!("PS/2 TX 0x{:02X}", byte);
        Ok(())
    }

    /// Receive one byte from the device. The parity bit is not checked.
    pub fn read(&mut self) -> Result<u8> {
        let result = self.clock_in();
        let byte = self.settle(result)?;
        trace!("PS/2 RX 0x{:02X}", byte);
        Ok(byte)
    }

    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.connection = ConnectionState::Disconnected;
            warn!("{}; marking device disconnected", e);
        }
        result
    }

    fn clock_out(&mut self, mut byte: u8) -> Result<()> {
        let (clock, data) = (self.clock, self.data);
        let p = &mut self.platform;

        line::release(p, data);
        line::release(p, clock);
        p.sleep(timing::BUS_IDLE);

        // Request-to-send: claim the clock, pull data low for the start
        // bit, then hand the clock to the device.
        line::assert_low(p, clock);
        p.sleep(timing::CLAIM_HOLD);
        line::assert_low(p, data);
        p.sleep(timing::START_SETUP);
        line::release(p, clock);

        self.await_clock_low(Phase::RequestToSend)?;

        let mut parity = 1;
        for bit in 0..8 {
            line::drive(&mut self.platform, data, byte & 0x01 != 0);
            self.await_clock_pulse(Phase::WriteBit(bit))?;
            parity ^= byte & 0x01;
            byte >>= 1;
        }

        line::drive(&mut self.platform, data, parity != 0);
        self.await_clock_pulse(Phase::WriteParity)?;

        line::release(&mut self.platform, data);
        self.platform.sleep(timing::STOP_BIT_SETTLE);
        self.await_clock_low(Phase::StopBit)?;

        // The device acks by pulling data low for one more clock; wait for
        // it to let go of both lines.
        let now = self.platform.now();
        wait::wait_while(&mut self.platform, now, timing::TIMEOUT, |p| {
            p.read_line_level(clock).is_low() || p.read_line_level(data).is_low()
        })
        .map_err(|_| Error::TimeoutDisconnect(Phase::Acknowledge))?;

        line::assert_low(&mut self.platform, clock);
        Ok(())
    }

    fn clock_in(&mut self) -> Result<u8> {
        let (clock, data) = (self.clock, self.data);

        line::release(&mut self.platform, clock);
        line::release(&mut self.platform, data);
        self.platform.sleep(timing::READ_RELEASE);

        match self.first_clock_wait.budget() {
            Some(budget) => self.await_clock_level(false, budget, Phase::StartRequest)?,
            None => wait::spin_while(&mut self.platform, |p| {
                p.read_line_level(clock).is_high()
            }),
        }
        self.platform.sleep(timing::START_BIT_DELAY);
        self.await_clock_high(Phase::StartBit)?;

        let mut byte = 0u8;
        for bit in 0..8 {
            self.await_clock_low(Phase::ReadBit(bit))?;
            if self.platform.read_line_level(data).is_high() {
                byte |= 1 << bit;
            }
            self.await_clock_high(Phase::ReadBit(bit))?;
        }

        // Parity and stop share one budget; only the total is checked.
        let since = self.platform.now();
        for _ in 0..2 {
            let _ = wait::wait_while(&mut self.platform, since, timing::TIMEOUT, |p| {
                p.read_line_level(clock).is_high()
            });
            let _ = wait::wait_while(&mut self.platform, since, timing::TIMEOUT, |p| {
                p.read_line_level(clock).is_low()
            });
        }
        if self.platform.now().saturating_duration_since(since) >= timing::TIMEOUT {
            return Err(Error::TimeoutDisconnect(Phase::FrameTail));
        }

        line::assert_low(&mut self.platform, clock);
        Ok(byte)
    }

    /// One device clock pulse: low-to-high, then high-to-low.
    fn await_clock_pulse(&mut self, phase: Phase) -> Result<()> {
        self.await_clock_high(phase)?;
        self.await_clock_low(phase)
    }

    fn await_clock_low(&mut self, phase: Phase) -> Result<()> {
        self.await_clock_level(false, timing::TIMEOUT, phase)
    }

    fn await_clock_high(&mut self, phase: Phase) -> Result<()> {
        self.await_clock_level(true, timing::TIMEOUT, phase)
    }

    fn await_clock_level(&mut self, high: bool, budget: Duration, phase: Phase) -> Result<()> {
        let clock = self.clock;
        let since = self.platform.now();
        wait::wait_while(&mut self.platform, since, budget, |p| {
            p.read_line_level(clock).is_high() != high
        })
        .map_err(|_| Error::TimeoutDisconnect(phase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw_trait::{Level, Mode};
    use crate::sim::{
        Fault, MouseConfig, NoDevice, SimBus, SimLine, SimMouse, MAX_HALF_PERIOD_US,
        MIN_HALF_PERIOD_US,
    };
    use test_case::test_case;

    fn transport_with(config: MouseConfig) -> Ps2Transport<SimBus<SimMouse>> {
        let bus = SimBus::new(SimMouse::new(config));
        Ps2Transport::new(bus, SimLine::Clock, SimLine::Data)
    }

    fn healthy() -> Ps2Transport<SimBus<SimMouse>> {
        transport_with(MouseConfig::default())
    }

    fn faulty(fault: Fault) -> Ps2Transport<SimBus<SimMouse>> {
        transport_with(MouseConfig {
            fault: Some(fault),
            ..Default::default()
        })
    }

    #[test]
    fn test_new_releases_lines() {
        let transport = healthy();
        let bus = transport.platform();
        assert_eq!(bus.host_pin(SimLine::Clock), (Mode::Input, Level::High));
        assert_eq!(bus.host_pin(SimLine::Data), (Mode::Input, Level::High));
        assert_eq!(transport.connection(), ConnectionState::Connected);
    }

    #[test]
    fn test_write_every_byte() {
        for byte in 0..=u8::MAX {
            let mut transport = healthy();
            assert_eq!(transport.write(byte), Ok(()), "byte 0x{:02X}", byte);

            let bus = transport.platform();
            assert_eq!(bus.device().received(), &[byte]);
            assert_eq!(bus.device().parity_errors(), 0, "byte 0x{:02X}", byte);
            // Clock held low to keep the reply queued
            assert_eq!(bus.host_pin(SimLine::Clock), (Mode::Output, Level::Low));
            assert!(transport.is_connected());
        }
    }

    #[test]
    fn test_read_every_byte() {
        for byte in 0..=u8::MAX {
            let mut transport = healthy();
            transport.platform_mut().device_mut().queue(byte);

            assert_eq!(transport.read(), Ok(byte));
            let bus = transport.platform();
            assert_eq!(bus.device().sent(), &[byte]);
            assert_eq!(bus.host_pin(SimLine::Clock), (Mode::Output, Level::Low));
        }
    }

    #[test_case(0x00)]
    #[test_case(0xAA)]
    #[test_case(0xFA)]
    #[test_case(0x7F)]
    fn test_read_ignores_parity(byte: u8) {
        let mut transport = transport_with(MouseConfig {
            corrupt_parity: true,
            ..Default::default()
        });
        transport.platform_mut().device_mut().queue(byte);

        assert_eq!(transport.read(), Ok(byte));
        assert!(transport.is_connected());
    }

    #[test]
    fn test_reads_queued_bytes_in_order() {
        let mut transport = healthy();
        for byte in [0x12, 0x34, 0x56] {
            transport.platform_mut().device_mut().queue(byte);
        }
        assert_eq!(transport.read(), Ok(0x12));
        assert_eq!(transport.read(), Ok(0x34));
        assert_eq!(transport.read(), Ok(0x56));
    }

    #[test]
    fn test_write_to_absent_device_times_out_within_budget() {
        let mut transport = faulty(Fault::Unresponsive { after_frames: 0 });
        let start = transport.platform().elapsed();

        assert_eq!(
            transport.write(0xFF),
            Err(Error::TimeoutDisconnect(Phase::RequestToSend))
        );
        assert_eq!(transport.connection(), ConnectionState::Disconnected);

        let taken = transport.platform().elapsed() - start;
        let setup = timing::BUS_IDLE + timing::CLAIM_HOLD + timing::START_SETUP;
        assert!(taken >= timing::TIMEOUT);
        assert!(taken <= setup + timing::TIMEOUT + Duration::from_micros(10));
        assert!(transport.platform().device().received().is_empty());
    }

    #[test]
    fn test_read_from_absent_device_times_out() {
        let mut transport = faulty(Fault::Unresponsive { after_frames: 0 });
        transport.platform_mut().device_mut().queue(0xAA);

        assert_eq!(
            transport.read(),
            Err(Error::TimeoutDisconnect(Phase::StartRequest))
        );
        assert!(!transport.is_connected());
    }

    // Clock pulses 1-8 carry the data bits, 9 parity, 10 stop.
    #[test_case(0, Phase::RequestToSend)]
    #[test_case(1, Phase::WriteBit(0))]
    #[test_case(2, Phase::WriteBit(1))]
    #[test_case(3, Phase::WriteBit(2))]
    #[test_case(4, Phase::WriteBit(3))]
    #[test_case(5, Phase::WriteBit(4))]
    #[test_case(6, Phase::WriteBit(5))]
    #[test_case(7, Phase::WriteBit(6))]
    #[test_case(8, Phase::WriteBit(7))]
    #[test_case(9, Phase::WriteParity)]
    #[test_case(10, Phase::StopBit)]
    fn test_stall_mid_write(after_clocks: u8, phase: Phase) {
        let mut transport = faulty(Fault::Stall {
            frame: 0,
            after_clocks,
        });

        assert_eq!(
            transport.write(0xA5),
            Err(Error::TimeoutDisconnect(phase))
        );
        assert_eq!(transport.connection(), ConnectionState::Disconnected);
        assert!(transport.platform().device().received().is_empty());
    }

    #[test_case(0, Phase::StartRequest)]
    #[test_case(1, Phase::ReadBit(0))]
    #[test_case(2, Phase::ReadBit(1))]
    #[test_case(3, Phase::ReadBit(2))]
    #[test_case(4, Phase::ReadBit(3))]
    #[test_case(5, Phase::ReadBit(4))]
    #[test_case(6, Phase::ReadBit(5))]
    #[test_case(7, Phase::ReadBit(6))]
    #[test_case(8, Phase::ReadBit(7))]
    #[test_case(9, Phase::FrameTail ; "parity clock")]
    #[test_case(10, Phase::FrameTail ; "stop clock")]
    fn test_stall_mid_read(after_clocks: u8, phase: Phase) {
        let mut transport = faulty(Fault::Stall {
            frame: 0,
            after_clocks,
        });
        transport.platform_mut().device_mut().queue(0xA5);

        assert_eq!(transport.read(), Err(Error::TimeoutDisconnect(phase)));
        assert_eq!(transport.connection(), ConnectionState::Disconnected);
        // Not clocked out in full, so still queued
        let device = transport.platform().device();
        assert!(device.sent().is_empty());
        assert_eq!(device.pending(), 1);
    }

    #[test_case(0, Phase::WriteBit(0))]
    #[test_case(5, Phase::WriteBit(5))]
    #[test_case(8, Phase::WriteParity)]
    #[test_case(10, Phase::Acknowledge ; "stop clock")]
    fn test_clock_stuck_low_mid_write(after_clocks: u8, phase: Phase) {
        let mut transport = faulty(Fault::ClockStuckLow {
            frame: 0,
            after_clocks,
        });

        assert_eq!(
            transport.write(0x3C),
            Err(Error::TimeoutDisconnect(phase))
        );
        assert!(!transport.is_connected());
    }

    #[test_case(0, Phase::StartBit)]
    #[test_case(5, Phase::ReadBit(4))]
    #[test_case(9, Phase::FrameTail)]
    fn test_clock_stuck_low_mid_read(after_clocks: u8, phase: Phase) {
        let mut transport = faulty(Fault::ClockStuckLow {
            frame: 0,
            after_clocks,
        });
        transport.platform_mut().device_mut().queue(0x3C);

        assert_eq!(transport.read(), Err(Error::TimeoutDisconnect(phase)));
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_data_held_after_ack() {
        let mut transport = faulty(Fault::HoldDataAfterAck { frame: 0 });

        assert_eq!(
            transport.write(0xF4),
            Err(Error::TimeoutDisconnect(Phase::Acknowledge))
        );
        assert_eq!(transport.connection(), ConnectionState::Disconnected);
        // The byte itself made it across
        assert_eq!(transport.platform().device().received(), &[0xF4]);
    }

    #[test_case(MIN_HALF_PERIOD_US ; "fastest clock")]
    #[test_case(MAX_HALF_PERIOD_US ; "slowest clock")]
    fn test_clock_speed_range(half_period_us: u32) {
        let config = MouseConfig {
            half_period_us,
            ..Default::default()
        };
        for byte in 0..=u8::MAX {
            let mut transport = transport_with(config.clone());
            assert_eq!(transport.write(byte), Ok(()), "byte 0x{:02X}", byte);
            assert_eq!(transport.platform().device().received(), &[byte]);

            let mut transport = transport_with(config.clone());
            transport.platform_mut().device_mut().queue(byte);
            assert_eq!(transport.read(), Ok(byte), "byte 0x{:02X}", byte);
        }
    }

    #[test]
    fn test_late_stop_bit_drops_byte() {
        let mut transport = faulty(Fault::LateStopBit {
            frame: 0,
            delay_us: 6_000,
        });
        transport.platform_mut().device_mut().queue(0x5A);

        assert_eq!(
            transport.read(),
            Err(Error::TimeoutDisconnect(Phase::FrameTail))
        );
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_slow_stop_bit_within_budget() {
        let mut transport = faulty(Fault::LateStopBit {
            frame: 0,
            delay_us: 2_000,
        });
        transport.platform_mut().device_mut().queue(0x5A);

        assert_eq!(transport.read(), Ok(0x5A));
    }

    #[test]
    fn test_disconnect_is_sticky() {
        let mut transport = faulty(Fault::Stall {
            frame: 0,
            after_clocks: 2,
        });
        assert!(transport.write(0xF4).is_err());

        // Device recovered, but only a handshake restores the state
        assert_eq!(transport.write(0xF4), Ok(()));
        assert_eq!(transport.platform().device().received(), &[0xF4]);
        assert_eq!(transport.connection(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_unbounded_first_wait() {
        let bus = SimBus::new(SimMouse::new(MouseConfig::default()));
        let config = TransportConfig {
            first_clock_wait: FirstClockWait::Unbounded,
        };
        let mut transport = Ps2Transport::with_config(bus, SimLine::Clock, SimLine::Data, &config);
        transport.platform_mut().device_mut().queue(0xAA);

        assert_eq!(transport.read(), Ok(0xAA));
    }

    #[test]
    fn test_custom_first_wait_bound() {
        let config = TransportConfig {
            first_clock_wait: FirstClockWait::Bounded { timeout_us: 20_000 },
        };
        let mut transport =
            Ps2Transport::with_config(SimBus::new(NoDevice), SimLine::Clock, SimLine::Data, &config);

        assert_eq!(
            transport.read(),
            Err(Error::TimeoutDisconnect(Phase::StartRequest))
        );
        let elapsed = transport.platform().elapsed();
        assert!(elapsed >= Duration::from_millis(20));
        assert!(elapsed < Duration::from_millis(21));
    }
}
