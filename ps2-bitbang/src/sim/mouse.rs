//! Simulated PS/2 mouse.
//!
//! Implements the device side of both transfer directions on a
//! microsecond tick: it answers a host request-to-send by clocking a frame
//! in (and acking it), and clocks queued bytes out whenever the host has
//! released the bus long enough. Faults can be injected per frame to
//! reproduce a missing, stalling or slow device.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::ps2::{response, Command, Frame, FrameError};
use crate::tracing::prelude::*;

use super::{Device, Drive};

/// Half of one clock period, in microseconds. Devices clock at 10-16.7 kHz.
pub const DEFAULT_HALF_PERIOD_US: u32 = 40;

/// Half-period bounds for the 10-16.7 kHz range. A slower clock keeps the
/// parity pulse low past the host's stop-bit settle delay, so the host
/// takes the parity fall for the stop bit and a write "succeeds" that the
/// device never completed.
pub const MIN_HALF_PERIOD_US: u32 = 30;
pub const MAX_HALF_PERIOD_US: u32 = 50;

/// A stalled device gets back on the bus after this long even if the host
/// never claims the clock. Longer than any single host wait.
const STALL_RECOVERY_US: u32 = 8_000;

/// Bus idle time the device waits for before it starts sending.
const IDLE_BEFORE_SEND_US: u32 = 50;

/// Index of the stop bit within a frame.
const STOP_BIT: u8 = 10;

/// Misbehaviour to inject. Frames are counted from 0 in completion order,
/// both directions together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fault {
    /// Stop responding once this many frames have completed. `0` is a
    /// device that is not there at all.
    Unresponsive { after_frames: usize },
    /// During the given frame, stop clocking after this many clock pulses
    /// and let go of both lines. The device recovers the next time the
    /// host pulls the clock low, or on its own after 8ms.
    Stall { frame: usize, after_clocks: u8 },
    /// Like `Stall`, but the device pulls the clock low for pulse
    /// `after_clocks` and never lets it back up.
    ClockStuckLow { frame: usize, after_clocks: u8 },
    /// After acking the given host-to-device frame, release the clock but
    /// keep holding data low. The byte itself is received.
    HoldDataAfterAck { frame: usize },
    /// When sending the given frame, hold the clock high this much longer
    /// before the stop bit.
    LateStopBit { frame: usize, delay_us: u32 },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MouseConfig {
    /// Clamped to `MIN_HALF_PERIOD_US..=MAX_HALF_PERIOD_US`; config loading
    /// rejects values outside it.
    pub half_period_us: u32,
    /// Send every frame with the wrong parity bit.
    pub corrupt_parity: bool,
    pub fault: Option<Fault>,
}

impl Default for MouseConfig {
    fn default() -> Self {
        Self {
            half_period_us: DEFAULT_HALF_PERIOD_US,
            corrupt_parity: false,
            fault: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RecvStep {
    Low,
    High,
    AckHigh,
    AckLow,
}

#[derive(Debug, Clone, Copy)]
enum SendStep {
    Setup,
    Low,
    HighFirst,
    HighSecond,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Idle { released_for: u32 },
    RequestToSend { wait: u32 },
    Receiving { frame: u16, bit: u8, step: RecvStep, wait: u32 },
    Sending { frame: Frame, bit: u8, step: SendStep, wait: u32 },
    Stalled { held_for: u32 },
}

pub struct SimMouse {
    config: MouseConfig,
    state: State,
    drive: Drive,
    outbox: VecDeque<u8>,
    received: Vec<u8>,
    sent: Vec<u8>,
    frames: usize,
    parity_errors: usize,
    remote_mode: bool,
    packet: [u8; 3],
}

impl SimMouse {
    pub fn new(config: MouseConfig) -> Self {
        Self {
            config,
            state: State::Idle { released_for: 0 },
            drive: Drive::RELEASED,
            outbox: VecDeque::new(),
            received: Vec::new(),
            sent: Vec::new(),
            frames: 0,
            parity_errors: 0,
            remote_mode: false,
            packet: [0x08, 0x00, 0x00],
        }
    }

    /// Queue a byte to send to the host.
    pub fn queue(&mut self, byte: u8) {
        self.outbox.push_back(byte);
    }

    /// Movement packet returned for a `ReadData` request.
    pub fn set_packet(&mut self, packet: [u8; 3]) {
        self.packet = packet;
    }

    /// Data bytes clocked in from the host, including ones with bad parity.
    pub fn received(&self) -> &[u8] {
        &self.received
    }

    /// Bytes fully clocked out to the host.
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    pub fn pending(&self) -> usize {
        self.outbox.len()
    }

    /// Completed frames in both directions.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn parity_errors(&self) -> usize {
        self.parity_errors
    }

    pub fn is_remote_mode(&self) -> bool {
        self.remote_mode
    }

    fn half(&self) -> u32 {
        self.config
            .half_period_us
            .clamp(MIN_HALF_PERIOD_US, MAX_HALF_PERIOD_US)
    }

    fn unresponsive(&self) -> bool {
        matches!(
            self.config.fault,
            Some(Fault::Unresponsive { after_frames }) if self.frames >= after_frames
        )
    }

    // Checked at each clock fall. Consumes the fault so a retried frame
    // goes through.
    fn take_stall(&mut self, clocks: u8) -> Option<State> {
        let drive = match self.config.fault {
            Some(Fault::Stall { frame, after_clocks })
                if frame == self.frames && after_clocks == clocks =>
            {
                Drive::RELEASED
            }
            Some(Fault::ClockStuckLow { frame, after_clocks })
                if frame == self.frames && after_clocks == clocks =>
            {
                Drive {
                    clock_low: true,
                    ..self.drive
                }
            }
            _ => return None,
        };
        debug!(frame = self.frames, clocks, "Simulated mouse stalling");
        self.config.fault = None;
        self.drive = drive;
        Some(State::Stalled { held_for: 0 })
    }

    fn take_ack_hold(&mut self) -> bool {
        match self.config.fault {
            Some(Fault::HoldDataAfterAck { frame }) if frame == self.frames => {
                debug!(frame, "Simulated mouse holding data after ack");
                self.config.fault = None;
                true
            }
            _ => false,
        }
    }

    fn take_stop_delay(&mut self) -> u32 {
        match self.config.fault {
            Some(Fault::LateStopBit { frame, delay_us }) if frame == self.frames => {
                self.config.fault = None;
                delay_us
            }
            _ => 0,
        }
    }

    fn step(&mut self, state: State, host: Drive) -> State {
        let half = self.half();
        match state {
            State::Idle { released_for } => {
                if self.unresponsive() {
                    return State::Idle { released_for: 0 };
                }
                if host.data_low && !host.clock_low {
                    return State::RequestToSend { wait: half };
                }
                if host.clock_low || host.data_low || self.outbox.is_empty() {
                    return State::Idle { released_for: 0 };
                }
                let released_for = released_for + 1;
                if released_for < IDLE_BEFORE_SEND_US {
                    return State::Idle { released_for };
                }
                let Some(&byte) = self.outbox.front() else {
                    return State::Idle { released_for: 0 };
                };
                let mut frame = Frame::encode(byte);
                if self.config.corrupt_parity {
                    frame = frame.with_parity_flipped();
                }
                self.drive.data_low = frame.bit(0) == Some(false);
                State::Sending {
                    frame,
                    bit: 0,
                    step: SendStep::Setup,
                    wait: half / 2,
                }
            }

            State::RequestToSend { wait } => {
                if host.clock_low || !host.data_low {
                    return State::Idle { released_for: 0 };
                }
                if wait > 1 {
                    return State::RequestToSend { wait: wait - 1 };
                }
                if let Some(stalled) = self.take_stall(0) {
                    return stalled;
                }
                self.drive.clock_low = true;
                State::Receiving {
                    frame: (!host.data_low) as u16,
                    bit: 0,
                    step: RecvStep::Low,
                    wait: half,
                }
            }

            State::Receiving {
                mut frame,
                bit,
                step,
                wait,
            } => {
                if wait > 1 {
                    return State::Receiving {
                        frame,
                        bit,
                        step,
                        wait: wait - 1,
                    };
                }
                match step {
                    RecvStep::Low => {
                        self.drive.clock_low = false;
                        let step = if bit == STOP_BIT {
                            self.drive.data_low = true;
                            RecvStep::AckHigh
                        } else {
                            RecvStep::High
                        };
                        State::Receiving {
                            frame,
                            bit,
                            step,
                            wait: half,
                        }
                    }
                    RecvStep::High => {
                        let bit = bit + 1;
                        if let Some(stalled) = self.take_stall(bit) {
                            return stalled;
                        }
                        self.drive.clock_low = true;
                        if !host.data_low {
                            frame |= 1 << bit;
                        }
                        State::Receiving {
                            frame,
                            bit,
                            step: RecvStep::Low,
                            wait: half,
                        }
                    }
                    RecvStep::AckHigh => {
                        self.drive.clock_low = true;
                        State::Receiving {
                            frame,
                            bit,
                            step: RecvStep::AckLow,
                            wait: half,
                        }
                    }
                    RecvStep::AckLow => {
                        let hold = self.take_ack_hold();
                        self.drive = Drive {
                            clock_low: false,
                            data_low: hold,
                        };
                        self.finish_receive(Frame::from_raw(frame));
                        if hold {
                            State::Stalled { held_for: 0 }
                        } else {
                            State::Idle { released_for: 0 }
                        }
                    }
                }
            }

            State::Sending {
                frame,
                bit,
                step,
                wait,
            } => {
                // Host holding the clock low while we have it released is
                // an inhibit: abandon the frame, keep the byte.
                if !matches!(step, SendStep::Low) && host.clock_low {
                    trace!(bit, "Simulated mouse inhibited mid-frame");
                    self.drive = Drive::RELEASED;
                    return State::Idle { released_for: 0 };
                }
                if wait > 1 {
                    return State::Sending {
                        frame,
                        bit,
                        step,
                        wait: wait - 1,
                    };
                }
                match step {
                    SendStep::Setup | SendStep::HighSecond => {
                        if let Some(stalled) = self.take_stall(bit) {
                            return stalled;
                        }
                        self.drive.clock_low = true;
                        State::Sending {
                            frame,
                            bit,
                            step: SendStep::Low,
                            wait: half,
                        }
                    }
                    SendStep::Low => {
                        self.drive.clock_low = false;
                        if bit == STOP_BIT {
                            self.drive = Drive::RELEASED;
                            self.finish_send();
                            return State::Idle { released_for: 0 };
                        }
                        State::Sending {
                            frame,
                            bit,
                            step: SendStep::HighFirst,
                            wait: half / 2,
                        }
                    }
                    SendStep::HighFirst => {
                        let bit = bit + 1;
                        self.drive.data_low = frame.bit(bit as usize) == Some(false);
                        let mut wait = half - half / 2;
                        if bit == STOP_BIT {
                            wait += self.take_stop_delay();
                        }
                        State::Sending {
                            frame,
                            bit,
                            step: SendStep::HighSecond,
                            wait,
                        }
                    }
                }
            }

            State::Stalled { held_for } => {
                if host.clock_low || held_for >= STALL_RECOVERY_US {
                    trace!(held_for, "Simulated mouse back on the bus");
                    self.drive = Drive::RELEASED;
                    State::Idle { released_for: 0 }
                } else {
                    State::Stalled {
                        held_for: held_for + 1,
                    }
                }
            }
        }
    }

    fn finish_receive(&mut self, frame: Frame) {
        self.frames += 1;
        match frame.decode() {
            Ok(byte) => {
                trace!("Simulated mouse RX 0x{:02X}", byte);
                self.received.push(byte);
                self.respond(byte);
            }
            Err(FrameError::Parity { data }) => {
                debug!("Simulated mouse RX 0x{:02X} with bad parity", data);
                self.received.push(data);
                self.parity_errors += 1;
                self.outbox.push_back(response::RESEND);
            }
            Err(e) => {
                debug!("Simulated mouse dropped frame: {}", e);
                self.outbox.push_back(response::RESEND);
            }
        }
    }

    fn finish_send(&mut self) {
        self.frames += 1;
        if let Some(byte) = self.outbox.pop_front() {
            trace!("Simulated mouse TX 0x{:02X}", byte);
            self.sent.push(byte);
        }
    }

    fn respond(&mut self, byte: u8) {
        let Some(command) = Command::from_repr(byte) else {
            self.outbox.push_back(response::RESEND);
            return;
        };
        match command {
            Command::Reset => {
                self.outbox.clear();
                self.remote_mode = false;
                self.outbox
                    .extend([response::ACK, response::BAT_OK, response::MOUSE_ID]);
            }
            Command::SetRemoteMode => {
                self.remote_mode = true;
                self.outbox.push_back(response::ACK);
            }
            Command::SetStreamMode => {
                self.remote_mode = false;
                self.outbox.push_back(response::ACK);
            }
            Command::ReadData => {
                self.outbox.push_back(response::ACK);
                self.outbox.extend(self.packet);
            }
            Command::GetDeviceId => {
                self.outbox.extend([response::ACK, response::MOUSE_ID]);
            }
            Command::Resend => {
                // Repeat the last byte sent
                if let Some(&last) = self.sent.last() {
                    self.outbox.push_back(last);
                }
            }
            Command::EnableReporting | Command::DisableReporting | Command::SetDefaults => {
                self.outbox.push_back(response::ACK);
            }
        }
    }
}

impl Device for SimMouse {
    fn tick(&mut self, host: Drive) -> Drive {
        self.state = self.step(self.state, host);
        self.drive
    }
}
