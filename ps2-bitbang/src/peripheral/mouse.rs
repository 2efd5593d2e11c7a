//! PS/2 mouse driver
//!
//! Brings a mouse out of reset into remote (polled) mode and fetches raw
//! movement packets on request. Packet contents are left to the caller.

use crate::error::Result;
use crate::hw_trait::Platform;
use crate::ps2::{timing, Command, ConnectionState, Ps2Transport};
use crate::tracing::prelude::*;

/// PS/2 mouse on a bit-banged transport
pub struct Ps2Mouse<P: Platform> {
    transport: Ps2Transport<P>,
}

impl<P: Platform> Ps2Mouse<P> {
    pub fn new(transport: Ps2Transport<P>) -> Self {
        Self { transport }
    }

    /// Reset the mouse and select remote mode.
    ///
    /// Stops at the first transfer that times out and returns false; later
    /// steps are not attempted. Returns true, and marks the transport
    /// connected again, only if every step succeeded. No retries.
    pub fn initialize(&mut self) -> bool {
        match self.handshake() {
            Ok(()) => {
                self.transport.restore_connection();
                info!("PS/2 mouse initialized in remote mode");
                true
            }
            Err(e) => {
                warn!("PS/2 mouse initialization failed: {}", e);
                false
            }
        }
    }

    fn handshake(&mut self) -> Result<()> {
        debug!("Resetting PS/2 mouse");
        self.transport.write(Command::Reset as u8)?;

        // Ack from the reset, then self-test result and device ID; none
        // are validated.
        let bat = self.transport.read()?;
        debug!("Reset response: 0x{:02X}", bat);
        let id = self.transport.read()?;
        debug!("Device ID: 0x{:02X}", id);
        let id = self.transport.read()?;
        debug!("Device ID: 0x{:02X}", id);

        debug!("Selecting remote mode");
        self.transport.write(Command::SetRemoteMode as u8)?;
        let ack = self.transport.read()?;
        debug!("Remote mode ack: 0x{:02X}", ack);

        self.transport.platform_mut().sleep(timing::SETTLE);
        Ok(())
    }

    /// Request one movement packet (remote mode) and return its three raw
    /// bytes.
    pub fn poll(&mut self) -> Result<[u8; 3]> {
        self.transport.write(Command::ReadData as u8)?;
        let ack = self.transport.read()?;
        trace!("Read data ack: 0x{:02X}", ack);

        let mut packet = [0u8; 3];
        for byte in packet.iter_mut() {
            *byte = self.transport.read()?;
        }
        Ok(packet)
    }

    pub fn connection(&self) -> ConnectionState {
        self.transport.connection()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn transport(&self) -> &Ps2Transport<P> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Ps2Transport<P> {
        &mut self.transport
    }

    pub fn into_transport(self) -> Ps2Transport<P> {
        self.transport
    }
}
