// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Blocking register transport over a Linux kernel I²C adapter.
//!
//! `read`/`write` each perform one atomic bus transaction: a register
//! address write immediately followed by the data phase, with no other
//! transaction able to interleave. A single lock per bus serialises callers,
//! so sensors sharing an adapter never race.

use std::path::Path;
use std::sync::Mutex;

use i2cdev::core::{I2CMessage, I2CTransfer};
use i2cdev::linux::{LinuxI2CBus, LinuxI2CError, LinuxI2CMessage};

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("failed to open i2c adapter {0}")]
    OpenFailed(String),
    #[error("i2c transaction failed (addr 0x{slave_addr:02x}, reg 0x{reg_addr:02x})")]
    TransactionFailed { slave_addr: u8, reg_addr: u8 },
}

/// A register-addressed I²C transport, blocking, one instance per physical
/// bus. Safe to share across threads: every operation takes the bus lock for
/// its whole duration.
pub struct I2cBus {
    bus: Mutex<LinuxI2CBus>,
}

impl I2cBus {
    pub fn open(adapter: u8) -> Result<Self, TransportError> {
        let path = format!("/dev/i2c-{adapter}");
        let bus = LinuxI2CBus::new(Path::new(&path))
            .map_err(|_| TransportError::OpenFailed(path))?;
        Ok(Self {
            bus: Mutex::new(bus),
        })
    }

    /// Combined write-register-address-then-read-N transaction.
    pub fn read(&self, slave_addr: u8, reg_addr: u8, buf: &mut [u8]) -> Result<(), TransportError> {
        let addr_byte = [reg_addr];
        let len = buf.len();
        let mut bus = self.bus.lock().unwrap();
        let mut msgs = [
            LinuxI2CMessage::write(&addr_byte).with_address(slave_addr as u16),
            LinuxI2CMessage::read(buf).with_address(slave_addr as u16),
        ];
        bus.transfer(&mut msgs)
            .map_err(|e: LinuxI2CError| {
                log::error!("i2c read failed (dev:0x{slave_addr:02x}, reg:0x{reg_addr:02x}): {e}");
                TransportError::TransactionFailed { slave_addr, reg_addr }
            })?;
        log::debug!("read {len} bytes (dev:0x{slave_addr:02x}, reg:0x{reg_addr:02x})");
        Ok(())
    }

    /// Register address followed by `data`, written as a single transfer.
    pub fn write(&self, slave_addr: u8, reg_addr: u8, data: &[u8]) -> Result<(), TransportError> {
        let mut payload = Vec::with_capacity(data.len() + 1);
        payload.push(reg_addr);
        payload.extend_from_slice(data);

        let mut bus = self.bus.lock().unwrap();
        let mut msgs = [LinuxI2CMessage::write(&payload).with_address(slave_addr as u16)];
        bus.transfer(&mut msgs).map_err(|e: LinuxI2CError| {
            log::error!("i2c write failed (dev:0x{slave_addr:02x}, reg:0x{reg_addr:02x}): {e}");
            TransportError::TransactionFailed { slave_addr, reg_addr }
        })?;
        log::debug!("wrote {} bytes (dev:0x{slave_addr:02x}, reg:0x{reg_addr:02x})", data.len());
        Ok(())
    }
}
