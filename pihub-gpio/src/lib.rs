// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! GPIO line control over the Linux character device ABI.
//!
//! Each `set`/`get` opens and releases its line on demand, matching the
//! request-then-release pattern of libgpiod consumers: lines are not held
//! open between calls, so other processes can use them in between.

use std::sync::Mutex;

use gpio_cdev::{Chip, LineRequestFlags};

const CONSUMER: &str = "pihub";

#[derive(thiserror::Error, Debug)]
pub enum GpioError {
    #[error("failed to open gpio chip {0}")]
    ChipOpenFailed(String),
    #[error("gpio line {0} operation failed")]
    LineFailure(u32),
}

/// Serialises access to a single GPIO chip. The kernel already guards
/// individual line requests, but one lock avoids two threads racing to
/// request/release the same line at once.
pub struct Gpio {
    chip: Mutex<Chip>,
}

impl Gpio {
    pub fn open(chip_path: &str) -> Result<Self, GpioError> {
        let chip = Chip::new(chip_path)
            .map_err(|_| GpioError::ChipOpenFailed(chip_path.to_string()))?;
        Ok(Self {
            chip: Mutex::new(chip),
        })
    }

    pub fn set(&self, line_num: u32, value: u8) -> Result<(), GpioError> {
        let mut chip = self.chip.lock().unwrap();
        let line = chip
            .get_line(line_num)
            .map_err(|_| GpioError::LineFailure(line_num))?;
        let handle = line
            .request(LineRequestFlags::OUTPUT, value, CONSUMER)
            .map_err(|_| GpioError::LineFailure(line_num))?;
        handle
            .set_value(value)
            .map_err(|_| GpioError::LineFailure(line_num))?;
        log::debug!("gpio {line_num} set to {value}");
        Ok(())
    }

    pub fn get(&self, line_num: u32) -> Result<u8, GpioError> {
        let mut chip = self.chip.lock().unwrap();
        let line = chip
            .get_line(line_num)
            .map_err(|_| GpioError::LineFailure(line_num))?;
        let handle = line
            .request(LineRequestFlags::INPUT, 0, CONSUMER)
            .map_err(|_| GpioError::LineFailure(line_num))?;
        let value = handle
            .get_value()
            .map_err(|_| GpioError::LineFailure(line_num))?;
        log::debug!("gpio {line_num} read as {value}");
        Ok(value)
    }
}
