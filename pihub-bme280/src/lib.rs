// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! BME280 combined temperature/pressure/humidity sensor driver.
//!
//! Fixed-point compensation follows the Bosch datasheet's reference integer
//! algorithm bit-for-bit; only the final scaling into engineering units is
//! floating point.

use std::sync::{Arc, Mutex};

use pihub_i2c::I2cBus;

const REG_ID: u8 = 0xD0;
const REG_RESET: u8 = 0xE0;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_CONFIG: u8 = 0xF5;
const REG_CALIB_A_BASE: u8 = 0x88;
const REG_CALIB_B_BASE: u8 = 0xE1;
const REG_PRESS_MSB: u8 = 0xF7;

const CALIB_A_LEN: usize = 26;
const CALIB_B_LEN: usize = 7;
const CHIP_ID: u8 = 0x60;

/// Oversampling x16 for both temperature and pressure, normal mode.
const CTRL_MEAS_OSRS16_NORMAL: u8 = (0b101 << 5) | (0b101 << 2) | 0b11;
/// Standby 20ms (max), filter off, 3-wire SPI disabled.
const CONFIG_STANDBY_MAX_FILTER_OFF: u8 = 0b111 << 5;

#[derive(thiserror::Error, Debug)]
pub enum SensorError {
    #[error("sensor not initialised")]
    NotInitialised,
    #[error("chip id mismatch")]
    InvalidId,
    #[error("i2c transport failure")]
    TransportFailure(#[from] pihub_i2c::TransportError),
}

#[derive(Clone, Copy, Debug, Default)]
struct Trim {
    dig_t1: u16,
    dig_t2: i16,
    dig_t3: i16,
    dig_p1: u16,
    dig_p2: i16,
    dig_p3: i16,
    dig_p4: i16,
    dig_p5: i16,
    dig_p6: i16,
    dig_p7: i16,
    dig_p8: i16,
    dig_p9: i16,
    dig_h1: u8,
    dig_h2: i16,
    dig_h3: u8,
    dig_h4: i16,
    dig_h5: i16,
    dig_h6: i8,
}

impl Trim {
    /// `buf` is the concatenation of section A (26 bytes @ 0x88) followed by
    /// section B (7 bytes @ 0xE1). Indices below are derived from the
    /// register addresses, not guessed from buffer offsets.
    fn parse(buf: &[u8; CALIB_A_LEN + CALIB_B_LEN]) -> Self {
        let d = buf;
        Trim {
            dig_t1: u16::from_le_bytes([d[0], d[1]]),
            dig_t2: i16::from_le_bytes([d[2], d[3]]),
            dig_t3: i16::from_le_bytes([d[4], d[5]]),
            dig_p1: u16::from_le_bytes([d[6], d[7]]),
            dig_p2: i16::from_le_bytes([d[8], d[9]]),
            dig_p3: i16::from_le_bytes([d[10], d[11]]),
            dig_p4: i16::from_le_bytes([d[12], d[13]]),
            dig_p5: i16::from_le_bytes([d[14], d[15]]),
            dig_p6: i16::from_le_bytes([d[16], d[17]]),
            dig_p7: i16::from_le_bytes([d[18], d[19]]),
            dig_p8: i16::from_le_bytes([d[20], d[21]]),
            dig_p9: i16::from_le_bytes([d[22], d[23]]),
            // dig_h1 is register 0xA1, the final byte of section A (d[25]).
            dig_h1: d[25],
            // Section B begins at d[26] (register 0xE1).
            dig_h2: i16::from_le_bytes([d[26], d[27]]),
            dig_h3: d[28],
            dig_h4: ((d[29] as i16) << 4) | ((d[30] & 0x0F) as i16),
            dig_h5: ((d[31] as i16) << 4) | ((d[30] >> 4) as i16),
            dig_h6: d[32] as i8,
        }
    }
}

struct State {
    trim: Trim,
    initialised: bool,
}

/// A single BME280 sensor on an I²C bus.
pub struct Bme280 {
    bus: Arc<I2cBus>,
    addr: u8,
    state: Mutex<State>,
}

impl Bme280 {
    pub fn new(bus: Arc<I2cBus>, addr: u8) -> Self {
        Self {
            bus,
            addr,
            state: Mutex::new(State {
                trim: Trim::default(),
                initialised: false,
            }),
        }
    }

    /// Strict-order init sequence: chip-ID check, measurement config,
    /// settling delay, filter config, trim readout.
    pub fn init(&self) -> Result<(), SensorError> {
        let mut id = [0u8; 1];
        self.bus.read(self.addr, REG_ID, &mut id)?;
        if id[0] != CHIP_ID {
            return Err(SensorError::InvalidId);
        }

        self.bus
            .write(self.addr, REG_CTRL_MEAS, &[CTRL_MEAS_OSRS16_NORMAL])?;
        std::thread::sleep(std::time::Duration::from_millis(10));
        self.bus
            .write(self.addr, REG_CONFIG, &[CONFIG_STANDBY_MAX_FILTER_OFF])?;

        let mut calib = [0u8; CALIB_A_LEN + CALIB_B_LEN];
        self.bus
            .read(self.addr, REG_CALIB_A_BASE, &mut calib[..CALIB_A_LEN])?;
        self.bus
            .read(self.addr, REG_CALIB_B_BASE, &mut calib[CALIB_A_LEN..])?;

        let mut state = self.state.lock().unwrap();
        state.trim = Trim::parse(&calib);
        state.initialised = true;
        log::info!("bme280 0x{:02x} initialised", self.addr);
        Ok(())
    }

    /// Resets the sensor via the soft-reset register. Not part of the init
    /// sequence; exposed for callers that need to recover a wedged sensor.
    pub fn soft_reset(&self) -> Result<(), SensorError> {
        const RESET_CMD: u8 = 0xB6;
        self.bus.write(self.addr, REG_RESET, &[RESET_CMD])?;
        std::thread::sleep(std::time::Duration::from_millis(10));
        Ok(())
    }

    fn read_raw(&self) -> Result<(i32, i32, i32), SensorError> {
        let mut buf = [0u8; 8];
        self.bus.read(self.addr, REG_PRESS_MSB, &mut buf)?;
        let adc_p = ((buf[0] as i32) << 12) | ((buf[1] as i32) << 4) | ((buf[2] as i32) >> 4);
        let adc_t = ((buf[3] as i32) << 12) | ((buf[4] as i32) << 4) | ((buf[5] as i32) >> 4);
        let adc_h = ((buf[6] as i32) << 8) | (buf[7] as i32);
        Ok((adc_t, adc_p, adc_h))
    }

    /// Temperature in degrees Celsius.
    pub fn read_temperature(&self) -> Result<f64, SensorError> {
        let trim = self.trim()?;
        let (adc_t, _, _) = self.read_raw()?;
        let (_, centi_c) = compensate_temperature(&trim, adc_t);
        Ok(centi_c as f64 / 100.0)
    }

    /// Pressure in Pascals.
    pub fn read_pressure(&self) -> Result<f64, SensorError> {
        let trim = self.trim()?;
        let (adc_t, adc_p, _) = self.read_raw()?;
        let (t_fine, _) = compensate_temperature(&trim, adc_t);
        let q24_8 = compensate_pressure(&trim, adc_p, t_fine);
        Ok(q24_8 as f64 / 256.0)
    }

    /// Relative humidity in percent.
    pub fn read_humidity(&self) -> Result<f64, SensorError> {
        let trim = self.trim()?;
        let (adc_t, _, adc_h) = self.read_raw()?;
        let (t_fine, _) = compensate_temperature(&trim, adc_t);
        let q22_10 = compensate_humidity(&trim, adc_h, t_fine);
        Ok(q22_10 as f64 / 1024.0)
    }

    fn trim(&self) -> Result<Trim, SensorError> {
        let state = self.state.lock().unwrap();
        if !state.initialised {
            return Err(SensorError::NotInitialised);
        }
        Ok(state.trim)
    }
}

/// Returns `(t_fine, temperature in centi-degrees Celsius)`.
fn compensate_temperature(trim: &Trim, adc_t: i32) -> (i32, i32) {
    let var1 = (((adc_t >> 3) - ((trim.dig_t1 as i32) << 1)) * (trim.dig_t2 as i32)) >> 11;
    let diff = (adc_t >> 4) - (trim.dig_t1 as i32);
    let var2 = (((diff * diff) >> 12) * (trim.dig_t3 as i32)) >> 14;
    let t_fine = var1 + var2;
    let temp = (t_fine * 5 + 128) >> 8;
    (t_fine, temp)
}

/// Returns pressure as Q24.8 fixed-point Pascals.
fn compensate_pressure(trim: &Trim, adc_p: i32, t_fine: i32) -> u32 {
    let mut var1 = t_fine as i64 - 128000;
    let mut var2 = var1 * var1 * trim.dig_p6 as i64;
    var2 += (var1 * trim.dig_p5 as i64) << 17;
    var2 += (trim.dig_p4 as i64) << 35;
    var1 = ((var1 * var1 * trim.dig_p3 as i64) >> 8) + ((var1 * trim.dig_p2 as i64) << 12);
    var1 = (((1i64 << 47) + var1) * trim.dig_p1 as i64) >> 33;
    if var1 == 0 {
        return 0;
    }
    let mut p = 1048576 - adc_p as i64;
    p = ((p << 31) - var2) * 3125 / var1;
    var1 = (trim.dig_p9 as i64 * (p >> 13) * (p >> 13)) >> 25;
    var2 = (trim.dig_p8 as i64 * p) >> 19;
    p = ((p + var1 + var2) >> 8) + ((trim.dig_p7 as i64) << 4);
    p as u32
}

/// Returns humidity as Q22.10 fixed-point percent relative humidity.
fn compensate_humidity(trim: &Trim, adc_h: i32, t_fine: i32) -> u32 {
    let mut v = t_fine - 76800;
    let a = ((adc_h << 14) - ((trim.dig_h4 as i32) << 20) - ((trim.dig_h5 as i32) * v) + 16384) >> 15;
    let b = ((((((v * trim.dig_h6 as i32) >> 10) * (((v * trim.dig_h3 as i32) >> 11) + 32768)) >> 10)
        + 2097152)
        * trim.dig_h2 as i32
        + 8192)
        >> 14;
    v = a * b;
    v -= ((((v >> 15) * (v >> 15)) >> 7) * trim.dig_h1 as i32) >> 4;
    v = v.clamp(0, 419_430_400);
    (v >> 12) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    // Worked example from the Bosch BME280 datasheet: these trim values and
    // raw ADC words are the datasheet's own reference, yielding 25.08 degC.
    fn datasheet_trim() -> Trim {
        Trim {
            dig_t1: 27504,
            dig_t2: 26435,
            dig_t3: -1000,
            dig_p1: 36477,
            dig_p2: -10685,
            dig_p3: 3024,
            dig_p4: 2855,
            dig_p5: 140,
            dig_p6: -7,
            dig_p7: 15500,
            dig_p8: -14600,
            dig_p9: 6000,
            dig_h1: 75,
            dig_h2: 362,
            dig_h3: 0,
            dig_h4: 277,
            dig_h5: 50,
            dig_h6: 30,
        }
    }

    #[test]
    fn temperature_compensation_matches_datasheet_example() {
        let trim = datasheet_trim();
        let (t_fine, centi_c) = compensate_temperature(&trim, 519888);
        assert_eq!(centi_c, 2508);
        assert!(t_fine > 0);
    }

    #[test]
    fn pressure_compensation_is_positive_and_in_sane_range() {
        let trim = datasheet_trim();
        let (t_fine, _) = compensate_temperature(&trim, 519888);
        let q24_8 = compensate_pressure(&trim, 415148, t_fine);
        let pa = q24_8 as f64 / 256.0;
        assert!((95000.0..=105000.0).contains(&pa), "pa = {pa}");
    }

    #[test]
    fn humidity_compensation_is_clamped_to_valid_range() {
        let trim = datasheet_trim();
        let (t_fine, _) = compensate_temperature(&trim, 519888);
        let q22_10 = compensate_humidity(&trim, 23344, t_fine);
        let pct = q22_10 as f64 / 1024.0;
        assert!((0.0..=100.0).contains(&pct), "pct = {pct}");
    }

    #[test]
    fn trim_parse_derives_humidity_indices_from_register_addresses() {
        let mut buf = [0u8; CALIB_A_LEN + CALIB_B_LEN];
        buf[25] = 75; // dig_H1 @ 0xA1
        buf[26] = 0x6A; // dig_H2 lsb @ 0xE1
        buf[27] = 0x01; // dig_H2 msb @ 0xE2 -> 0x016A = 362
        buf[28] = 0; // dig_H3 @ 0xE3
        let trim = Trim::parse(&buf);
        assert_eq!(trim.dig_h1, 75);
        assert_eq!(trim.dig_h2, 362);
        assert_eq!(trim.dig_h3, 0);
    }
}
