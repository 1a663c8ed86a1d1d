// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The process-wide singletons (§4.6 "App Glue"), constructed once at
//! startup and passed explicitly to every command handler via the
//! dispatcher's `call_ctx` rather than reached through a global.

use std::sync::Arc;

use pihub_bme280::Bme280;
use pihub_gpio::Gpio;
use pihub_i2c::I2cBus;
use pihub_server::{ClientRef, Server};

/// One entry of the build-time sensor inventory (§6 "Sensor inventory").
pub struct SensorConfig {
    pub addr: u8,
    pub kind: &'static str,
}

pub struct AppState {
    pub gpio: Gpio,
    pub sensors: Vec<Bme280>,
    pub sensor_configs: Vec<SensorConfig>,
    pub net_interface: String,
    #[allow(dead_code)]
    pub i2c: Arc<I2cBus>,
}

/// Forwarded to every dispatcher handler: the app singletons plus enough of
/// the server/client pair to write a reply or force a disconnect.
pub struct CallCtx {
    pub app: Arc<AppState>,
    pub server: Arc<Server>,
    pub client: ClientRef,
}
