// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! PiHub: a single-host control daemon exposing GPIO, I2C-attached BME280
//! sensors, and OS statistics over a line-oriented TCP command protocol.

mod app;
mod callbacks;
mod commands;
mod config;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use app::{AppState, CallCtx, SensorConfig};
use config::Config;
use pihub_bme280::Bme280;
use pihub_dispatcher::Dispatcher;
use pihub_gpio::Gpio;
use pihub_i2c::I2cBus;
use pihub_server::Server;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cfg = Config::parse();
    log::info!("starting pihub on {}", cfg.bind_addr());

    let i2c = Arc::new(I2cBus::open(cfg.i2c_adapter).context("opening i2c bus")?);
    let mut sensors = Vec::with_capacity(cfg.sensor_addrs.len());
    let mut sensor_configs = Vec::with_capacity(cfg.sensor_addrs.len());
    for &addr in &cfg.sensor_addrs {
        let sensor = Bme280::new(Arc::clone(&i2c), addr);
        if let Err(e) = sensor.init() {
            log::warn!("sensor 0x{addr:02x} failed to initialise: {e}");
        }
        sensors.push(sensor);
        sensor_configs.push(SensorConfig { addr, kind: "I2C" });
    }

    let gpio = Gpio::open(&cfg.gpio_chip).context("opening gpio chip")?;

    let app = Arc::new(AppState {
        gpio,
        sensors,
        sensor_configs,
        net_interface: cfg.net_interface.clone(),
        i2c,
    });

    let dispatcher = Arc::new(Dispatcher::<CallCtx>::new());
    commands::register_commands(&dispatcher).context("registering command table")?;

    let callbacks = callbacks::build_callbacks(Arc::clone(&app), Arc::clone(&dispatcher));
    let server = Server::bind(&cfg.bind_addr(), cfg.max_pending, cfg.max_clients, callbacks)
        .context("binding server")?;
    server.run();
    log::info!("pihub listening on {}", cfg.bind_addr());

    loop {
        std::thread::park();
    }
}
