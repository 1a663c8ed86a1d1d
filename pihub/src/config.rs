// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command-line configuration, with defaults matching the original's
//! `utils/config.h` / `sensors_config.h` macros.

use clap::Parser;

fn parse_addr(s: &str) -> Result<u8, std::num::ParseIntError> {
    match s.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

#[derive(Parser, Debug)]
#[command(name = "pihub", about = "PiHub GPIO/sensor/stats control daemon")]
pub struct Config {
    /// TCP port to listen on.
    #[arg(long, default_value = "65002")]
    pub port: String,

    /// Maximum number of concurrently connected clients.
    #[arg(long, default_value_t = 5)]
    pub max_clients: usize,

    /// Maximum pending connections in the listen backlog.
    #[arg(long, default_value_t = 10)]
    pub max_pending: i32,

    /// `/dev/i2c-<N>` adapter number the sensors are wired to.
    #[arg(long, default_value_t = 1)]
    pub i2c_adapter: u8,

    /// GPIO character device.
    #[arg(long, default_value = "/dev/gpiochip0")]
    pub gpio_chip: String,

    /// Network interface `server net`/`server status` report on.
    #[arg(long, default_value = "wlan0")]
    pub net_interface: String,

    /// I²C slave addresses of the configured BME280 sensors, in `sensor get
    /// <id>` index order. Accepts hex (`0x76`) or decimal.
    #[arg(long, value_delimiter = ',', default_value = "0x76", value_parser = parse_addr)]
    pub sensor_addrs: Vec<u8>,
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}
