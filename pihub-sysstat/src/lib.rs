// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parsers for the handful of `/proc` files the `server status` family of
//! commands reports: uptime, memory, and one network interface's counters.

use std::fs;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum SysstatError {
    #[error("failed to read {0}")]
    Filesystem(String),
    #[error("unexpected format in {0}")]
    ParseFailure(&'static str),
    #[error("interface {0} not found in /proc/net/dev")]
    InterfaceNotFound(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Time {
    pub seconds: u32,
    pub centiseconds: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UptimeInfo {
    pub up: Time,
    pub idle: Time,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct MemInfo {
    pub total_kb: u64,
    pub free_kb: u64,
    pub available_kb: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct NetInfo {
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
}

fn read_to_string(path: &str) -> Result<String, SysstatError> {
    fs::read_to_string(Path::new(path)).map_err(|e| {
        log::error!("failed to read {path}: {e}");
        SysstatError::Filesystem(path.to_string())
    })
}

/// `s.cc up_s.up_cc idle_s.idle_cc` from `/proc/uptime`.
fn parse_time(token: &str) -> Option<Time> {
    let (s, frac) = token.split_once('.')?;
    Some(Time {
        seconds: s.parse().ok()?,
        centiseconds: frac.get(..2).unwrap_or(frac).parse().ok()?,
    })
}

pub fn uptime_info() -> Result<UptimeInfo, SysstatError> {
    uptime_info_from(&read_to_string("/proc/uptime")?)
}

fn uptime_info_from(contents: &str) -> Result<UptimeInfo, SysstatError> {
    let mut tokens = contents.split_whitespace();
    let up = tokens
        .next()
        .and_then(parse_time)
        .ok_or(SysstatError::ParseFailure("/proc/uptime"))?;
    let idle = tokens
        .next()
        .and_then(parse_time)
        .ok_or(SysstatError::ParseFailure("/proc/uptime"))?;
    Ok(UptimeInfo { up, idle })
}

pub fn mem_info() -> Result<MemInfo, SysstatError> {
    mem_info_from(&read_to_string("/proc/meminfo")?)
}

fn mem_info_from(contents: &str) -> Result<MemInfo, SysstatError> {
    let mut info = MemInfo::default();
    let (mut got_total, mut got_free, mut got_available) = (false, false, false);

    for line in contents.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(kb) = rest.split_whitespace().next().and_then(|v| v.parse().ok()) else {
            continue;
        };
        match key {
            "MemTotal" => {
                info.total_kb = kb;
                got_total = true;
            }
            "MemFree" => {
                info.free_kb = kb;
                got_free = true;
            }
            "MemAvailable" => {
                info.available_kb = kb;
                got_available = true;
            }
            _ => {}
        }
    }

    if got_total && got_free && got_available {
        Ok(info)
    } else {
        Err(SysstatError::ParseFailure("/proc/meminfo"))
    }
}

pub fn net_info(interface: &str) -> Result<NetInfo, SysstatError> {
    net_info_from(&read_to_string("/proc/net/dev")?, interface)
}

/// Each data line is `iface: rx_bytes rx_packets rx_errs rx_drop rx_fifo
/// rx_frame rx_compressed rx_multicast tx_bytes tx_packets ...`.
fn net_info_from(contents: &str, interface: &str) -> Result<NetInfo, SysstatError> {
    let prefix = format!("{interface}:");
    let line = contents
        .lines()
        .find_map(|line| line.trim_start().strip_prefix(&prefix))
        .ok_or_else(|| SysstatError::InterfaceNotFound(interface.to_string()))?;

    let fields: Vec<u64> = line
        .split_whitespace()
        .filter_map(|tok| tok.parse().ok())
        .collect();
    if fields.len() < 10 {
        return Err(SysstatError::ParseFailure("/proc/net/dev"));
    }

    Ok(NetInfo {
        rx_bytes: fields[0],
        rx_packets: fields[1],
        tx_bytes: fields[8],
        tx_packets: fields[9],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uptime_with_centisecond_fractions() {
        let info = uptime_info_from("12345.67 8901.23\n").unwrap();
        assert_eq!(info.up, Time { seconds: 12345, centiseconds: 67 });
        assert_eq!(info.idle, Time { seconds: 8901, centiseconds: 23 });
    }

    #[test]
    fn parses_meminfo_fields_regardless_of_order() {
        let contents = "\
MemTotal:       16330000 kB
MemFree:         8123456 kB
Buffers:            1024 kB
MemAvailable:   10000000 kB
";
        let info = mem_info_from(contents).unwrap();
        assert_eq!(info.total_kb, 16330000);
        assert_eq!(info.free_kb, 8123456);
        assert_eq!(info.available_kb, 10000000);
    }

    #[test]
    fn meminfo_missing_a_required_field_is_an_error() {
        let contents = "MemTotal:       16330000 kB\nMemFree:  8123456 kB\n";
        assert!(mem_info_from(contents).is_err());
    }

    #[test]
    fn parses_net_dev_counters_for_the_named_interface() {
        let contents = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  123456     100    0    0    0     0          0         0   123456     100    0    0    0     0       0          0
 wlan0: 9876543     654    0    0    0     0          0         3  1234567      88    0    0    0     0       0          0
";
        let info = net_info_from(contents, "wlan0").unwrap();
        assert_eq!(info.rx_bytes, 9876543);
        assert_eq!(info.rx_packets, 654);
        assert_eq!(info.tx_bytes, 1234567);
        assert_eq!(info.tx_packets, 88);
    }

    #[test]
    fn unknown_interface_is_reported_by_name() {
        let contents = "Inter-|   Receive\n    lo:  1 1 0 0 0 0 0 0 1 1 0 0 0 0 0 0\n";
        let err = net_info_from(contents, "eth9").unwrap_err();
        assert!(matches!(err, SysstatError::InterfaceNotFound(name) if name == "eth9"));
    }
}
