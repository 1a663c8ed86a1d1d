// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The command table from spec §4.6: one handler per `(target, action)`,
//! registered into fixed slots at startup.

use pihub_dispatcher::{Dispatcher, DispatcherError};
use pihub_registry::Keyed;

use crate::app::CallCtx;

fn reply(ctx: &CallCtx, body: &str) {
    if ctx.server.write(&ctx.client, pihub_proto::info_line(body).as_bytes()).is_err() {
        log::debug!("reply to {} failed, client likely gone", ctx.client.peer_ip());
    }
}

fn reply_err(ctx: &CallCtx, body: &str) {
    if ctx.server.write(&ctx.client, pihub_proto::err_line(body).as_bytes()).is_err() {
        log::debug!("error reply to {} failed, client likely gone", ctx.client.peer_ip());
    }
}

/// Numeric conversion for `gpio set`: a `u8` line number and a state that
/// must be exactly `0` or `1` (§4.6 "Numeric conversion constraints").
fn parse_gpio_set_args(argv: &[&str]) -> Result<(u8, u8), &'static str> {
    let [line, state] = argv else {
        return Err("usage: gpio set <line> <0|1>");
    };
    let line = line.parse::<u8>().map_err(|_| "invalid gpio line number")?;
    let state = state
        .parse::<u8>()
        .ok()
        .filter(|s| *s <= 1)
        .ok_or("incorrect state value (only 0 or 1 is allowed)")?;
    Ok((line, state))
}

fn parse_gpio_get_args(argv: &[&str]) -> Result<u8, &'static str> {
    let [line] = argv else {
        return Err("usage: gpio get <line>");
    };
    line.parse::<u8>().map_err(|_| "invalid gpio line number")
}

fn handle_gpio_set(argv: &[&str], ctx: &CallCtx) {
    let (line, state) = match parse_gpio_set_args(argv) {
        Ok(parsed) => parsed,
        Err(e) => {
            reply_err(ctx, e);
            return;
        }
    };

    match ctx.app.gpio.set(line as u32, state) {
        Ok(()) => reply(ctx, &format!("GPIO line {line} set to {}", if state == 1 { "HIGH" } else { "LOW" })),
        Err(e) => {
            log::error!("gpio set failed: {e}");
            reply_err(ctx, "gpio operation failed");
        }
    }
}

fn handle_gpio_get(argv: &[&str], ctx: &CallCtx) {
    let line = match parse_gpio_get_args(argv) {
        Ok(line) => line,
        Err(e) => {
            reply_err(ctx, e);
            return;
        }
    };

    match ctx.app.gpio.get(line as u32) {
        Ok(value) => reply(ctx, &format!("GPIO line {line} is {}", if value == 1 { "HIGH" } else { "LOW" })),
        Err(e) => {
            log::error!("gpio get failed: {e}");
            reply_err(ctx, "gpio operation failed");
        }
    }
}

fn handle_sensor_list(argv: &[&str], ctx: &CallCtx) {
    if !argv.is_empty() {
        reply_err(ctx, "usage: sensor list");
        return;
    }
    for (id, cfg) in ctx.app.sensor_configs.iter().enumerate() {
        reply(ctx, &format!("sensor #{id}: addr 0x{:02x} ({})", cfg.addr, cfg.kind));
    }
}

fn parse_sensor_get_args<'a>(argv: &[&'a str]) -> Result<(u8, &'a str), &'static str> {
    let [id, kind] = argv else {
        return Err("usage: sensor get <id> <temp|hum|press>");
    };
    let id = id.parse::<u8>().map_err(|_| "invalid sensor id")?;
    Ok((id, kind))
}

fn handle_sensor_get(argv: &[&str], ctx: &CallCtx) {
    let (id, kind) = match parse_sensor_get_args(argv) {
        Ok(parsed) => parsed,
        Err(e) => {
            reply_err(ctx, e);
            return;
        }
    };
    let Some(sensor) = ctx.app.sensors.get(id as usize) else {
        reply_err(ctx, "sensor id out of range");
        return;
    };

    match kind {
        "temp" => match sensor.read_temperature() {
            Ok(c) => reply(ctx, &format!("sensor #{id} returned temp: {c:.2} *C")),
            Err(e) => {
                log::error!("sensor #{id} temp read failed: {e}");
                reply_err(ctx, "sensor read failed");
            }
        },
        "hum" => match sensor.read_humidity() {
            Ok(h) => reply(ctx, &format!("sensor #{id} returned hum: {h:.2} %RH")),
            Err(e) => {
                log::error!("sensor #{id} hum read failed: {e}");
                reply_err(ctx, "sensor read failed");
            }
        },
        "press" => match sensor.read_pressure() {
            Ok(p) => reply(ctx, &format!("sensor #{id} returned press: {p:.2} Pa")),
            Err(e) => {
                log::error!("sensor #{id} press read failed: {e}");
                reply_err(ctx, "sensor read failed");
            }
        },
        _ => reply_err(ctx, "unknown measurement kind (expected temp, hum, or press)"),
    }
}

fn handle_server_status(argv: &[&str], ctx: &CallCtx) {
    if !argv.is_empty() {
        reply_err(ctx, "usage: server status");
        return;
    }
    match pihub_sysstat::uptime_info() {
        Ok(up) => reply(ctx, &format!("uptime: up {}.{:02}s, idle {}.{:02}s", up.up.seconds, up.up.centiseconds, up.idle.seconds, up.idle.centiseconds)),
        Err(e) => {
            log::error!("uptime read failed: {e}");
            reply_err(ctx, "uptime unavailable");
        }
    }
    match pihub_sysstat::mem_info() {
        Ok(mem) => reply(ctx, &format!("memory: total {} kB, free {} kB, available {} kB", mem.total_kb, mem.free_kb, mem.available_kb)),
        Err(e) => {
            log::error!("meminfo read failed: {e}");
            reply_err(ctx, "memory stats unavailable");
        }
    }
    match pihub_sysstat::net_info(&ctx.app.net_interface) {
        Ok(net) => reply(
            ctx,
            &format!(
                "net {}: rx {} bytes ({} pkts), tx {} bytes ({} pkts)",
                ctx.app.net_interface, net.rx_bytes, net.rx_packets, net.tx_bytes, net.tx_packets
            ),
        ),
        Err(e) => {
            log::error!("net stats read failed: {e}");
            reply_err(ctx, "net stats unavailable");
        }
    }
    reply(ctx, &format!("{} client(s) connected", ctx.server.client_count()));
}

fn handle_server_uptime(argv: &[&str], ctx: &CallCtx) {
    if !argv.is_empty() {
        reply_err(ctx, "usage: server uptime");
        return;
    }
    match pihub_sysstat::uptime_info() {
        Ok(up) => reply(ctx, &format!("up {}.{:02}s, idle {}.{:02}s", up.up.seconds, up.up.centiseconds, up.idle.seconds, up.idle.centiseconds)),
        Err(e) => {
            log::error!("uptime read failed: {e}");
            reply_err(ctx, "uptime unavailable");
        }
    }
}

fn handle_server_net(argv: &[&str], ctx: &CallCtx) {
    if !argv.is_empty() {
        reply_err(ctx, "usage: server net");
        return;
    }
    match pihub_sysstat::net_info(&ctx.app.net_interface) {
        Ok(net) => reply(
            ctx,
            &format!(
                "{}: rx {} bytes ({} pkts), tx {} bytes ({} pkts)",
                ctx.app.net_interface, net.rx_bytes, net.rx_packets, net.tx_bytes, net.tx_packets
            ),
        ),
        Err(e) => {
            log::error!("net stats read failed: {e}");
            reply_err(ctx, "net stats unavailable");
        }
    }
}

/// §4.5 only invokes `on_client_disconnect` for a genuine self-disconnect,
/// so this handler broadcasts the departure itself before forcing the
/// client's own teardown (see DESIGN.md for the S5-vs-§4.5 resolution).
fn handle_server_disconnect(argv: &[&str], ctx: &CallCtx) {
    if !argv.is_empty() {
        reply_err(ctx, "usage: server disconnect");
        return;
    }
    reply(ctx, "disconnecting from the server...");
    let departure = pihub_proto::info_line(pihub_proto::DISCONNECT_BROADCAST);
    if let Err(e) = ctx.server.broadcast_except(ctx.client.key(), departure.as_bytes()) {
        log::warn!("disconnect broadcast failed: {e}");
    }
    ctx.server.disconnect(&ctx.client);
}

fn handle_server_help(argv: &[&str], ctx: &CallCtx) {
    if !argv.is_empty() {
        reply_err(ctx, "usage: server help");
        return;
    }
    for line in pihub_proto::HELP_TEXT {
        reply(ctx, line);
    }
}

pub fn register_commands(dispatcher: &Dispatcher<CallCtx>) -> Result<(), DispatcherError> {
    dispatcher.register(0, "gpio", "set", handle_gpio_set)?;
    dispatcher.register(1, "gpio", "get", handle_gpio_get)?;
    dispatcher.register(2, "sensor", "list", handle_sensor_list)?;
    dispatcher.register(3, "sensor", "get", handle_sensor_get)?;
    dispatcher.register(4, "server", "status", handle_server_status)?;
    dispatcher.register(5, "server", "uptime", handle_server_uptime)?;
    dispatcher.register(6, "server", "net", handle_server_net)?;
    dispatcher.register(7, "server", "disconnect", handle_server_disconnect)?;
    dispatcher.register(8, "server", "help", handle_server_help)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Scenario S2: `gpio set 13 1` parses cleanly.
    #[test]
    fn gpio_set_accepts_line_and_binary_state() {
        assert_eq!(parse_gpio_set_args(&["13", "1"]), Ok((13, 1)));
    }

    // Scenario S3: `GPIO SeT 13 2` — state out of {0,1} is rejected with the
    // exact wording the scenario names, independent of dispatcher case-folding.
    #[test]
    fn gpio_set_rejects_state_outside_zero_or_one() {
        assert_eq!(
            parse_gpio_set_args(&["13", "2"]),
            Err("incorrect state value (only 0 or 1 is allowed)")
        );
    }

    #[test]
    fn gpio_set_rejects_non_numeric_line() {
        assert_eq!(parse_gpio_set_args(&["nope", "1"]), Err("invalid gpio line number"));
    }

    #[test]
    fn gpio_set_rejects_wrong_argument_count() {
        assert!(parse_gpio_set_args(&["13"]).is_err());
        assert!(parse_gpio_set_args(&["13", "1", "1"]).is_err());
    }

    #[test]
    fn gpio_get_accepts_a_bare_line_number() {
        assert_eq!(parse_gpio_get_args(&["13"]), Ok(13));
    }

    #[test]
    fn gpio_get_rejects_a_line_number_above_u8_range() {
        assert_eq!(parse_gpio_get_args(&["999"]), Err("invalid gpio line number"));
    }

    // Scenario S4: `sensor get 0 temp`.
    #[test]
    fn sensor_get_parses_id_and_measurement_kind() {
        assert_eq!(parse_sensor_get_args(&["0", "temp"]), Ok((0, "temp")));
    }

    #[test]
    fn sensor_get_rejects_a_non_numeric_id() {
        assert_eq!(parse_sensor_get_args(&["x", "temp"]), Err("invalid sensor id"));
    }

    #[test]
    fn sensor_get_rejects_wrong_argument_count() {
        assert!(parse_sensor_get_args(&["0"]).is_err());
    }
}
