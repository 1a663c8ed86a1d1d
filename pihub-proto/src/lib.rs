// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire protocol constants and framing helpers shared between the TCP
//! server core and the app glue that builds its replies.
//!
//! Request lines are `<target><SP><action>[<SP><arg>]*<LF>`; replies are one
//! or more `\n`-terminated lines prefixed with [`INFO_PREFIX`] or
//! [`ERR_PREFIX`].

/// Maximum length of one request line, including the trailing `\n`. Also the
/// size of the server's per-client receive buffer.
pub const MAX_LINE_LEN: usize = 128;

/// Maximum length of a single reply line.
pub const MAX_REPLY_LEN: usize = 2048;

/// Prefix for an informational reply line.
pub const INFO_PREFIX: &str = "> ";

/// Prefix for an error reply line.
pub const ERR_PREFIX: &str = "> err: ";

/// Sent once to a new connection before any request is processed.
pub const WELCOME_MSG: &str =
    "Welcome to PiHub — type `server help` for available commands.";

/// Broadcast to every other connected peer when a client departs.
pub const DISCONNECT_BROADCAST: &str =
    "one of the clients disconnected from the server";

/// Format an informational reply line (prefixed, newline-terminated).
pub fn info_line(body: &str) -> String {
    format!("{INFO_PREFIX}{body}\n")
}

/// Format an error reply line (prefixed, newline-terminated).
pub fn err_line(body: &str) -> String {
    format!("{ERR_PREFIX}{body}\n")
}

/// Broadcast line announcing a newly connected peer's address.
pub fn connect_broadcast(peer_ip: &str) -> String {
    format!("{peer_ip} connected to the server")
}

/// The `server help` manual, one info line per entry.
pub const HELP_TEXT: &[&str] = &[
    "PIHUB(1)                      User Commands                     PIHUB(1)",
    "",
    "NAME",
    "    pihub - Smart Home Control Hub command interface",
    "",
    "SYNOPSIS",
    "    <target> <action> [parameters]",
    "",
    "DESCRIPTION",
    "    A structured, Unix-style TCP command interface to control GPIOs,",
    "    read sensors, and query Raspberry Pi system status.",
    "",
    "COMMANDS",
    "  GPIO Commands:",
    "    gpio set <line> <0|1>          Set GPIO line state",
    "    gpio get <line>                Get GPIO line state",
    "",
    "  Sensor Commands:",
    "    sensor list                    List configured sensors",
    "    sensor get <id> temp           Get temperature in *C",
    "    sensor get <id> hum            Get relative humidity in %RH",
    "    sensor get <id> press          Get pressure in Pa",
    "",
    "  Server Commands:",
    "    server help                    Display this manual",
    "    server status                  Show memory/net/uptime/client summary",
    "    server uptime                  Show server uptime",
    "    server net                     Show network interface statistics",
    "    server disconnect              Disconnect this client",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_and_err_lines_are_prefixed_and_newline_terminated() {
        assert_eq!(info_line("hello"), "> hello\n");
        assert_eq!(err_line("bad arg"), "> err: bad arg\n");
    }

    #[test]
    fn connect_broadcast_embeds_the_peer_ip() {
        assert_eq!(
            connect_broadcast("10.0.0.5"),
            "10.0.0.5 connected to the server"
        );
    }
}
