// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wires the server's event hooks to the app glue: connect/disconnect
//! broadcasts, line dispatch, and the restart-on-failure policy from §7.

use std::sync::Arc;
use std::time::Duration;

use pihub_dispatcher::Dispatcher;
use pihub_registry::Keyed;
use pihub_server::{Callbacks, ClientRef, Server};

use crate::app::{AppState, CallCtx};

pub fn build_callbacks(app: Arc<AppState>, dispatcher: Arc<Dispatcher<CallCtx>>) -> Callbacks {
    Callbacks {
        on_client_connect: Box::new(on_client_connect),
        on_data_received: Box::new(move |server, client, bytes| {
            on_data_received(server, client, bytes, &app, &dispatcher);
        }),
        on_client_disconnect: Box::new(|server, client| {
            on_client_disconnect(server, client);
        }),
        on_server_failure: Box::new(on_server_failure),
    }
}

fn on_client_connect(server: &Arc<Server>, client: &ClientRef) {
    log::info!("client {} connected", client.peer_ip());
    let welcome = pihub_proto::info_line(pihub_proto::WELCOME_MSG);
    if server.write(client, welcome.as_bytes()).is_err() {
        log::warn!("failed to send welcome to {}", client.peer_ip());
    }
    let announcement = pihub_proto::connect_broadcast(client.peer_ip());
    let line = pihub_proto::info_line(&announcement);
    if let Err(e) = server.broadcast_except(client.key(), line.as_bytes()) {
        log::warn!("connect broadcast failed: {e}");
    }
}

fn on_data_received(
    server: &Arc<Server>,
    client: &ClientRef,
    bytes: &[u8],
    app: &Arc<AppState>,
    dispatcher: &Arc<Dispatcher<CallCtx>>,
) {
    let Ok(text) = std::str::from_utf8(bytes) else {
        let _ = server.write(client, pihub_proto::err_line("request was not valid utf-8").as_bytes());
        return;
    };
    let line = text.trim_end_matches(['\n', '\r']);

    let ctx = CallCtx {
        app: Arc::clone(app),
        server: Arc::clone(server),
        client: client.clone(),
    };
    if let Err(e) = dispatcher.execute(line, &ctx) {
        log::debug!("dispatch failed for {:?} from {}: {e}", line, client.peer_ip());
        let _ = server.write(client, pihub_proto::err_line(&e.to_string()).as_bytes());
    }
}

fn on_client_disconnect(server: &Arc<Server>, client: &ClientRef) {
    log::info!("client {} disconnected", client.peer_ip());
    let line = pihub_proto::info_line(pihub_proto::DISCONNECT_BROADCAST);
    if let Err(e) = server.broadcast(line.as_bytes()) {
        log::warn!("disconnect broadcast failed: {e}");
    }
}

/// Reference restart policy from §7/§9: stop (the acceptor thread has
/// already exited by the time this runs), sleep, deinit, then re-arm the
/// acceptor on the same listening socket.
fn on_server_failure(server: &Arc<Server>, err: &pihub_server::ServerError) {
    log::error!("server failure: {err}, restarting acceptor");
    std::thread::sleep(Duration::from_secs(1));
    server.deinit();
    server.run();
}
