// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The concurrent TCP command server: one acceptor thread, one worker
//! thread per connected client, and a registry tying the two together.
//!
//! There is no cooperative scheduler here — every suspension point is a
//! real blocking syscall on its own OS thread. Cancellation has no
//! dedicated signalling primitive; a client's own socket is shut down to
//! unblock its worker's blocking `read`, and the listening socket is woken
//! by a loopback self-connect to unblock the acceptor's blocking `accept`.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use pihub_registry::{Keyed, Registry};
use socket2::{Domain, Protocol, Socket, Type};

#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("invalid bind address")]
    InvalidAddress,
    #[error("failed to bind listening socket: {0}")]
    BindFailed(std::io::Error),
    #[error("accept() failed: {0}")]
    AcceptFailed(std::io::Error),
    #[error("client disconnected")]
    ClientDisconnected,
}

/// A single connected client. Reads happen only on the worker thread that
/// owns this client, so they need no lock; writes go through `write_stream`
/// because both handlers and broadcasts may write concurrently.
pub struct ClientHandle {
    fd: RawFd,
    peer_ip: String,
    write_stream: Mutex<TcpStream>,
    /// Set by `disconnect`/`shutdown` before the socket is shut down, so the
    /// worker's teardown can tell a forced disconnect from the peer closing
    /// on its own.
    forced: AtomicBool,
}

impl ClientHandle {
    pub fn peer_ip(&self) -> &str {
        &self.peer_ip
    }
}

/// Cheaply-cloned handle to a registered client, the registry's element
/// type. A thin newtype over `Arc<ClientHandle>` so it can implement
/// [`Keyed`] locally.
#[derive(Clone)]
pub struct ClientRef(Arc<ClientHandle>);

impl std::ops::Deref for ClientRef {
    type Target = ClientHandle;
    fn deref(&self) -> &ClientHandle {
        &self.0
    }
}

impl Keyed for ClientRef {
    type Key = RawFd;
    fn key(&self) -> RawFd {
        self.0.fd
    }
}

type ClientHook = Box<dyn Fn(&Arc<Server>, &ClientRef) + Send + Sync>;
type DataHook = Box<dyn Fn(&Arc<Server>, &ClientRef, &[u8]) + Send + Sync>;
type FailureHook = Box<dyn Fn(&Arc<Server>, &ServerError) + Send + Sync>;

/// Event hooks the app glue wires up; invoked from whichever thread
/// observes the event (acceptor for connect, worker for data/disconnect,
/// acceptor for server failure).
pub struct Callbacks {
    pub on_client_connect: ClientHook,
    pub on_data_received: DataHook,
    pub on_client_disconnect: ClientHook,
    pub on_server_failure: FailureHook,
}

pub struct Server {
    listener: TcpListener,
    registry: Registry<ClientRef>,
    max_clients: usize,
    shutting_down: AtomicBool,
    shutdown_lock: Mutex<()>,
    callbacks: Callbacks,
}

impl Server {
    /// Binds and arms the listening socket for `max_pending` pending
    /// connections. Does not yet accept anything — call [`Server::run`].
    pub fn bind(
        addr: &str,
        max_pending: i32,
        max_clients: usize,
        callbacks: Callbacks,
    ) -> Result<Arc<Self>, ServerError> {
        let sock_addr: SocketAddr = addr.parse().map_err(|_| ServerError::InvalidAddress)?;
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(ServerError::BindFailed)?;
        socket.set_reuse_address(true).map_err(ServerError::BindFailed)?;
        socket.bind(&sock_addr.into()).map_err(ServerError::BindFailed)?;
        socket.listen(max_pending).map_err(ServerError::BindFailed)?;
        let listener: TcpListener = socket.into();

        Ok(Arc::new(Server {
            listener,
            registry: Registry::new(),
            max_clients,
            shutting_down: AtomicBool::new(false),
            shutdown_lock: Mutex::new(()),
            callbacks,
        }))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawns the detached, long-lived acceptor task.
    pub fn run(self: &Arc<Self>) {
        let server = Arc::clone(self);
        thread::spawn(move || server.accept_loop());
    }

    fn accept_loop(self: Arc<Self>) {
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    if self.shutting_down.load(Ordering::SeqCst) {
                        drop(stream);
                        break;
                    }
                    if self.registry.len() >= self.max_clients {
                        log::info!("rejecting connection: at max_clients ({})", self.max_clients);
                        drop(stream);
                        continue;
                    }
                    self.spawn_client(stream);
                }
                Err(e) => {
                    log::error!("accept() failed: {e}");
                    (self.callbacks.on_server_failure)(&self, &ServerError::AcceptFailed(e));
                    break;
                }
            }
        }
        log::info!("acceptor exiting");
    }

    fn spawn_client(self: &Arc<Self>, stream: TcpStream) {
        let fd = stream.as_raw_fd();
        let peer_ip = stream
            .peer_addr()
            .map(|a| a.ip().to_string())
            .unwrap_or_default();
        let read_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(e) => {
                log::error!("failed to clone client stream: {e}");
                return;
            }
        };

        let handle = ClientRef(Arc::new(ClientHandle {
            fd,
            peer_ip,
            write_stream: Mutex::new(stream),
            forced: AtomicBool::new(false),
        }));
        self.registry.push(handle.clone());

        let server = Arc::clone(self);
        let worker_handle = handle.clone();
        thread::spawn(move || server.client_worker(worker_handle, read_stream));

        (self.callbacks.on_client_connect)(self, &handle);
    }

    fn client_worker(self: Arc<Self>, handle: ClientRef, mut read_stream: TcpStream) {
        let mut buf = [0u8; pihub_proto::MAX_LINE_LEN];
        loop {
            match read_stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => (self.callbacks.on_data_received)(&self, &handle, &buf[..n]),
                Err(e) => {
                    log::debug!("client {} read error: {e}", handle.fd);
                    break;
                }
            }
        }

        let forced = handle.forced.load(Ordering::SeqCst);
        let _ = handle.write_stream.lock().unwrap().shutdown(Shutdown::Both);
        self.registry.remove(&handle.fd);

        if !forced {
            (self.callbacks.on_client_disconnect)(&self, &handle);
        }
        log::debug!("client {} worker exiting (forced={forced})", handle.fd);
    }

    /// Sends all of `bytes`, looping on partial writes, serialised against
    /// any other writer of this client.
    pub fn write(&self, client: &ClientRef, bytes: &[u8]) -> Result<(), ServerError> {
        let mut stream = client.write_stream.lock().unwrap();
        stream
            .write_all(bytes)
            .map_err(|_| ServerError::ClientDisconnected)
    }

    /// Writes to every registered client; stops at the first per-client
    /// write failure rather than continuing best-effort (see DESIGN.md).
    pub fn broadcast(&self, bytes: &[u8]) -> Result<(), ServerError> {
        self.registry.iterate(|c| self.write(c, bytes))
    }

    /// Like [`Server::broadcast`] but skips one client — used for the
    /// connect notification, which should not echo back to the client that
    /// just joined.
    pub fn broadcast_except(&self, except: RawFd, bytes: &[u8]) -> Result<(), ServerError> {
        self.registry.iterate(|c| {
            if c.fd == except {
                return Ok(());
            }
            self.write(c, bytes)
        })
    }

    /// Forces one client's worker into its teardown path without invoking
    /// `on_client_disconnect` (the caller is responsible for any
    /// notification it wants sent, e.g. the `server disconnect` command's
    /// own broadcast).
    pub fn disconnect(&self, client: &ClientRef) {
        client.forced.store(true, Ordering::SeqCst);
        let _ = client.write_stream.lock().unwrap().shutdown(Shutdown::Both);
    }

    /// Disconnects every client and wakes the acceptor so it exits.
    pub fn shutdown(&self) {
        let _guard = self.shutdown_lock.lock().unwrap();
        self.shutting_down.store(true, Ordering::SeqCst);
        let _ = self.registry.iterate::<()>(|c| {
            self.disconnect(c);
            Ok(())
        });
        if let Ok(addr) = self.listener.local_addr() {
            let _ = TcpStream::connect(addr);
        }
    }

    /// Must only be called after `shutdown`; warns if clients are still
    /// registered (their workers have not yet finished tearing down).
    pub fn deinit(&self) {
        if !self.registry.is_empty() {
            log::warn!(
                "deinit called with {} client(s) still registered",
                self.registry.len()
            );
        }
    }

    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    pub fn clients(&self) -> Vec<ClientRef> {
        self.registry.snapshot()
    }
}
