//! The live-reload side channel.
//!
//! Writers publish a [`ReloadEvent`] for every file whose bytes changed. In
//! watch mode a websocket server forwards the events to connected browsers:
//! stylesheets are swapped in place, anything else reloads the page.

use std::sync::mpsc::{Receiver, Sender, channel};

use camino::Utf8PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadEvent {
    /// Changed path relative to the project root. Empty for a full reload.
    pub path: Utf8PathBuf,
}

impl ReloadEvent {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Asks clients to reload the whole page.
    pub fn full() -> Self {
        Self {
            path: Utf8PathBuf::new(),
        }
    }

    /// Whether clients can swap this file without reloading the page.
    pub fn is_css(&self) -> bool {
        self.path.extension() == Some("css")
    }
}

/// Handle used to publish reload events. Cloning is cheap and publishing never
/// blocks: the channel is unbounded and a missing listener is ignored.
#[derive(Debug, Clone, Default)]
pub struct Reload {
    tx: Option<Sender<ReloadEvent>>,
}

impl Reload {
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn channel() -> (Self, Receiver<ReloadEvent>) {
        let (tx, rx) = channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn publish(&self, event: ReloadEvent) {
        if let Some(tx) = &self.tx
            && tx.send(event).is_err()
        {
            tracing::trace!("reload listener is gone");
        }
    }
}

#[cfg(feature = "live")]
pub(crate) use server::serve;

#[cfg(feature = "live")]
mod server {
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc::Receiver;
    use std::sync::{Arc, Mutex};
    use std::thread::JoinHandle;

    use tungstenite::WebSocket;

    use super::ReloadEvent;

    type Clients = Arc<Mutex<Vec<WebSocket<TcpStream>>>>;

    /// Binds the websocket port and starts forwarding events from `rx`.
    pub(crate) fn serve(port: u16, rx: Receiver<ReloadEvent>) -> std::io::Result<u16> {
        let listener = TcpListener::bind(("127.0.0.1", port))?;
        let port = listener.local_addr()?.port();
        let clients = Clients::default();

        let _incoming = new_thread_ws_incoming(listener, clients.clone());
        let _reload = new_thread_ws_reload(rx, clients);

        Ok(port)
    }

    fn new_thread_ws_incoming(server: TcpListener, clients: Clients) -> JoinHandle<()> {
        std::thread::spawn(move || {
            for stream in server.incoming() {
                let socket = match stream.map(tungstenite::accept) {
                    Ok(Ok(socket)) => socket,
                    Ok(Err(e)) => {
                        tracing::warn!("websocket handshake failed: {e}");
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("incoming connection failed: {e}");
                        continue;
                    }
                };

                match clients.lock() {
                    Ok(mut clients) => clients.push(socket),
                    Err(_) => return,
                }
            }
        })
    }

    fn new_thread_ws_reload(rx: Receiver<ReloadEvent>, clients: Clients) -> JoinHandle<()> {
        std::thread::spawn(move || {
            while let Ok(event) = rx.recv() {
                let message = message(&event);
                let Ok(mut clients) = clients.lock() else {
                    return;
                };

                let mut broken = vec![];

                for (i, socket) in clients.iter_mut().enumerate() {
                    match socket.send(message.as_str().into()) {
                        Ok(_) => {}
                        Err(tungstenite::error::Error::Io(e)) => {
                            if e.kind() == std::io::ErrorKind::BrokenPipe {
                                broken.push(i);
                            }
                        }
                        Err(
                            tungstenite::error::Error::ConnectionClosed
                            | tungstenite::error::Error::AlreadyClosed,
                        ) => broken.push(i),
                        Err(e) => {
                            tracing::error!("Error: {e:?}");
                        }
                    }
                }

                for i in broken.into_iter().rev() {
                    clients.remove(i);
                }
            }
        })
    }

    pub(super) fn message(event: &ReloadEvent) -> String {
        serde_json::json!({
            "command": "reload",
            "path": event.path.as_str(),
            "liveCSS": event.is_css(),
        })
        .to_string()
    }
}
