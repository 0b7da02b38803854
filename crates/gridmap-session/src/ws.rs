//! WebSocket [`FeedConnector`].
//!
//! `tungstenite` is blocking, so each connection runs on its own thread and
//! is bridged to async callers through channels.

use std::io;
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use tungstenite::protocol::Message;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Error as WsError, WebSocket};

use crate::error::{Error, Result};
use crate::feed::{FeedConnection, FeedConnector};

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Connects to the backend's event stream.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    poll_interval: Duration,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            poll_interval: Duration::from_millis(10),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Async side of a bridged connection.
pub struct WsConnection {
    outgoing: mpsc::UnboundedSender<String>,
    incoming: mpsc::Receiver<String>,
}

#[async_trait]
impl FeedConnection for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.outgoing.send(text)?;
        Ok(())
    }

    async fn recv_text(&mut self) -> Result<Option<String>> {
        Ok(self.incoming.recv().await)
    }
}

#[async_trait]
impl FeedConnector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn FeedConnection>> {
        let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::channel::<String>(256);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();

        let url = self.url.clone();
        let poll_interval = self.poll_interval;
        thread::Builder::new()
            .name("gridmap-feed".to_string())
            .spawn(move || {
                let socket = match open(&url) {
                    Ok(socket) => socket,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if ready_tx.send(Ok(())).is_err() {
                    return;
                }
                pump(socket, out_rx, in_tx, poll_interval);
            })?;

        ready_rx.await.map_err(|_| Error::ChannelClosed)??;
        debug!(url = %self.url, "websocket open");

        Ok(Box::new(WsConnection {
            outgoing: out_tx,
            incoming: in_rx,
        }))
    }
}

fn open(url: &str) -> Result<Socket> {
    let (socket, _) = tungstenite::connect(url)?;
    match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => stream.set_nonblocking(true)?,
        MaybeTlsStream::Rustls(stream) => stream.sock.set_nonblocking(true)?,
        _ => {
            return Err(Error::Feed(format!(
                "unsupported websocket transport for {url}"
            )))
        }
    }
    Ok(socket)
}

/// Shuttle frames until either side goes away.
fn pump(
    mut socket: Socket,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    incoming: mpsc::Sender<String>,
    poll_interval: Duration,
) {
    loop {
        loop {
            match outgoing.try_recv() {
                Ok(text) => match socket.send(Message::Text(text)) {
                    Ok(()) => {}
                    Err(WsError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(e) => {
                        warn!(error = %e, "websocket send failed");
                        return;
                    }
                },
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    let _ = socket.close(None);
                    let _ = socket.flush();
                    return;
                }
            }
        }

        match socket.read() {
            Ok(Message::Text(text)) => {
                if incoming.blocking_send(text).is_err() {
                    return;
                }
            }
            Ok(Message::Binary(bytes)) => {
                if let Ok(text) = String::from_utf8(bytes) {
                    if incoming.blocking_send(text).is_err() {
                        return;
                    }
                }
            }
            Ok(Message::Close(_)) => return,
            Ok(_) => {}
            Err(WsError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {
                match socket.flush() {
                    Ok(()) => {}
                    Err(WsError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(_) => return,
                }
                thread::sleep(poll_interval);
            }
            Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => return,
            Err(e) => {
                warn!(error = %e, "websocket read failed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_defaults() {
        let connector = WsConnector::new("ws://localhost:8000/api/ws/events");
        assert_eq!(connector.url(), "ws://localhost:8000/api/ws/events");
        assert_eq!(connector.poll_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_secure_url_reaches_tls_handshake() {
        // The peer accepts TCP and hangs up, so the TLS handshake fails
        // after the transport was chosen.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || drop(listener.accept()));

        let err = open(&format!("wss://127.0.0.1:{port}/api/ws/events"))
            .err()
            .unwrap()
            .to_string();
        server.join().unwrap();
        assert!(!err.contains("TLS support not compiled in"), "{err}");
        assert!(!err.contains("unsupported websocket transport"), "{err}");
    }

    #[tokio::test]
    async fn test_connect_refused_is_error() {
        // Port 9 (discard) is closed on test machines.
        let connector = WsConnector::new("ws://127.0.0.1:9/api/ws/events");
        assert!(connector.connect().await.is_err());
    }
}
