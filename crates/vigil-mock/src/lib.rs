//! vigil-mock — a synthetic server for exercising every probe failure path.
//!
//! Implements just enough of an HTTP server to simulate a healthy backend,
//! a backend answering 500s, one that silently stops listening, and one
//! that accepts connections and never responds. Mode changes take effect
//! promptly, interrupting a blocked accept.

use std::fmt;
use std::io;
use std::str::FromStr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Hung sockets retained at once; oldest are dropped beyond this.
const MAX_HELD: usize = 64;

/// Behavior of the mock server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Answer every request with a 200.
    Up,
    /// Answer every request with a 500.
    Error,
    /// Accept connections and never respond.
    Hang,
    /// Stop listening on the port entirely.
    Down,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Up => "up",
            Mode::Error => "error",
            Mode::Hang => "hang",
            Mode::Down => "down",
        };
        f.write_str(s)
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Mode::Up),
            "error" => Ok(Mode::Error),
            "hang" => Ok(Mode::Hang),
            "down" => Ok(Mode::Down),
            other => Err(format!(
                "unknown mode {other:?} (expected up, down, hang, or error)"
            )),
        }
    }
}

/// A mock server bound to one local port.
pub struct MockServer {
    port: u16,
    mode_tx: watch::Sender<Mode>,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl MockServer {
    /// Bind 127.0.0.1 on the given port (0 picks an ephemeral one) and
    /// start serving in [`Mode::Up`].
    pub async fn start(port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let port = listener.local_addr()?.port();
        let (mode_tx, mode_rx) = watch::channel(Mode::Up);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(listener, mode_rx, shutdown_rx));
        Ok(Self {
            port,
            mode_tx,
            shutdown_tx,
            handle,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn mode(&self) -> Mode {
        *self.mode_tx.borrow()
    }

    /// Switch behavior. Interrupts a blocked accept, so the new mode applies
    /// to the next connection.
    pub fn set_mode(&self, mode: Mode) {
        let _ = self.mode_tx.send(mode);
    }

    /// Stop the server and drop the listener.
    pub fn close(self) {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
    }
}

async fn run(
    listener: TcpListener,
    mut mode_rx: watch::Receiver<Mode>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let addr = match listener.local_addr() {
        Ok(a) => a,
        Err(e) => {
            debug!(error = %e, "mock server has no local address");
            return;
        }
    };
    let mut listener = Some(listener);
    // Sockets accepted in Hang mode, held open without a response.
    let mut held: Vec<TcpStream> = Vec::new();

    loop {
        let mode = *mode_rx.borrow_and_update();

        if mode == Mode::Down {
            // Drop the listener so new connections are refused.
            listener = None;
            held.clear();
            tokio::select! {
                _ = mode_rx.changed() => continue,
                _ = shutdown_rx.changed() => break,
            }
        }

        if listener.is_none() {
            match TcpListener::bind(addr).await {
                Ok(l) => listener = Some(l),
                Err(e) => {
                    debug!(%addr, error = %e, "mock server rebind failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    continue;
                }
            }
        }
        let l = listener.as_ref().expect("listener bound above");

        tokio::select! {
            res = l.accept() => match res {
                Ok((stream, _)) => match mode {
                    Mode::Up => {
                        tokio::spawn(respond(stream, "200 OK"));
                    }
                    Mode::Error => {
                        tokio::spawn(respond(stream, "500 Internal Server Error"));
                    }
                    Mode::Hang => {
                        if held.len() >= MAX_HELD {
                            held.remove(0);
                        }
                        held.push(stream);
                    }
                    Mode::Down => drop(stream),
                },
                Err(e) => {
                    debug!(%addr, error = %e, "mock server accept failed");
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
            },
            _ = mode_rx.changed() => {
                // Release any sockets hung under the previous mode.
                held.clear();
            }
            _ = shutdown_rx.changed() => break,
        }
    }
}

/// Read the request head, then write a minimal HTTP/1.1 response and close.
async fn respond(mut stream: TcpStream, status: &'static str) {
    let mut buf = [0u8; 1024];
    let _ = stream.read(&mut buf).await;
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn get(port: u16) -> io::Result<String> {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await?;
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await?;
        let mut out = String::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            out.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
        Ok(out)
    }

    #[tokio::test]
    async fn up_mode_returns_200() {
        let server = MockServer::start(0).await.unwrap();
        let response = get(server.port()).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"), "got {response:?}");
        server.close();
    }

    #[tokio::test]
    async fn error_mode_returns_500() {
        let server = MockServer::start(0).await.unwrap();
        server.set_mode(Mode::Error);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let response = get(server.port()).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 500"), "got {response:?}");
        server.close();
    }

    #[tokio::test]
    async fn down_mode_refuses_connections() {
        let server = MockServer::start(0).await.unwrap();
        server.set_mode(Mode::Down);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(get(server.port()).await.is_err());
        server.close();
    }

    #[tokio::test]
    async fn down_mode_recovers_to_up() {
        let server = MockServer::start(0).await.unwrap();
        server.set_mode(Mode::Down);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(get(server.port()).await.is_err());

        server.set_mode(Mode::Up);
        tokio::time::sleep(Duration::from_millis(100)).await;
        let response = get(server.port()).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"), "got {response:?}");
        server.close();
    }

    #[tokio::test]
    async fn hang_mode_accepts_but_never_responds() {
        let server = MockServer::start(0).await.unwrap();
        server.set_mode(Mode::Hang);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let read = tokio::time::timeout(Duration::from_millis(200), get(server.port())).await;
        assert!(read.is_err(), "expected the read to time out");
        server.close();
    }

    #[test]
    fn mode_round_trips_through_strings() {
        for mode in [Mode::Up, Mode::Down, Mode::Hang, Mode::Error] {
            assert_eq!(mode.to_string().parse::<Mode>().unwrap(), mode);
        }
        assert!("sideways".parse::<Mode>().is_err());
    }
}
