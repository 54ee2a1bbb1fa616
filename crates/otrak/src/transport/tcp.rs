// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 otrak contributors

//! TCP connection to a network-attached tracking device.
//!
//! The device listens on port 8765. Reads use a short timeout so the frame
//! reader can poll without blocking the session forever; connects use a
//! separate, longer timeout profile.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use super::Connection;
use crate::error::{Error, Result};
use crate::protocol::constants::DEFAULT_TCP_PORT;

/// Default per-read timeout. Mid-frame timeouts are retried by the frame
/// reader, so this only bounds how often blocked readers wake up.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(250);

/// Default connect timeout per attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP transport for a tracking device.
pub struct TcpConnection {
    host: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpConnection {
    /// Create an unconnected transport for `host` on the default port.
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_port(host, DEFAULT_TCP_PORT)
    }

    /// Create an unconnected transport for `host:port`.
    pub fn with_port(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            stream: None,
        }
    }

    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.connect_timeout = timeout;
    }

    fn resolve(&self) -> Result<SocketAddr> {
        let mut addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(Error::Io)?;
        addrs
            .next()
            .ok_or_else(|| Error::MalformedReply(format!("no address for host {}", self.host)))
    }
}

impl Connection for TcpConnection {
    fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let addr = self.resolve()?;
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.connect_timeout(&addr.into(), self.connect_timeout)?;
        socket.set_nodelay(true)?;
        socket.set_read_timeout(Some(self.read_timeout))?;

        log::info!("[tcp] connected to {}", addr);
        self.stream = Some(socket.into());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::InvalidState("device is not connected".into()))?;
        stream
            .write_all(data)
            .map_err(|e| Error::SendFailed(e.to_string()))
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::InvalidState("device is not connected".into()))?;
        match stream.read(buf) {
            Ok(n) => Ok(n),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Ok(0)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            log::info!("[tcp] closed connection to {}:{}", self.host, self.port);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recv_before_connect_is_use_error() {
        let mut conn = TcpConnection::new("192.0.2.1");
        let mut buf = [0u8; 4];
        assert!(matches!(
            conn.recv(&mut buf),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_describe_includes_port() {
        let conn = TcpConnection::with_port("tracker.local", 9000);
        assert_eq!(conn.describe(), "tracker.local:9000");
    }

    #[test]
    fn test_loopback_roundtrip() {
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let server = std::thread::spawn(move || {
            let (mut peer, _) = listener.accept().expect("accept");
            let mut buf = [0u8; 5];
            peer.read_exact(&mut buf).expect("read");
            peer.write_all(&buf).expect("echo");
        });

        let mut conn = TcpConnection::with_port(addr.ip().to_string(), addr.port());
        conn.connect().expect("connect");
        assert!(conn.is_connected());
        conn.send(b"VER 4").expect("send");

        let mut buf = [0u8; 5];
        let mut got = 0;
        while got < 5 {
            got += conn.recv(&mut buf[got..]).expect("recv");
        }
        assert_eq!(&buf, b"VER 4");

        conn.close().expect("close");
        assert!(!conn.is_connected());
        server.join().expect("server thread");
    }
}
