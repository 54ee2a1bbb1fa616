// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 otrak contributors

//! Serial connection to a tracking device.
//!
//! Devices reset to 9600 baud 8N1 with hardware flow control. Opening the
//! port asserts a line break to hard-reset the device, then drains the reset
//! banner so the first command starts from a clean stream.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use super::Connection;
use crate::error::{Error, Result};
use crate::protocol::constants::DEFAULT_BAUD;

/// Read timeout for the underlying port. Kept short so `recv` behaves as
/// poll-with-timeout; retry policy lives in the frame reader.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Duration of the hardware break asserted on connect and reset.
const BREAK_DURATION: Duration = Duration::from_millis(250);

/// Serial transport for a tracking device.
pub struct SerialConnection {
    path: String,
    baud_rate: u32,
    /// When set, a hardware break is asserted on connect and the reset
    /// banner is drained before the connection is handed to the session.
    reset_on_connect: bool,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialConnection {
    /// Create an unconnected transport for the given port path
    /// (e.g. `/dev/ttyUSB0` or `COM7`) at the device's reset baud rate.
    pub fn new(path: impl Into<String>) -> Self {
        Self::with_baud(path, DEFAULT_BAUD)
    }

    pub fn with_baud(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            reset_on_connect: true,
            port: None,
        }
    }

    pub fn set_reset_on_connect(&mut self, reset: bool) {
        self.reset_on_connect = reset;
    }

    /// Read and discard whatever the device sends after a reset, until the
    /// line goes quiet.
    fn drain_reset_banner(&mut self) -> Result<()> {
        let mut scratch = [0u8; 64];
        loop {
            match self.recv(&mut scratch)? {
                0 => return Ok(()),
                n => log::debug!("[serial] drained {} reset banner bytes", n),
            }
        }
    }
}

impl Connection for SerialConnection {
    fn connect(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }

        let port = serialport::new(&self.path, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::Hardware)
            .timeout(READ_TIMEOUT)
            .open()?;

        log::info!("[serial] opened {} at {} baud", self.path, self.baud_rate);
        self.port = Some(port);

        if self.reset_on_connect {
            self.send_break()?;
            self.drain_reset_banner()?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| Error::InvalidState("device is not connected".into()))?;
        port.write_all(data)
            .map_err(|e| Error::SendFailed(e.to_string()))?;
        port.flush().map_err(Error::Io)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| Error::InvalidState("device is not connected".into()))?;
        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Ok(0)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            log::info!("[serial] closed {}", self.path);
        }
        Ok(())
    }

    fn send_break(&mut self) -> Result<()> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| Error::InvalidState("device is not connected".into()))?;
        port.set_break()?;
        std::thread::sleep(BREAK_DURATION);
        port.clear_break()?;
        log::debug!("[serial] sent hardware break on {}", self.path);
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.clone()
    }
}
