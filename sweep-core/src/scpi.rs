//! # SCPI Signal Generator Module
//!
//! Drives a bench signal generator over a line-oriented SCPI socket
//! (raw TCP, usually port 5025).
//!
//! ## Commands
//! - `*IDN?` identification query
//! - `:LEV <dBm>` output power
//! - `:FREQ <MHz>MHz` carrier frequency
//! - `:OUTP ON` / `:OUTP OFF` RF output
//!
//! Only the identification query reads a reply; set commands are
//! fire-and-forget as the instrument sends nothing back for them.

use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, info};

use crate::device::SignalSource;
use crate::error::InstrumentError;

pub const DEFAULT_SCPI_PORT: u16 = 5025;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// SCPI instrument reached through a writer for commands and a reader for replies.
pub struct ScpiSignalSource<W: Write, R: BufRead> {
    writer: W,
    reader: R,
    timeout: Duration,
}

impl ScpiSignalSource<TcpStream, BufReader<TcpStream>> {
    /// Opens a TCP connection to the instrument.
    ///
    /// # Arguments
    /// * `addr` - `host:port` or `[v6]:port`; a bare host or address gets port 5025
    /// * `timeout` - Connect, read and write timeout
    pub fn connect(addr: &str, timeout: Duration) -> Result<Self, InstrumentError> {
        let addr = socket_target(addr);
        let socket = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| InstrumentError::Protocol(format!("cannot resolve {}", addr)))?;

        let stream =
            TcpStream::connect_timeout(&socket, timeout).map_err(|e| map_io(e, timeout))?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);

        info!("[SIGGEN] Connected to {}", socket);
        Ok(Self::new(stream, reader, timeout))
    }
}

/// Adds the default SCPI port unless `addr` already carries one.
fn socket_target(addr: &str) -> String {
    if let Ok(socket) = addr.parse::<SocketAddr>() {
        return socket.to_string();
    }
    let bare = addr.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return SocketAddr::new(ip, DEFAULT_SCPI_PORT).to_string();
    }
    if addr.matches(':').count() == 1 {
        addr.to_string()
    } else {
        format!("{}:{}", addr, DEFAULT_SCPI_PORT)
    }
}

impl<W: Write, R: BufRead> ScpiSignalSource<W, R> {
    pub fn new(writer: W, reader: R, timeout: Duration) -> Self {
        Self {
            writer,
            reader,
            timeout,
        }
    }

    /// Sends one newline-terminated command.
    pub fn write_command(&mut self, command: &str) -> Result<(), InstrumentError> {
        debug!("[SIGGEN] > {}", command);
        self.writer
            .write_all(command.as_bytes())
            .and_then(|()| self.writer.write_all(b"\n"))
            .and_then(|()| self.writer.flush())
            .map_err(|e| map_io(e, self.timeout))
    }

    /// Sends a query and returns its single-line reply without the terminator.
    pub fn query(&mut self, command: &str) -> Result<String, InstrumentError> {
        self.write_command(command)?;
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .map_err(|e| map_io(e, self.timeout))?;
        if read == 0 {
            return Err(InstrumentError::Protocol(format!(
                "connection closed while waiting for reply to {}",
                command
            )));
        }
        let reply = line.trim_end_matches(['\r', '\n']).to_string();
        debug!("[SIGGEN] < {}", reply);
        Ok(reply)
    }

    pub fn into_parts(self) -> (W, R) {
        (self.writer, self.reader)
    }
}

fn map_io(e: io::Error, timeout: Duration) -> InstrumentError {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => InstrumentError::Timeout(timeout),
        _ => InstrumentError::Io(e),
    }
}

/// Formats a frequency as the instrument expects it, in MHz.
fn frequency_command(freq_hz: f64) -> String {
    format!(":FREQ {}MHz", freq_hz / 1e6)
}

impl<W: Write, R: BufRead> SignalSource for ScpiSignalSource<W, R> {
    fn identify(&mut self) -> Result<String, InstrumentError> {
        let idn = self.query("*IDN?")?;
        if idn.is_empty() {
            return Err(InstrumentError::Protocol("empty *IDN? reply".to_string()));
        }
        Ok(idn)
    }

    fn set_power_level(&mut self, dbm: f64) -> Result<(), InstrumentError> {
        self.write_command(&format!(":LEV {}", dbm))
    }

    fn set_output_frequency(&mut self, freq_hz: f64) -> Result<(), InstrumentError> {
        self.write_command(&frequency_command(freq_hz))
    }

    fn set_output_enabled(&mut self, enabled: bool) -> Result<(), InstrumentError> {
        self.write_command(if enabled { ":OUTP ON" } else { ":OUTP OFF" })
    }
}
