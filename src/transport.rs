//! The Modbus link a device session reads its registers through.
//!
//! [`ModbusClient`] speaks Modbus RTU or Modbus TCP over anything implementing
//! [embedded_io::Read] & [embedded_io::Write]. [`connect`] opens such a link from a
//! [`Config`], over a TCP socket or a serial port.

use std::{
    io,
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use embedded_io::Error as _;
use log::trace;
use rmodbus::ModbusProto;

use crate::{
    config::Config,
    error::{Error, Result},
};

/// Most registers a single read holding registers request may ask for.
pub const MAX_READ: u16 = 125;

/// Blocking "read N registers starting at A" primitive the decode core is built on.
pub trait Transport {
    /// Fill `dest` with the holding registers starting at `address`.
    ///
    /// I/O timeouts and disconnects come back as transient errors, Modbus exceptions for
    /// an illegal function, address or value as fatal ones.
    fn read_holding_registers(&mut self, address: u16, dest: &mut [u16]) -> Result<()>;

    /// Release the link. Later reads fail with [`Error::Disconnected`].
    fn disconnect(&mut self) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read_holding_registers(&mut self, address: u16, dest: &mut [u16]) -> Result<()> {
        (**self).read_holding_registers(address, dest)
    }

    fn disconnect(&mut self) -> Result<()> {
        (**self).disconnect()
    }
}

/// A Modbus client over a byte stream.
///
/// `L` is the size of the frame buffer; the default fits a full 125 register TCP response.
pub struct ModbusClient<S: embedded_io::Read + embedded_io::Write, const L: usize = 260> {
    interface: S,
    unit_id: u8,
    proto: ModbusProto,
    /// Log every frame sent and received.
    debug: bool,
    connected: bool,
}

impl<S: embedded_io::Read + embedded_io::Write, const L: usize> ModbusClient<S, L> {
    /// Create a Modbus RTU client with the given interface and unit ID.
    pub fn rtu(interface: S, unit_id: u8) -> Self {
        Self::new(interface, unit_id, ModbusProto::Rtu)
    }

    /// Create a Modbus TCP client with the given interface and unit ID.
    pub fn tcp(interface: S, unit_id: u8) -> Self {
        Self::new(interface, unit_id, ModbusProto::TcpUdp)
    }

    fn new(interface: S, unit_id: u8, proto: ModbusProto) -> Self {
        Self {
            interface,
            unit_id,
            proto,
            debug: false,
            connected: true,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    /// Give back the underlying interface.
    pub fn into_inner(self) -> S {
        self.interface
    }

    fn is_tcp(&self) -> bool {
        matches!(self.proto, ModbusProto::TcpUdp)
    }

    /// Bytes needed before the total frame length is known.
    fn header_len(&self) -> usize {
        if self.is_tcp() { 6 } else { 3 }
    }

    /// Total frame length implied by a received header, if enough of it has arrived.
    fn frame_len(&self, head: &[u8]) -> Option<usize> {
        if head.len() < self.header_len() {
            return None;
        }
        if self.is_tcp() {
            // MBAP length counts the unit id and everything after it.
            Some(6 + u16::from_be_bytes([head[4], head[5]]) as usize)
        } else if head[1] & 0x80 != 0 {
            // Exception: unit, function, code, CRC.
            Some(5)
        } else {
            // Unit, function, byte count, data, CRC.
            Some(5 + head[2] as usize)
        }
    }

    /// Read one whole response frame into `frame`.
    fn receive(&mut self, frame: &mut heapless::Vec<u8, L>) -> Result<()> {
        let mut temp_buf = [0u8; 32];
        loop {
            let wanted = match self.frame_len(frame) {
                Some(total) if frame.len() >= total => return Ok(()),
                Some(total) => total - frame.len(),
                None => self.header_len() - frame.len(),
            };
            let chunk = wanted.min(temp_buf.len());

            match self.interface.read(&mut temp_buf[..chunk]) {
                Ok(0) => {
                    self.connected = false;
                    return Err(Error::Disconnected);
                }
                Ok(bytes_read) => frame
                    .extend_from_slice(&temp_buf[..bytes_read])
                    .map_err(|_| Error::BufferError)?,
                Err(e) => return Err(Error::from_io_kind(e.kind())),
            }
        }
    }
}

impl<S: embedded_io::Read + embedded_io::Write, const L: usize> Transport for ModbusClient<S, L> {
    fn read_holding_registers(&mut self, address: u16, dest: &mut [u16]) -> Result<()> {
        if !self.connected {
            return Err(Error::Disconnected);
        }
        let count = u16::try_from(dest.len()).map_err(|_| Error::InvalidArgument("count"))?;
        if count == 0 || count > MAX_READ {
            return Err(Error::InvalidArgument("count"));
        }

        let mut buff: heapless::Vec<u8, L> = heapless::Vec::new();
        let mut req = rmodbus::client::ModbusRequest::new(self.unit_id, self.proto);
        req.generate_get_holdings(address, count, &mut buff)?;
        if self.debug {
            trace!("TX {:02X?}", buff.as_slice());
        }

        self.interface
            .write_all(&buff)
            .map_err(|e| Error::from_io_kind(e.kind()))?;
        self.interface
            .flush()
            .map_err(|e| Error::from_io_kind(e.kind()))?;

        // Reuse same buffer when reading back
        buff.clear();
        self.receive(&mut buff)?;
        if self.debug {
            trace!("RX {:02X?}", buff.as_slice());
        }

        let mut parsed_data: heapless::Vec<u16, 128> = heapless::Vec::new();
        req.parse_u16(&buff, &mut parsed_data)?;
        if parsed_data.len() < dest.len() {
            return Err(Error::InvalidResponse);
        }
        dest.copy_from_slice(&parsed_data[..dest.len()]);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        self.interface
            .flush()
            .map_err(|e| Error::from_io_kind(e.kind()))
    }
}

/// I/O error of a [`Link`].
#[derive(Debug)]
pub struct LinkError(io::Error);

impl core::fmt::Display for LinkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for LinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl embedded_io::Error for LinkError {
    fn kind(&self) -> embedded_io::ErrorKind {
        io_kind(&self.0)
    }
}

/// Map a std I/O error onto the embedded-io error kinds.
///
/// A socket read timeout surfaces as `WouldBlock` on unix, so it is reported as a timeout.
pub fn io_kind(err: &io::Error) -> embedded_io::ErrorKind {
    match err.kind() {
        io::ErrorKind::NotFound => embedded_io::ErrorKind::NotFound,
        io::ErrorKind::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
        io::ErrorKind::ConnectionRefused => embedded_io::ErrorKind::ConnectionRefused,
        io::ErrorKind::ConnectionReset => embedded_io::ErrorKind::ConnectionReset,
        io::ErrorKind::ConnectionAborted => embedded_io::ErrorKind::ConnectionAborted,
        io::ErrorKind::NotConnected => embedded_io::ErrorKind::NotConnected,
        io::ErrorKind::AddrInUse => embedded_io::ErrorKind::AddrInUse,
        io::ErrorKind::AddrNotAvailable => embedded_io::ErrorKind::AddrNotAvailable,
        io::ErrorKind::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
        io::ErrorKind::AlreadyExists => embedded_io::ErrorKind::AlreadyExists,
        io::ErrorKind::InvalidInput => embedded_io::ErrorKind::InvalidInput,
        io::ErrorKind::InvalidData => embedded_io::ErrorKind::InvalidData,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => embedded_io::ErrorKind::TimedOut,
        io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
        io::ErrorKind::Unsupported => embedded_io::ErrorKind::Unsupported,
        io::ErrorKind::OutOfMemory => embedded_io::ErrorKind::OutOfMemory,
        _ => embedded_io::ErrorKind::Other,
    }
}

/// An open TCP socket or serial port.
pub enum Link {
    Tcp(TcpStream),
    Serial(Box<dyn serialport::SerialPort>),
}

impl embedded_io::ErrorType for Link {
    type Error = LinkError;
}

impl embedded_io::Read for Link {
    fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, Self::Error> {
        match self {
            Link::Tcp(stream) => io::Read::read(stream, buf),
            Link::Serial(port) => io::Read::read(port, buf),
        }
        .map_err(LinkError)
    }
}

impl embedded_io::Write for Link {
    fn write(&mut self, buf: &[u8]) -> core::result::Result<usize, Self::Error> {
        match self {
            Link::Tcp(stream) => io::Write::write(stream, buf),
            Link::Serial(port) => io::Write::write(port, buf),
        }
        .map_err(LinkError)
    }

    fn flush(&mut self) -> core::result::Result<(), Self::Error> {
        match self {
            Link::Tcp(stream) => io::Write::flush(stream),
            Link::Serial(port) => io::Write::flush(port),
        }
        .map_err(LinkError)
    }
}

fn link_error(err: io::Error) -> Error {
    Error::from_io_kind(io_kind(&err))
}

fn open_tcp(config: &Config, timeout: Duration) -> Result<TcpStream> {
    let port = u16::try_from(config.port).map_err(|_| Error::InvalidArgument("port"))?;
    let mut last_error = Error::InvalidArgument("host");
    for addr in (config.host.as_str(), port)
        .to_socket_addrs()
        .map_err(link_error)?
    {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_read_timeout(Some(timeout)).map_err(link_error)?;
                stream.set_write_timeout(Some(timeout)).map_err(link_error)?;
                stream.set_nodelay(true).map_err(link_error)?;
                return Ok(stream);
            }
            Err(err) => last_error = link_error(err),
        }
    }
    Err(last_error)
}

fn open_serial(config: &Config, timeout: Duration) -> Result<Box<dyn serialport::SerialPort>> {
    serialport::new(config.device.as_str(), config.baud)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(timeout)
        .open()
        .map_err(|err| link_error(err.into()))
}

/// Open the link described by `config`: Modbus TCP to `host:port`, or Modbus RTU on
/// `device` at `baud`, 8-N-1.
pub fn connect(config: &Config) -> Result<ModbusClient<Link>> {
    config.validate()?;
    let timeout = Duration::from_micros(config.timeout().to_micros());

    let client = if config.use_tcp {
        let stream = open_tcp(config, timeout)?;
        ModbusClient::tcp(Link::Tcp(stream), config.slave_id)
    } else {
        let port = open_serial(config, timeout)?;
        ModbusClient::rtu(Link::Serial(port), config.slave_id)
    };
    Ok(client.with_debug(config.debug))
}
