//! We use this mocking module in unit tests to emulate Fronius devices.
//!
//! [`MockSerial`] is a byte stream answering Modbus requests the way a device would, for
//! testing the framing of the real client. [`MockRegisters`] skips the wire entirely and
//! serves register windows straight from a map, for testing detection and decoding.

use std::collections::{BTreeMap, VecDeque};

use crate::{
    error::{Error, Result},
    inverter_register::{self, ChainBlock, mppt},
    meter_register,
    register::{self, COMMON_MODEL_ID, END_MARKER_ID, END_MARKER_LENGTH, MODEL_HEADER},
    transport::Transport,
    types::{Encoding, Family},
};

/// Modbus RTU CRC, transmitted low byte first.
pub fn crc16(frame: &[u8]) -> u16 {
    let mut crc = 0xFFFFu16;
    for &byte in frame {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

#[derive(thiserror::Error, Debug)]
pub enum MockSerialError {
    /// Nothing to read before the timeout.
    #[error("Mock read timed out")]
    Timeout,
    /// Simulated buffer overflow
    #[error("Mock buffer overflow")]
    BufferOverflow,
    /// Generic simulated error for testing
    #[error("Simulated error")]
    SimulatedError,
}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::Timeout => embedded_io::ErrorKind::TimedOut,
            MockSerialError::BufferOverflow => embedded_io::ErrorKind::OutOfMemory,
            MockSerialError::SimulatedError => embedded_io::ErrorKind::Other,
        }
    }
}

/// Our mock Modbus slave, reachable over RTU or TCP framing.
pub struct MockSerial {
    unit_id: u8,
    tcp: bool,
    registers: BTreeMap<u16, u16>,
    /// Bytes of the request currently being written.
    request: heapless::Vec<u8, 64>,
    /// The last complete request, kept for inspection.
    written: heapless::Vec<u8, 64>,
    /// Response waiting to be read.
    response: heapless::Vec<u8, 272>,
    read_position: usize,
    /// Never answer, as if the device were unplugged.
    silent: bool,
    corrupt_crc: bool,
    should_error_on_write: bool,
}

impl embedded_io::ErrorType for MockSerial {
    type Error = MockSerialError;
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> core::result::Result<usize, Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        self.request
            .extend_from_slice(buf)
            .map_err(|_| MockSerialError::BufferOverflow)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> core::result::Result<(), Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        if !self.request.is_empty() {
            self.written = core::mem::take(&mut self.request);
            self.respond();
        }
        Ok(())
    }
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, Self::Error> {
        if self.read_position >= self.response.len() {
            return Err(MockSerialError::Timeout);
        }

        let available_bytes = self.response.len() - self.read_position;
        let bytes_to_read = core::cmp::min(buf.len(), available_bytes);
        buf[..bytes_to_read]
            .copy_from_slice(&self.response[self.read_position..self.read_position + bytes_to_read]);
        self.read_position += bytes_to_read;
        Ok(bytes_to_read)
    }
}

impl MockSerial {
    fn new(unit_id: u8, tcp: bool) -> Self {
        Self {
            unit_id,
            tcp,
            registers: BTreeMap::new(),
            request: heapless::Vec::new(),
            written: heapless::Vec::new(),
            response: heapless::Vec::new(),
            read_position: 0,
            silent: false,
            corrupt_crc: false,
            should_error_on_write: false,
        }
    }

    pub fn rtu(unit_id: u8) -> Self {
        Self::new(unit_id, false)
    }

    pub fn tcp(unit_id: u8) -> Self {
        Self::new(unit_id, true)
    }

    pub fn set_registers(&mut self, address: u16, values: &[u16]) {
        for (offset, value) in values.iter().enumerate() {
            self.registers.insert(address + offset as u16, *value);
        }
    }

    /// Get a reference to the last request written to this mock.
    pub fn written_data(&self) -> &[u8] {
        &self.written
    }

    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    pub fn corrupt_crc(&mut self, corrupt: bool) {
        self.corrupt_crc = corrupt;
    }

    /// Configure whether write operations should fail with an error
    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }

    /// Build the answer to the request in `written`.
    fn respond(&mut self) {
        self.response.clear();
        self.read_position = 0;
        if self.silent {
            return;
        }

        // Strip the MBAP header or CRC down to the PDU.
        let (transaction, pdu) = if self.tcp {
            if self.written.len() < 12 {
                return;
            }
            ([self.written[0], self.written[1]], &self.written[6..])
        } else {
            if self.written.len() < 8 {
                return;
            }
            let body = &self.written[..self.written.len() - 2];
            let crc = u16::from_le_bytes([
                self.written[self.written.len() - 2],
                self.written[self.written.len() - 1],
            ]);
            if crc16(body) != crc {
                return;
            }
            ([0, 0], body)
        };
        if pdu[0] != self.unit_id {
            return;
        }

        let function = pdu[1];
        let address = u16::from_be_bytes([pdu[2], pdu[3]]);
        let count = u16::from_be_bytes([pdu[4], pdu[5]]);

        let mut body: heapless::Vec<u8, 264> = heapless::Vec::new();
        let _ = body.push(self.unit_id);
        let values: Option<Vec<u16>> = (0..count)
            .map(|offset| self.registers.get(&(address + offset)).copied())
            .collect();
        match (function, values) {
            (0x03, Some(values)) if (1..=125).contains(&count) => {
                let _ = body.push(0x03);
                let _ = body.push((count * 2) as u8);
                for value in values {
                    let _ = body.extend_from_slice(&value.to_be_bytes());
                }
            }
            (0x03, _) => {
                // Illegal data address
                let _ = body.extend_from_slice(&[0x83, 0x02]);
            }
            (function, _) => {
                // Illegal function
                let _ = body.extend_from_slice(&[function | 0x80, 0x01]);
            }
        }

        if self.tcp {
            let _ = self.response.extend_from_slice(&transaction);
            let _ = self.response.extend_from_slice(&[0x00, 0x00]);
            let _ = self.response.extend_from_slice(&(body.len() as u16).to_be_bytes());
            let _ = self.response.extend_from_slice(&body);
        } else {
            let mut crc = crc16(&body);
            if self.corrupt_crc {
                crc ^= 0xFFFF;
            }
            let _ = self.response.extend_from_slice(&body);
            let _ = self.response.extend_from_slice(&crc.to_le_bytes());
        }
    }
}

/// A [`Transport`] serving reads straight from a register map.
#[derive(Default)]
pub struct MockRegisters {
    registers: BTreeMap<u16, u16>,
    /// Errors returned by the next reads, in order.
    failures: VecDeque<Error>,
    /// Reads touching this address time out.
    unreachable: Option<u16>,
    /// Every `(address, count)` requested.
    pub reads: Vec<(u16, u16)>,
    pub disconnected: bool,
}

impl MockRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, address: u16, values: &[u16]) -> &mut Self {
        for (offset, value) in values.iter().enumerate() {
            self.registers.insert(address + offset as u16, *value);
        }
        self
    }

    /// Store a float the way SunSpec float maps do: most significant word first.
    pub fn set_f32(&mut self, address: u16, value: f32) -> &mut Self {
        let bits = value.to_bits();
        self.set(address, &[(bits >> 16) as u16, bits as u16])
    }

    pub fn remove(&mut self, address: u16, count: u16) -> &mut Self {
        for offset in 0..count {
            self.registers.remove(&(address + offset));
        }
        self
    }

    /// Move every register at or after `address` up by `by` registers.
    pub fn shift_from(&mut self, address: u16, by: u16) -> &mut Self {
        let moved = self.registers.split_off(&address);
        for (register, value) in moved {
            self.registers.insert(register + by, value);
        }
        self
    }

    /// Make the next read fail with `error`.
    pub fn fail_next(&mut self, error: Error) -> &mut Self {
        self.failures.push_back(error);
        self
    }

    /// Make every read of a window containing `address` time out.
    pub fn unreachable(&mut self, address: Option<u16>) -> &mut Self {
        self.unreachable = address;
        self
    }

    /// Whether a read covering `address` was made.
    pub fn was_read(&self, address: u16) -> bool {
        self.reads
            .iter()
            .any(|&(start, count)| address >= start && address < start + count)
    }
}

impl Transport for MockRegisters {
    fn read_holding_registers(&mut self, address: u16, dest: &mut [u16]) -> Result<()> {
        let count = dest.len() as u16;
        self.reads.push((address, count));
        if self.disconnected {
            return Err(Error::Disconnected);
        }
        if let Some(error) = self.failures.pop_front() {
            return Err(error);
        }
        if let Some(bad) = self.unreachable {
            if bad >= address && bad < address + count {
                return Err(Error::Timeout);
            }
        }
        for (offset, word) in dest.iter_mut().enumerate() {
            *word = self
                .registers
                .get(&(address + offset as u16))
                .copied()
                .ok_or(Error::Modbus(rmodbus::ErrorKind::IllegalDataAddress))?;
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.disconnected = true;
        Ok(())
    }
}

/// Pack ASCII text two characters per register, NUL padded to `count` registers.
pub fn ascii(text: &str, count: u16) -> Vec<u16> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.resize(count as usize * 2, 0);
    bytes
        .chunks(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

/// Signature and common model of a Fronius device.
pub fn common_block(map: &mut MockRegisters, model: &str) {
    use register::common;

    map.set(register::SUNSPEC_ID.address, &register::SUNSPEC_SIGNATURE)
        .set(register::COMMON_HEADER.address, &[COMMON_MODEL_ID, 65])
        .set(common::MANUFACTURER.address, &ascii("Fronius", 16))
        .set(common::MODEL.address, &ascii(model, 16))
        .set(common::OPTIONS.address, &ascii("3.25.2-1", 8))
        .set(common::VERSION.address, &ascii("0.3.9.2", 8))
        .set(common::SERIAL_NUMBER.address, &ascii("31415926", 16))
        .set(common::DEVICE_ADDRESS.address, &[1]);
}

/// Zero-filled model block following its header.
fn model_block(map: &mut MockRegisters, model_id: u16, block: register::RegisterAddress) {
    map.set(MODEL_HEADER.address, &[model_id, block.count]);
    map.set(block.address, &vec![0; block.count as usize]);
}

/// A Fronius inverter reporting `model_id`, with its full model chain.
pub fn inverter(model_id: u16) -> MockRegisters {
    let mut map = MockRegisters::new();
    common_block(&mut map, "Symo 8.2-3-M");
    let encoding = Family::Inverter
        .classify(model_id)
        .map(|identity| identity.encoding)
        .unwrap_or(Encoding::Float);

    model_block(&mut map, model_id, inverter_register::model_block(encoding));
    for block in [
        ChainBlock::Nameplate,
        ChainBlock::BasicSettings,
        ChainBlock::ExtendedMeasurements,
        ChainBlock::ImmediateControls,
        ChainBlock::MultipleMppt,
    ] {
        let window = block.block(encoding);
        let mut words = vec![0u16; window.count as usize];
        words[0] = block.model_id();
        words[1] = block.length();
        map.set(window.address, &words);
    }
    map.set(mppt::module_count(encoding).address, &[mppt::MODULE_COUNT]);
    map.set(
        inverter_register::end_marker(encoding).address,
        &[END_MARKER_ID, END_MARKER_LENGTH],
    );
    map
}

/// A hybrid inverter: storage block in place of the end marker, marker after it.
pub fn hybrid_inverter(model_id: u16) -> MockRegisters {
    let mut map = inverter(model_id);
    let encoding = Family::Inverter
        .classify(model_id)
        .map(|identity| identity.encoding)
        .unwrap_or(Encoding::Float);

    let window = ChainBlock::Storage.block(encoding);
    let mut words = vec![0u16; window.count as usize];
    words[0] = ChainBlock::Storage.model_id();
    words[1] = ChainBlock::Storage.length();
    map.set(window.address, &words);
    map.set(window.end(), &[END_MARKER_ID, END_MARKER_LENGTH]);
    map
}

/// Declare the padded common model length 66: a pad register at the old model header,
/// everything after it one register later.
pub fn padded_common_model(mut map: MockRegisters) -> MockRegisters {
    map.shift_from(MODEL_HEADER.address, 1)
        .set(register::COMMON_HEADER.address + 1, &[66])
        .set(MODEL_HEADER.address, &[0]);
    map
}

/// A Fronius smart meter reporting `model_id`.
pub fn meter(model_id: u16) -> MockRegisters {
    let mut map = MockRegisters::new();
    common_block(&mut map, "Smart Meter 63A");
    let encoding = Family::Meter
        .classify(model_id)
        .map(|identity| identity.encoding)
        .unwrap_or(Encoding::Float);

    model_block(&mut map, model_id, meter_register::model_block(encoding));
    map.set(
        meter_register::end_marker(encoding).address,
        &[END_MARKER_ID, END_MARKER_LENGTH],
    );
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Read, Write};

    #[test]
    fn crc_of_known_frame() {
        // Read holding registers, unit 1, address 0, count 1.
        let frame = [0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(crc16(&frame), 0x0A84);
    }

    #[test]
    fn rtu_slave_answers_requests() {
        let mut mock = MockSerial::rtu(0x01);
        mock.set_registers(0, &[0x1234]);
        let mut request = vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        let crc = crc16(&request);
        request.extend_from_slice(&crc.to_le_bytes());
        mock.write(&request).unwrap();
        mock.flush().unwrap();

        let mut buf = [0u8; 7];
        assert_eq!(mock.read(&mut buf).unwrap(), 7);
        assert_eq!(&buf[..5], &[0x01, 0x03, 0x02, 0x12, 0x34]);
        assert_eq!(crc16(&buf[..5]).to_le_bytes(), [buf[5], buf[6]]);
        assert!(matches!(mock.read(&mut buf), Err(MockSerialError::Timeout)));
    }

    #[test]
    fn other_units_are_ignored() {
        let mut mock = MockSerial::rtu(0x02);
        mock.set_registers(0, &[0x1234]);
        let mut request = vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        let crc = crc16(&request);
        request.extend_from_slice(&crc.to_le_bytes());
        mock.write(&request).unwrap();
        mock.flush().unwrap();
        let mut buf = [0u8; 8];
        assert!(mock.read(&mut buf).is_err());
    }

    #[test]
    fn register_map_fixtures() {
        let mut map = inverter(113);
        let mut dest = [0u16; 2];
        map.read_holding_registers(40313, &mut dest).unwrap();
        assert_eq!(dest, [0xFFFF, 0]);
        map.read_holding_registers(40069, &mut dest).unwrap();
        assert_eq!(dest, [113, 60]);
        assert!(map.was_read(40070));

        let mut map = hybrid_inverter(103);
        map.read_holding_registers(40303, &mut dest).unwrap();
        assert_eq!(dest, [124, 24]);
        map.read_holding_registers(40329, &mut dest).unwrap();
        assert_eq!(dest, [0xFFFF, 0]);

        let mut map = meter(203);
        map.read_holding_registers(40176, &mut dest).unwrap();
        assert_eq!(dest, [0xFFFF, 0]);
    }

    #[test]
    fn padded_fixture_shifts_the_chain() {
        let mut map = padded_common_model(inverter(113));
        let mut dest = [0u16; 3];
        map.read_holding_registers(40069, &mut dest).unwrap();
        assert_eq!(dest, [0, 113, 60]);
        let mut marker = [0u16; 2];
        map.read_holding_registers(40314, &mut marker).unwrap();
        assert_eq!(marker, [0xFFFF, 0]);
    }

    #[test]
    fn serial_errors_describe_themselves() {
        let err = MockSerialError::Timeout;
        assert_eq!(err.to_string(), "Mock read timed out");
        assert_eq!(
            embedded_io::Error::kind(&err),
            embedded_io::ErrorKind::TimedOut
        );
        let err: &dyn core::error::Error = &MockSerialError::SimulatedError;
        assert!(err.source().is_none());
    }

    #[test]
    fn injected_failures() {
        let mut map = meter(213);
        map.fail_next(Error::Timeout);
        let mut dest = [0u16; 2];
        assert!(matches!(
            map.read_holding_registers(40000, &mut dest),
            Err(Error::Timeout)
        ));
        assert!(map.read_holding_registers(40000, &mut dest).is_ok());
        assert!(matches!(
            map.read_holding_registers(50000, &mut dest),
            Err(Error::Modbus(rmodbus::ErrorKind::IllegalDataAddress))
        ));
    }
}
