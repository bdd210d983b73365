//! Device sessions: the register shadow, the detection sequence and the common model.
//!
//! A [`Session`] owns one transport and the shadow of the registers read through it.
//! [`Session::validate`] walks the detection sequence:
//!
//! 1. check the `SunS` signature,
//! 2. read the common model,
//! 3. classify the model id and declared length,
//! 4. check the end marker and fetch the model block plus its extensions.
//!
//! Physical values can only be decoded once this sequence has completed. Any failure leaves
//! the session [`Invalid`](ValidationState::Invalid).

use log::{debug, info, warn};

use crate::{
    codec::{self, RegisterOrder, hex16},
    error::{Error, Result},
    inverter_register::{self, ChainBlock},
    meter_register,
    register::{
        self, COMMON_BLOCK, COMMON_HEADER, COMMON_MODEL_ID, COMMON_MODEL_LENGTHS, END_MARKER_ID,
        END_MARKER_LENGTH, MODEL_HEADER, Point, PointGroup, RegisterAddress, SUNSPEC_ID, SUNSPEC_SIGNATURE,
    },
    shadow::RegisterShadow,
    transport::{MAX_READ, Transport},
    types::{DeviceIdentity, Encoding, Family, ValidationState},
};

/// One device connection and the registers read from it.
pub struct Session<T: Transport> {
    transport: T,
    shadow: RegisterShadow,
    state: ValidationState,
    identity: Option<DeviceIdentity>,
    common_read: bool,
    /// Registers the device map sits behind our addresses from the model header on. One
    /// when the common model declares the padded length 66.
    map_offset: u16,
    /// Optional blocks found after the device model.
    extensions: heapless::Vec<ChainBlock, 2>,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            shadow: RegisterShadow::new(),
            state: ValidationState::Unvalidated,
            identity: None,
            common_read: false,
            map_offset: 0,
            extensions: heapless::Vec::new(),
        }
    }

    pub fn state(&self) -> ValidationState {
        self.state
    }

    /// What detection learnt, once the device is valid.
    pub fn identity(&self) -> Option<DeviceIdentity> {
        match self.state {
            ValidationState::Valid => self.identity,
            _ => None,
        }
    }

    /// Whether an optional block was found and fetched.
    pub fn has_extension(&self, block: ChainBlock) -> bool {
        self.extensions.contains(&block)
    }

    pub fn shadow(&self) -> &RegisterShadow {
        &self.shadow
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Give back the transport, dropping the shadow.
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Release the transport. The session is no longer valid afterwards.
    pub fn disconnect(&mut self) -> Result<()> {
        self.invalidate();
        self.transport.disconnect()
    }

    /// Read `window` into the shadow, split into requests the protocol allows.
    ///
    /// Transport errors are wrapped with the window and `operation`, keeping their severity.
    pub fn fetch(&mut self, operation: &'static str, window: RegisterAddress) -> Result<()> {
        if !self.shadow.covers(window) {
            return Err(Error::OutOfWindow {
                address: window.address,
                count: window.count,
            });
        }
        debug!(
            "{}: reading {} registers at {}",
            operation, window.count, window.address
        );

        let mut buf = [0u16; MAX_READ as usize];
        let mut address = window.address;
        while address < window.end() {
            let mut end = window.end().min(address.saturating_add(MAX_READ));
            // Never let one request straddle the shifted part of the map.
            if self.map_offset != 0 && address < MODEL_HEADER.address {
                end = end.min(MODEL_HEADER.address);
            }
            let count = end - address;
            let device_address = self.device_address_of(address);
            let dest = &mut buf[..count as usize];
            self.transport
                .read_holding_registers(device_address, dest)
                .map_err(|e| Error::register(operation, device_address, count, e))?;
            self.shadow.store(address, dest)?;
            address = end;
        }
        Ok(())
    }

    /// Where `address` of the standard layout sits in this device's map.
    fn device_address_of(&self, address: u16) -> u16 {
        if address >= MODEL_HEADER.address {
            address + self.map_offset
        } else {
            address
        }
    }

    /// Check the `SunS` signature at the start of the map.
    pub fn check_signature(&mut self) -> Result<()> {
        self.fetch("read signature", SUNSPEC_ID)?;
        let [high, low] = self.shadow.words::<2>(SUNSPEC_ID.address)?;
        if [high, low] != SUNSPEC_SIGNATURE {
            return Err(Error::NotSunSpec { high, low });
        }
        Ok(())
    }

    /// Check the signature, then read the common model into the shadow.
    ///
    /// A transport error here is fatal for the whole session.
    pub fn read_common_block(&mut self) -> Result<()> {
        self.common_read = false;
        self.check_signature().map_err(escalate("check signature"))?;
        self.read_common_model()
    }

    fn read_common_model(&mut self) -> Result<()> {
        self.common_read = false;
        self.map_offset = 0;
        self.fetch("read common block", COMMON_BLOCK)
            .map_err(escalate("read common block"))?;
        let [id, length] = self.shadow.words::<2>(COMMON_HEADER.address)?;
        if id != COMMON_MODEL_ID || !COMMON_MODEL_LENGTHS.contains(&length) {
            return Err(Error::CommonModelMismatch { id, length });
        }
        self.map_offset = length - COMMON_MODEL_LENGTHS[0];
        if self.map_offset != 0 {
            debug!(
                "Common model declares length {}, device model shifted by {}",
                length, self.map_offset
            );
        }
        self.common_read = true;
        Ok(())
    }

    fn common_string<const N: usize>(&self, window: RegisterAddress) -> Result<heapless::String<N>> {
        if !self.common_read {
            return Err(Error::CommonNotRead);
        }
        let mut registers = [0u16; 16];
        let registers = &mut registers[..window.count as usize];
        for (offset, register) in registers.iter_mut().enumerate() {
            *register = self.shadow.word(window.address + offset as u16)?;
        }
        codec::string_from_registers(registers)
    }

    pub fn manufacturer(&self) -> Result<heapless::String<32>> {
        self.common_string(register::common::MANUFACTURER)
    }

    pub fn model(&self) -> Result<heapless::String<32>> {
        self.common_string(register::common::MODEL)
    }

    /// Fronius reports the Datamanager firmware version here.
    pub fn options(&self) -> Result<heapless::String<16>> {
        self.common_string(register::common::OPTIONS)
    }

    pub fn version(&self) -> Result<heapless::String<16>> {
        self.common_string(register::common::VERSION)
    }

    pub fn serial_number(&self) -> Result<heapless::String<32>> {
        self.common_string(register::common::SERIAL_NUMBER)
    }

    pub fn device_address(&self) -> Result<u16> {
        if !self.common_read {
            return Err(Error::CommonNotRead);
        }
        self.shadow.word(register::common::DEVICE_ADDRESS.address)
    }

    /// Run the detection sequence for a device of `family`.
    pub fn validate(&mut self, family: Family) -> Result<DeviceIdentity> {
        self.invalidate();
        self.common_read = false;
        match self.run_detection(family) {
            Ok(identity) => {
                self.identity = Some(identity);
                self.transition(ValidationState::Valid);
                info!(
                    "{} model {} validated: {} phase(s), {} encoding, {} {}",
                    family,
                    identity.model_id,
                    identity.phase_count,
                    identity.encoding,
                    self.manufacturer().unwrap_or_default(),
                    self.model().unwrap_or_default(),
                );
                Ok(identity)
            }
            Err(err) => {
                warn!("{} validation failed in state {}: {}", family, self.state, err);
                self.invalidate();
                self.transition(ValidationState::Invalid);
                Err(err)
            }
        }
    }

    fn run_detection(&mut self, family: Family) -> Result<DeviceIdentity> {
        self.check_signature().map_err(escalate("check signature"))?;
        self.transition(ValidationState::SignatureChecked);

        self.read_common_model()?;
        self.transition(ValidationState::CommonRead);

        let identity = self.classify(family)?;
        self.transition(ValidationState::IdClassified);

        self.fetch_blocks(identity)?;
        self.transition(ValidationState::BlockFetched);
        Ok(identity)
    }

    /// Read the model id and declared length and check both against `family`.
    fn classify(&mut self, family: Family) -> Result<DeviceIdentity> {
        self.fetch("read model id", MODEL_HEADER)?;
        let [model_id, length] = self.shadow.words::<2>(MODEL_HEADER.address)?;

        let identity = family.classify(model_id)?;
        family.check_block_length(model_id, length)?;
        if length != family.block_length(identity.encoding) {
            warn!(
                "Model {} implies {} encoding but declares length {}; using {} encoding",
                model_id, identity.encoding, length, identity.encoding
            );
        }
        debug!(
            "Model {} classified: {} phase(s), {} encoding",
            model_id, identity.phase_count, identity.encoding
        );
        Ok(identity)
    }

    /// Check an end marker already fetched at `address`.
    fn check_end_marker(&self, address: u16) -> Result<()> {
        let [id, length] = self.shadow.words::<2>(address)?;
        if (id, length) != (END_MARKER_ID, END_MARKER_LENGTH) {
            return Err(Error::EndOfBlockMismatch {
                address,
                id,
                length,
            });
        }
        debug!("End marker ({}, {}) found at {}", hex16(id), length, address);
        Ok(())
    }

    /// Fetch an optional block and check its header.
    fn fetch_extension(&mut self, block: ChainBlock, encoding: Encoding) -> Result<()> {
        let window = block.block(encoding);
        self.fetch("read extension block", window)?;
        let [id, length] = self.shadow.words::<2>(window.address)?;
        if (id, length) != (block.model_id(), block.length()) {
            return Err(Error::ExtensionMismatch {
                address: window.address,
                expected_id: block.model_id(),
                expected_length: block.length(),
                id,
                length,
            });
        }
        // Capacity covers every optional block.
        let _ = self.extensions.push(block);
        Ok(())
    }

    /// End marker first, then the model block, then any extension blocks.
    fn fetch_blocks(&mut self, identity: DeviceIdentity) -> Result<()> {
        let encoding = identity.encoding;
        self.extensions.clear();

        match identity.family {
            Family::Inverter => {
                let marker = inverter_register::end_marker(encoding);
                self.fetch("read end marker", marker)?;

                // Hybrid inverters put the storage model where the marker would be.
                let header = self.shadow.words::<2>(marker.address)?;
                let storage = ChainBlock::Storage;
                let has_storage = header == [storage.model_id(), storage.length()];
                if has_storage {
                    debug!("Storage block found at {}", marker.address);
                    let marker = RegisterAddress::new(storage.block(encoding).end(), 2);
                    self.fetch("read end marker", marker)?;
                    self.check_end_marker(marker.address)?;
                } else {
                    self.check_end_marker(marker.address)?;
                }

                self.fetch("read model block", inverter_register::model_block(encoding))?;
                self.fetch_extension(ChainBlock::MultipleMppt, encoding)?;
                if has_storage {
                    self.fetch_extension(storage, encoding)?;
                }
            }
            Family::Meter => {
                let marker = meter_register::end_marker(encoding);
                self.fetch("read end marker", marker)?;
                self.check_end_marker(marker.address)?;
                self.fetch("read model block", meter_register::model_block(encoding))?;
            }
        }
        Ok(())
    }

    /// Re-fetch the model block and extensions of a valid device.
    pub fn refresh(&mut self) -> Result<()> {
        let identity = self.require_valid()?;
        if let Err(err) = self.fetch_blocks(identity) {
            warn!("{} refresh failed: {}", identity.family, err);
            self.invalidate();
            self.transition(ValidationState::Invalid);
            return Err(err);
        }
        Ok(())
    }

    /// The identity of a valid device, or [`Error::NotValidated`].
    pub fn require_valid(&self) -> Result<DeviceIdentity> {
        match (self.state, self.identity) {
            (ValidationState::Valid, Some(identity)) => Ok(identity),
            _ => Err(Error::NotValidated),
        }
    }

    /// Decode a physical value of a valid device.
    pub fn decode(&self, point: &Point) -> Result<f64> {
        self.require_valid()?;
        codec::decode(&self.shadow, point)
    }

    /// Decode member `index` of `group` under the detected encoding.
    pub fn group_value(&self, group: &PointGroup, index: u16, what: &'static str) -> Result<f64> {
        let encoding = self.require_valid()?.encoding;
        let point = group
            .point(index, encoding)
            .ok_or(Error::Unsupported(what))?;
        codec::decode(&self.shadow, &point)
    }

    /// Fail with [`Error::Unsupported`] when the device has fewer than `phases` phases.
    pub fn require_phases(&self, phases: u8, what: &'static str) -> Result<()> {
        if self.require_valid()?.phase_count < phases {
            return Err(Error::Unsupported(what));
        }
        Ok(())
    }

    /// Raw register of a valid device.
    pub fn word(&self, address: u16) -> Result<u16> {
        self.require_valid()?;
        self.shadow.word(address)
    }

    /// Unsigned 32-bit value of a valid device, never scaled.
    pub fn word32(&self, address: u16) -> Result<u32> {
        self.require_valid()?;
        let registers = self.shadow.words::<2>(address)?;
        Ok(codec::u32_from_registers(registers, RegisterOrder::BIG_ENDIAN))
    }

    fn transition(&mut self, state: ValidationState) {
        debug!("Validation state {} -> {}", self.state, state);
        self.state = state;
    }

    fn invalidate(&mut self) {
        self.identity = None;
        self.state = ValidationState::Unvalidated;
    }
}

/// Turn any error of a mandatory common model step into a lost session.
fn escalate(operation: &'static str) -> impl Fn(Error) -> Error {
    move |cause| match cause {
        Error::NotSunSpec { .. } | Error::SessionLost { .. } => cause,
        cause => Error::SessionLost {
            operation,
            cause: Box::new(cause),
        },
    }
}

/// A detected device: the capability interface shared by inverters and meters.
pub trait Device {
    type Transport: Transport;

    /// The device class this detector accepts.
    const FAMILY: Family;

    fn session(&self) -> &Session<Self::Transport>;

    fn session_mut(&mut self) -> &mut Session<Self::Transport>;

    /// Run the detection sequence. Required before any value can be read.
    fn validate(&mut self) -> Result<DeviceIdentity> {
        self.session_mut().validate(Self::FAMILY)
    }

    /// Re-read the measurement blocks of a validated device.
    fn refresh(&mut self) -> Result<()> {
        self.session_mut().refresh()
    }

    fn identity(&self) -> Option<DeviceIdentity> {
        self.session().identity()
    }

    fn state(&self) -> ValidationState {
        self.session().state()
    }

    fn read_common_block(&mut self) -> Result<()> {
        self.session_mut().read_common_block()
    }

    fn manufacturer(&self) -> Result<heapless::String<32>> {
        self.session().manufacturer()
    }

    fn model(&self) -> Result<heapless::String<32>> {
        self.session().model()
    }

    fn firmware_version(&self) -> Result<heapless::String<16>> {
        self.session().version()
    }

    fn serial_number(&self) -> Result<heapless::String<32>> {
        self.session().serial_number()
    }

    fn device_address(&self) -> Result<u16> {
        self.session().device_address()
    }
}
