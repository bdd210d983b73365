//! Fronius inverters: detection of models 101-103 / 111-113 and their measurements.
//!
//! Besides the inverter model itself this covers the Multiple MPPT extension and, on
//! hybrid inverters, the basic storage control block.

use crate::{
    device::{Device, Session},
    error::{Error, Result},
    inverter_register::{
        self as reg, ChainBlock, EVENT_FLAGS, EVENTS, VENDOR_EVENTS, controls::Control, mppt,
        storage,
    },
    register::{PointGroup, RegisterAddress},
    transport::Transport,
    types::{
        ChargeStatus, DcInput, Encoding, Family, InverterEvents, OperatingState, Phase,
        TemperatureSensor, VendorState, Voltage,
    },
};

/// A Fronius inverter (SunSpec models 101-103 / 111-113), reachable through any
/// [`Transport`].
///
/// Measurements are decoded from the registers fetched by the last successful
/// [`validate`](Device::validate) or [`refresh`](Device::refresh). Every getter fails with
/// [`Error::NotValidated`] until then.
pub struct Inverter<T: Transport> {
    session: Session<T>,
}

impl<T: Transport> Device for Inverter<T> {
    type Transport = T;

    const FAMILY: Family = Family::Inverter;

    fn session(&self) -> &Session<T> {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session<T> {
        &mut self.session
    }
}

impl<T: Transport> Inverter<T> {
    pub fn new(transport: T) -> Self {
        Self {
            session: Session::new(transport),
        }
    }

    /// Give back the transport.
    pub fn into_inner(self) -> T {
        self.session.into_inner()
    }

    pub fn disconnect(&mut self) -> Result<()> {
        self.session.disconnect()
    }

    fn encoding(&self) -> Result<Encoding> {
        Ok(self.session.require_valid()?.encoding)
    }

    fn value(&self, group: &PointGroup, index: u16, what: &'static str) -> Result<f64> {
        self.session.group_value(group, index, what)
    }

    /// Return the AC current in amps, total or of one phase.
    pub fn ac_current(&self, phase: Phase) -> Result<f64> {
        self.session.require_phases(phase.required_phases(), "AC phase current")?;
        self.value(&reg::AC_CURRENT, phase.index(), "AC phase current")
    }

    /// Return an AC voltage in volts.
    ///
    /// Inverters report no averages, so [`Voltage::Average`] and [`Voltage::LineAverage`]
    /// are unsupported.
    pub fn ac_voltage(&self, voltage: Voltage) -> Result<f64> {
        const WHAT: &str = "AC voltage";
        self.session.require_phases(voltage.required_phases(), WHAT)?;
        match voltage {
            Voltage::A => self.value(&reg::AC_VOLTAGE_PHASE, 0, WHAT),
            Voltage::B => self.value(&reg::AC_VOLTAGE_PHASE, 1, WHAT),
            Voltage::C => self.value(&reg::AC_VOLTAGE_PHASE, 2, WHAT),
            Voltage::AB => self.value(&reg::AC_VOLTAGE_LINE, 0, WHAT),
            Voltage::BC => self.value(&reg::AC_VOLTAGE_LINE, 1, WHAT),
            Voltage::CA => self.value(&reg::AC_VOLTAGE_LINE, 2, WHAT),
            Voltage::Average | Voltage::LineAverage => Err(Error::Unsupported("average voltage")),
        }
    }

    /// Return the AC output power in watts.
    pub fn ac_power(&self) -> Result<f64> {
        self.value(&reg::AC_POWER, 0, "AC power")
    }

    /// Return the line frequency in hertz.
    pub fn frequency(&self) -> Result<f64> {
        self.value(&reg::FREQUENCY, 0, "frequency")
    }

    pub fn apparent_power(&self) -> Result<f64> {
        self.value(&reg::APPARENT_POWER, 0, "apparent power")
    }

    pub fn reactive_power(&self) -> Result<f64> {
        self.value(&reg::REACTIVE_POWER, 0, "reactive power")
    }

    /// Return the power factor in percent.
    pub fn power_factor(&self) -> Result<f64> {
        self.value(&reg::POWER_FACTOR, 0, "power factor")
    }

    /// Return the lifetime AC energy production in watt-hours.
    pub fn lifetime_energy(&self) -> Result<f64> {
        self.value(&reg::ENERGY, 0, "lifetime energy")
    }

    /// The encoding in use, once `input` is known to be an MPPT input the device reports.
    fn mppt_input(&self, input: u16) -> Result<Encoding> {
        let encoding = self.encoding()?;
        let modules = self.session.word(mppt::module_count(encoding).address)?;
        if input == 0 || input > modules.min(mppt::MODULE_COUNT) {
            return Err(Error::Unsupported("MPPT input"));
        }
        Ok(encoding)
    }

    /// Resolve a field of one MPPT input.
    fn mppt_value(&self, field: mppt::Field, input: u16) -> Result<f64> {
        let encoding = self.mppt_input(input)?;
        let point = mppt::point(field, input, encoding).ok_or(Error::Unsupported("MPPT input"))?;
        self.session.decode(&point)
    }

    /// Return the DC current in amps, of the whole inverter or of one MPPT input.
    pub fn dc_current(&self, input: DcInput) -> Result<f64> {
        match input {
            DcInput::Total => self.value(&reg::DC_CURRENT, 0, "DC current"),
            DcInput::Mppt(n) => self.mppt_value(mppt::Field::Current, n),
        }
    }

    /// Return the DC voltage in volts.
    pub fn dc_voltage(&self, input: DcInput) -> Result<f64> {
        match input {
            DcInput::Total => self.value(&reg::DC_VOLTAGE, 0, "DC voltage"),
            DcInput::Mppt(n) => self.mppt_value(mppt::Field::Voltage, n),
        }
    }

    /// Return the DC power in watts.
    pub fn dc_power(&self, input: DcInput) -> Result<f64> {
        match input {
            DcInput::Total => self.value(&reg::DC_POWER, 0, "DC power"),
            DcInput::Mppt(n) => self.mppt_value(mppt::Field::Power, n),
        }
    }

    /// Return the lifetime energy of one MPPT input in watt-hours.
    pub fn dc_energy(&self, input: u16) -> Result<f64> {
        self.mppt_value(mppt::Field::Energy, input)
    }

    /// Return the module temperature of one MPPT input in degrees Celsius.
    pub fn module_temperature(&self, input: u16) -> Result<f64> {
        self.mppt_value(mppt::Field::Temperature, input)
    }

    /// Return the name of one MPPT input, e.g. `String 1`.
    pub fn mppt_label(&self, input: u16) -> Result<heapless::String<16>> {
        let encoding = self.mppt_input(input)?;
        let window = mppt::module_label(input, encoding);
        let mut registers = [0u16; 8];
        for (offset, register) in registers.iter_mut().enumerate() {
            *register = self.session.word(window.address + offset as u16)?;
        }
        crate::codec::string_from_registers(&registers)
    }

    /// Return a temperature in degrees Celsius.
    pub fn temperature(&self, sensor: TemperatureSensor) -> Result<f64> {
        self.value(&reg::TEMPERATURE, sensor as u16, "temperature")
    }

    /// Return the SunSpec operating state.
    pub fn operating_state(&self) -> Result<OperatingState> {
        let address = reg::operating_state(self.encoding()?).address;
        let value = self.session.word(address)?;
        OperatingState::try_from(value).map_err(|value| Error::UnexpectedValue {
            address,
            value: value as u32,
        })
    }

    /// Return the Fronius operating state.
    pub fn vendor_state(&self) -> Result<VendorState> {
        let address = reg::vendor_state(self.encoding()?).address;
        let value = self.session.word(address)?;
        VendorState::try_from(value).map_err(|value| Error::UnexpectedValue {
            address,
            value: value as u32,
        })
    }

    fn event_word(&self, index: u16) -> Result<u32> {
        let point = EVENTS
            .point(index, self.encoding()?)
            .ok_or(Error::Unsupported("event word"))?;
        self.session.word32(point.window.address)
    }

    /// Return the SunSpec event flags.
    pub fn events(&self) -> Result<InverterEvents> {
        Ok(InverterEvents::from(self.event_word(EVENT_FLAGS)?))
    }

    /// Return the four Fronius vendor event words.
    pub fn vendor_events(&self) -> Result<[u32; 4]> {
        let mut words = [0u32; 4];
        for (index, word) in (VENDOR_EVENTS..).zip(words.iter_mut()) {
            *word = self.event_word(index)?;
        }
        Ok(words)
    }

    /// Whether the device reports a storage block, i.e. is a hybrid inverter with battery.
    pub fn has_storage(&self) -> Result<bool> {
        self.session.require_valid()?;
        Ok(self.session.has_extension(ChainBlock::Storage))
    }

    fn storage_value(&self, point: fn(Encoding) -> crate::register::Point) -> Result<f64> {
        if !self.has_storage()? {
            return Err(Error::Unsupported("storage"));
        }
        self.session.decode(&point(self.encoding()?))
    }

    /// Return the battery state of charge in percent.
    pub fn state_of_charge(&self) -> Result<f64> {
        self.storage_value(storage::state_of_charge)
    }

    /// Return the maximum charge power in watts.
    pub fn max_charge_power(&self) -> Result<f64> {
        self.storage_value(storage::max_charge_power)
    }

    /// Return the minimum reserve in percent of capacity.
    pub fn minimum_reserve(&self) -> Result<f64> {
        self.storage_value(storage::minimum_reserve)
    }

    pub fn charge_status(&self) -> Result<ChargeStatus> {
        if !self.has_storage()? {
            return Err(Error::Unsupported("storage"));
        }
        let address = storage::charge_status(self.encoding()?).window.address;
        let value = self.session.word(address)?;
        ChargeStatus::try_from(value).map_err(|value| Error::UnexpectedValue {
            address,
            value: value as u32,
        })
    }

    /// Where a control point lives in this device's map. Nothing is written by this crate.
    pub fn control_address(&self, control: Control) -> Result<RegisterAddress> {
        Ok(control.address(self.encoding()?))
    }
}
