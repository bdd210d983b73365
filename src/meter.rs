//! Fronius smart meters, SunSpec models 201-203 / 211-213.

use crate::{
    device::{Device, Session},
    error::{Error, Result},
    meter_register as reg,
    register::PointGroup,
    transport::Transport,
    types::{Family, Phase, Quadrant, Voltage},
};

/// A Fronius smart meter (SunSpec models 201-203 / 211-213), reachable through any
/// [`Transport`].
///
/// Every quantity is available as a total (or average) and per phase. Phases beyond the
/// meter's phase count are unsupported.
pub struct Meter<T: Transport> {
    session: Session<T>,
}

impl<T: Transport> Device for Meter<T> {
    type Transport = T;

    const FAMILY: Family = Family::Meter;

    fn session(&self) -> &Session<T> {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session<T> {
        &mut self.session
    }
}

impl<T: Transport> Meter<T> {
    pub fn new(transport: T) -> Self {
        Self {
            session: Session::new(transport),
        }
    }

    pub fn into_inner(self) -> T {
        self.session.into_inner()
    }

    pub fn disconnect(&mut self) -> Result<()> {
        self.session.disconnect()
    }

    fn phase_value(&self, group: &PointGroup, phase: Phase, what: &'static str) -> Result<f64> {
        self.session.require_phases(phase.required_phases(), what)?;
        self.session.group_value(group, phase.index(), what)
    }

    /// Return the AC current in amps, total or of one phase.
    pub fn current(&self, phase: Phase) -> Result<f64> {
        self.phase_value(&reg::CURRENT, phase, "phase current")
    }

    /// Return an AC voltage in volts.
    pub fn voltage(&self, voltage: Voltage) -> Result<f64> {
        const WHAT: &str = "voltage";
        self.session.require_phases(voltage.required_phases(), WHAT)?;
        let (group, index) = match voltage {
            Voltage::Average => (&reg::VOLTAGE_PHASE, 0),
            Voltage::A => (&reg::VOLTAGE_PHASE, 1),
            Voltage::B => (&reg::VOLTAGE_PHASE, 2),
            Voltage::C => (&reg::VOLTAGE_PHASE, 3),
            Voltage::LineAverage => (&reg::VOLTAGE_LINE, 0),
            Voltage::AB => (&reg::VOLTAGE_LINE, 1),
            Voltage::BC => (&reg::VOLTAGE_LINE, 2),
            Voltage::CA => (&reg::VOLTAGE_LINE, 3),
        };
        self.session.group_value(group, index, WHAT)
    }

    /// Return the line frequency in hertz.
    pub fn frequency(&self) -> Result<f64> {
        self.session.group_value(&reg::FREQUENCY, 0, "frequency")
    }

    /// Return the real power in watts. Positive when importing from the grid.
    pub fn power(&self, phase: Phase) -> Result<f64> {
        self.phase_value(&reg::POWER, phase, "phase power")
    }

    pub fn apparent_power(&self, phase: Phase) -> Result<f64> {
        self.phase_value(&reg::APPARENT_POWER, phase, "phase apparent power")
    }

    pub fn reactive_power(&self, phase: Phase) -> Result<f64> {
        self.phase_value(&reg::REACTIVE_POWER, phase, "phase reactive power")
    }

    /// Return the power factor in percent.
    pub fn power_factor(&self, phase: Phase) -> Result<f64> {
        self.phase_value(&reg::POWER_FACTOR, phase, "phase power factor")
    }

    /// Return the real energy exported in watt-hours.
    pub fn energy_exported(&self, phase: Phase) -> Result<f64> {
        self.phase_value(&reg::ENERGY_EXPORTED, phase, "phase energy")
    }

    /// Return the real energy imported in watt-hours.
    pub fn energy_imported(&self, phase: Phase) -> Result<f64> {
        self.phase_value(&reg::ENERGY_IMPORTED, phase, "phase energy")
    }

    pub fn apparent_energy_exported(&self, phase: Phase) -> Result<f64> {
        self.phase_value(&reg::APPARENT_ENERGY_EXPORTED, phase, "phase apparent energy")
    }

    pub fn apparent_energy_imported(&self, phase: Phase) -> Result<f64> {
        self.phase_value(&reg::APPARENT_ENERGY_IMPORTED, phase, "phase apparent energy")
    }

    /// Return the reactive energy of one quadrant in VAr-hours.
    pub fn reactive_energy(&self, quadrant: Quadrant, phase: Phase) -> Result<f64> {
        self.phase_value(&reg::reactive_energy(quadrant), phase, "phase reactive energy")
    }

    /// Return the meter event flags.
    pub fn events(&self) -> Result<u32> {
        let encoding = self.session.require_valid()?.encoding;
        let point = reg::EVENTS
            .point(0, encoding)
            .ok_or(Error::Unsupported("events"))?;
        self.session.word32(point.window.address)
    }
}
