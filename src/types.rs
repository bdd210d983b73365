//! This module contains types relevant to the Fronius SunSpec data model.

use modular_bitfield::prelude::*;
use strum_macros::{Display, EnumIter};

use crate::error::{Error, Result};

/// The two SunSpec encodings of physical values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Encoding {
    /// 32-bit IEEE-754 floats, model ids 111-113 and 211-213.
    Float,
    /// 16/32-bit integers paired with a scale factor register, model ids 101-103 and 201-203.
    IntegerScaled,
}

/// The device classes this crate knows how to detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum Family {
    Inverter,
    Meter,
}

impl Family {
    /// Model ids accepted for this family.
    pub const fn allowed_ids(&self) -> &'static [u16] {
        match self {
            Family::Inverter => &[101, 102, 103, 111, 112, 113],
            Family::Meter => &[201, 202, 203, 211, 212, 213],
        }
    }

    /// Declared block length of the family's model: `[integer, float]`.
    pub const fn block_lengths(&self) -> [u16; 2] {
        match self {
            Family::Inverter => [50, 60],
            Family::Meter => [105, 124],
        }
    }

    /// Block length for the given encoding.
    pub const fn block_length(&self, encoding: Encoding) -> u16 {
        let [int, float] = self.block_lengths();
        match encoding {
            Encoding::IntegerScaled => int,
            Encoding::Float => float,
        }
    }

    /// Classify a model id read from the device.
    ///
    /// The tens digit selects the encoding (`0` integer, otherwise float), the units digit
    /// the number of phases.
    pub fn classify(&self, model_id: u16) -> Result<DeviceIdentity> {
        let allowed = self.allowed_ids();
        if !allowed.contains(&model_id) {
            return Err(Error::UnknownModel {
                received: model_id,
                allowed,
            });
        }

        let encoding = if (model_id / 10) % 10 != 0 {
            Encoding::Float
        } else {
            Encoding::IntegerScaled
        };

        Ok(DeviceIdentity {
            family: *self,
            model_id,
            phase_count: (model_id % 10) as u8,
            encoding,
        })
    }

    /// Check the declared block length against the two known sizes of this family.
    ///
    /// Any of the two is accepted regardless of the encoding implied by the model id.
    pub fn check_block_length(&self, model_id: u16, length: u16) -> Result<()> {
        let expected = self.block_lengths();
        if expected.contains(&length) {
            Ok(())
        } else {
            Err(Error::LengthMismatch {
                model_id,
                received: length,
                expected,
            })
        }
    }
}

/// What detection learnt about a connected device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub family: Family,
    pub model_id: u16,
    /// 1, 2 or 3.
    pub phase_count: u8,
    pub encoding: Encoding,
}

/// Progress of the detection sequence. Any step may end in [`ValidationState::Invalid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum ValidationState {
    #[default]
    Unvalidated,
    SignatureChecked,
    CommonRead,
    IdClassified,
    BlockFetched,
    Valid,
    Invalid,
}

/// Selects a per-phase value, or the total over all phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum Phase {
    Total,
    A,
    B,
    C,
}

impl Phase {
    /// Position in a total/A/B/C register group.
    pub const fn index(&self) -> u16 {
        *self as u16
    }

    /// The phase number this selector needs, `0` for the total.
    pub const fn required_phases(&self) -> u8 {
        *self as u8
    }
}

/// Selects an AC voltage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum Voltage {
    /// Average phase to neutral voltage.
    Average,
    /// Phase A to neutral.
    A,
    /// Phase B to neutral.
    B,
    /// Phase C to neutral.
    C,
    /// Average phase to phase voltage.
    LineAverage,
    /// Phase A to phase B.
    AB,
    /// Phase B to phase C.
    BC,
    /// Phase C to phase A.
    CA,
}

impl Voltage {
    /// The number of phases a device needs to report this voltage.
    pub const fn required_phases(&self) -> u8 {
        match self {
            Voltage::Average | Voltage::A => 1,
            Voltage::B | Voltage::AB | Voltage::LineAverage => 2,
            Voltage::C | Voltage::BC | Voltage::CA => 3,
        }
    }
}

/// Selects a DC measurement: the inverter total or one MPPT input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcInput {
    Total,
    /// MPPT input, numbered from 1.
    Mppt(u16),
}

/// Inverter temperature sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u16)]
pub enum TemperatureSensor {
    Cabinet = 0,
    Heatsink = 1,
    Transformer = 2,
    Other = 3,
}

/// Reactive energy quadrants of a meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum Quadrant {
    /// Imported, Q1.
    Q1,
    /// Imported, Q2.
    Q2,
    /// Exported, Q3.
    Q3,
    /// Exported, Q4.
    Q4,
}

/// SunSpec inverter operating state (`St`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[repr(u16)]
pub enum OperatingState {
    Off = 1,
    Sleeping = 2,
    Starting = 3,
    Mppt = 4,
    Throttled = 5,
    ShuttingDown = 6,
    Fault = 7,
    Standby = 8,
}

impl TryFrom<u16> for OperatingState {
    type Error = u16;

    fn try_from(value: u16) -> core::result::Result<Self, Self::Error> {
        use OperatingState as OS;
        match value {
            1 => Ok(OS::Off),
            2 => Ok(OS::Sleeping),
            3 => Ok(OS::Starting),
            4 => Ok(OS::Mppt),
            5 => Ok(OS::Throttled),
            6 => Ok(OS::ShuttingDown),
            7 => Ok(OS::Fault),
            8 => Ok(OS::Standby),
            other => Err(other),
        }
    }
}

/// Fronius vendor operating state (`StVnd`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[repr(u16)]
pub enum VendorState {
    Off = 1,
    Sleeping = 2,
    Starting = 3,
    Mppt = 4,
    Throttled = 5,
    ShuttingDown = 6,
    Fault = 7,
    Standby = 8,
    /// No SolarNet communication.
    NoSolarNet = 9,
    /// No communication with the inverter.
    NoInverterComm = 10,
    /// Overcurrent detected on the SolarNet plug.
    SolarNetOvercurrent = 11,
    /// Inverter firmware is being updated.
    Updating = 12,
    /// Arc fault circuit interruption event.
    Afci = 13,
}

impl VendorState {
    const MAX_VALUE: u16 = Self::Afci as u16;
}

impl TryFrom<u16> for VendorState {
    type Error = u16;

    fn try_from(value: u16) -> core::result::Result<Self, Self::Error> {
        use VendorState as VS;
        if value == 0 || value > Self::MAX_VALUE {
            return Err(value);
        }
        Ok(match value {
            1 => VS::Off,
            2 => VS::Sleeping,
            3 => VS::Starting,
            4 => VS::Mppt,
            5 => VS::Throttled,
            6 => VS::ShuttingDown,
            7 => VS::Fault,
            8 => VS::Standby,
            9 => VS::NoSolarNet,
            10 => VS::NoInverterComm,
            11 => VS::SolarNetOvercurrent,
            12 => VS::Updating,
            _ => VS::Afci,
        })
    }
}

/// Charge status of a storage block (`ChaSt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[repr(u16)]
pub enum ChargeStatus {
    Off = 1,
    Empty = 2,
    Discharging = 3,
    Charging = 4,
    Full = 5,
    Holding = 6,
    Testing = 7,
}

impl TryFrom<u16> for ChargeStatus {
    type Error = u16;

    fn try_from(value: u16) -> core::result::Result<Self, Self::Error> {
        use ChargeStatus as CS;
        match value {
            1 => Ok(CS::Off),
            2 => Ok(CS::Empty),
            3 => Ok(CS::Discharging),
            4 => Ok(CS::Charging),
            5 => Ok(CS::Full),
            6 => Ok(CS::Holding),
            7 => Ok(CS::Testing),
            other => Err(other),
        }
    }
}

/// Inverter event flags (`Evt1`).
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InverterEvents {
    pub ground_fault: bool,
    pub dc_over_voltage: bool,
    pub ac_disconnect: bool,
    pub dc_disconnect: bool,
    pub grid_disconnect: bool,
    pub cabinet_open: bool,
    pub manual_shutdown: bool,
    pub over_temperature: bool,
    pub over_frequency: bool,
    pub under_frequency: bool,
    pub ac_over_voltage: bool,
    pub ac_under_voltage: bool,
    pub blown_string_fuse: bool,
    pub under_temperature: bool,
    pub memory_loss: bool,
    pub hw_test_failure: bool,
    #[skip]
    __: B16,
}

impl From<u32> for InverterEvents {
    fn from(value: u32) -> Self {
        Self::from_bytes(value.to_le_bytes())
    }
}

impl InverterEvents {
    /// Whether no event flag is set.
    pub fn is_clear(&self) -> bool {
        u32::from_le_bytes(self.into_bytes()) == 0
    }
}
