//! Register table of the Fronius inverter models 101-103 / 111-113 and the model chain
//! that follows them.
//!
//! Float and integer layouts share the model header and first data address. Everything
//! after the inverter model sits [`INT_OFFSET`] registers lower in the integer map, since
//! the integer model block is ten registers shorter than the float one.

use crate::{
    register::{Point, PointGroup, RegisterAddress, ValueKind},
    types::Encoding,
};

/// Distance between the float and integer position of every block after the inverter model.
pub const INT_OFFSET: u16 = 10;

/// The inverter model data block, `MODEL_BASE .. MODEL_BASE + length`.
pub const fn model_block(encoding: Encoding) -> RegisterAddress {
    match encoding {
        Encoding::Float => RegisterAddress::new(40071, 60),
        Encoding::IntegerScaled => RegisterAddress::new(40071, 50),
    }
}

/// Shift a float-map address of the trailing chain to the map in use.
pub const fn chain_address(float_address: u16, encoding: Encoding) -> u16 {
    match encoding {
        Encoding::Float => float_address,
        Encoding::IntegerScaled => float_address - INT_OFFSET,
    }
}

/// __R__ - End-of-map marker `(0xFFFF, 0)` after the Multiple MPPT extension.
pub const fn end_marker(encoding: Encoding) -> RegisterAddress {
    RegisterAddress::new(chain_address(40313, encoding), 2)
}

/// __R__ - AC current: total, phase A, phase B, phase C. Amps.
pub const AC_CURRENT: PointGroup =
    PointGroup::new(40071, 40071, ValueKind::Uint16, Some(40075), 4);
/// __R__ - Phase to phase voltage: AB, BC, CA. Volts.
pub const AC_VOLTAGE_LINE: PointGroup =
    PointGroup::new(40079, 40076, ValueKind::Uint16, Some(40082), 3);
/// __R__ - Phase to neutral voltage: A, B, C. Volts.
pub const AC_VOLTAGE_PHASE: PointGroup =
    PointGroup::new(40085, 40079, ValueKind::Uint16, Some(40082), 3);
/// __R__ - AC power. Watts.
pub const AC_POWER: PointGroup = PointGroup::new(40091, 40083, ValueKind::Int16, Some(40084), 1);
/// __R__ - Line frequency. Hertz.
pub const FREQUENCY: PointGroup = PointGroup::new(40093, 40085, ValueKind::Uint16, Some(40086), 1);
/// __R__ - AC apparent power. VA.
pub const APPARENT_POWER: PointGroup =
    PointGroup::new(40095, 40087, ValueKind::Int16, Some(40088), 1);
/// __R__ - AC reactive power. VAr.
pub const REACTIVE_POWER: PointGroup =
    PointGroup::new(40097, 40089, ValueKind::Int16, Some(40090), 1);
/// __R__ - Power factor. Percent.
pub const POWER_FACTOR: PointGroup =
    PointGroup::new(40099, 40091, ValueKind::Int16, Some(40092), 1);
/// __R__ - AC lifetime energy production. Watt-hours.
pub const ENERGY: PointGroup = PointGroup::new(40101, 40093, ValueKind::Acc32, Some(40095), 1);
/// __R__ - DC current. Amps.
pub const DC_CURRENT: PointGroup = PointGroup::new(40103, 40096, ValueKind::Uint16, Some(40097), 1);
/// __R__ - DC voltage. Volts.
pub const DC_VOLTAGE: PointGroup = PointGroup::new(40105, 40098, ValueKind::Uint16, Some(40099), 1);
/// __R__ - DC power. Watts.
pub const DC_POWER: PointGroup = PointGroup::new(40107, 40100, ValueKind::Int16, Some(40101), 1);
/// __R__ - Cabinet, heat sink, transformer and other temperature. Degrees Celsius.
pub const TEMPERATURE: PointGroup =
    PointGroup::new(40109, 40102, ValueKind::Int16, Some(40106), 4);

/// __R__ - Operating state, see [`OperatingState`](crate::types::OperatingState).
pub const fn operating_state(encoding: Encoding) -> RegisterAddress {
    match encoding {
        Encoding::Float => RegisterAddress::new(40117, 1),
        Encoding::IntegerScaled => RegisterAddress::new(40107, 1),
    }
}

/// __R__ - Fronius operating state, see [`VendorState`](crate::types::VendorState).
pub const fn vendor_state(encoding: Encoding) -> RegisterAddress {
    match encoding {
        Encoding::Float => RegisterAddress::new(40118, 1),
        Encoding::IntegerScaled => RegisterAddress::new(40108, 1),
    }
}

/// __R__ - Event flags `Evt1`, `Evt2`, `EvtVnd1` .. `EvtVnd4`. Each 32 bits.
pub const EVENTS: PointGroup = PointGroup::new(40119, 40109, ValueKind::Uint32, None, 6);

/// Index of `Evt1` in [`EVENTS`].
pub const EVENT_FLAGS: u16 = 0;
/// Index of `EvtVnd1` in [`EVENTS`]; `EvtVnd2..4` follow.
pub const VENDOR_EVENTS: u16 = 2;

/// Models Fronius places between the inverter model and the end marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainBlock {
    /// Nameplate ratings (120).
    Nameplate,
    /// Basic settings (121).
    BasicSettings,
    /// Extended measurements and status (122).
    ExtendedMeasurements,
    /// Immediate controls (123).
    ImmediateControls,
    /// Multiple MPPT inverter extension (160).
    MultipleMppt,
    /// Basic storage control (124). Only present on hybrid inverters, in place of the end
    /// marker, which then follows the storage block.
    Storage,
}

impl ChainBlock {
    pub const fn model_id(&self) -> u16 {
        match self {
            ChainBlock::Nameplate => 120,
            ChainBlock::BasicSettings => 121,
            ChainBlock::ExtendedMeasurements => 122,
            ChainBlock::ImmediateControls => 123,
            ChainBlock::MultipleMppt => 160,
            ChainBlock::Storage => 124,
        }
    }

    /// Declared length, excluding the two header registers.
    pub const fn length(&self) -> u16 {
        match self {
            ChainBlock::Nameplate => 26,
            ChainBlock::BasicSettings => 30,
            ChainBlock::ExtendedMeasurements => 44,
            ChainBlock::ImmediateControls => 24,
            ChainBlock::MultipleMppt => 48,
            ChainBlock::Storage => 24,
        }
    }

    const fn float_header(&self) -> u16 {
        match self {
            ChainBlock::Nameplate => 40131,
            ChainBlock::BasicSettings => 40159,
            ChainBlock::ExtendedMeasurements => 40191,
            ChainBlock::ImmediateControls => 40237,
            ChainBlock::MultipleMppt => 40263,
            ChainBlock::Storage => 40313,
        }
    }

    /// The two header registers: model id and declared length.
    pub const fn header(&self, encoding: Encoding) -> RegisterAddress {
        RegisterAddress::new(chain_address(self.float_header(), encoding), 2)
    }

    /// Header followed by the data registers.
    pub const fn block(&self, encoding: Encoding) -> RegisterAddress {
        RegisterAddress::new(chain_address(self.float_header(), encoding), self.length() + 2)
    }

    /// First data register.
    pub const fn data(&self, encoding: Encoding) -> u16 {
        chain_address(self.float_header(), encoding) + 2
    }
}

/// Registers of the Multiple MPPT extension (160).
///
/// Fronius lays this model out at float-compatible addresses in the float map, but encodes
/// every value as an integer with a scale factor in both maps.
pub mod mppt {
    use super::ChainBlock;
    use crate::{
        register::{Point, RegisterAddress, ValueKind},
        types::Encoding,
    };

    /// Fronius inverters report two inputs.
    pub const MODULE_COUNT: u16 = 2;
    /// Registers per module.
    pub const MODULE_LENGTH: u16 = 20;

    const DCA_SF: u16 = 0;
    const DCV_SF: u16 = 1;
    const DCW_SF: u16 = 2;
    const DCWH_SF: u16 = 3;
    const MODULES: u16 = 8;

    /// Per-module fields.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Field {
        /// DC current. Amps.
        Current,
        /// DC voltage. Volts.
        Voltage,
        /// DC power. Watts.
        Power,
        /// Lifetime energy. Watt-hours.
        Energy,
        /// Module temperature. Degrees Celsius.
        Temperature,
        /// Operating state of the input.
        State,
    }

    impl Field {
        const fn offset(&self) -> u16 {
            match self {
                Field::Current => 9,
                Field::Voltage => 10,
                Field::Power => 11,
                Field::Energy => 12,
                Field::Temperature => 16,
                Field::State => 17,
            }
        }
    }

    /// __R__ - Number of modules the device reports.
    pub const fn module_count(encoding: Encoding) -> RegisterAddress {
        RegisterAddress::new(ChainBlock::MultipleMppt.data(encoding) + 6, 1)
    }

    /// __R__ - Input id and 16 character name of `module` (numbered from 1).
    pub const fn module_label(module: u16, encoding: Encoding) -> RegisterAddress {
        RegisterAddress::new(module_base(module, encoding) + 1, 8)
    }

    const fn module_base(module: u16, encoding: Encoding) -> u16 {
        ChainBlock::MultipleMppt.data(encoding) + MODULES + (module - 1) * MODULE_LENGTH
    }

    /// Resolve `field` of `module` (numbered from 1). `None` for unknown modules.
    pub const fn point(field: Field, module: u16, encoding: Encoding) -> Option<Point> {
        if module == 0 || module > MODULE_COUNT {
            return None;
        }
        let data = ChainBlock::MultipleMppt.data(encoding);
        let address = module_base(module, encoding) + field.offset();
        Some(match field {
            Field::Current => Point::scaled(address, ValueKind::Uint16, data + DCA_SF),
            Field::Voltage => Point::scaled(address, ValueKind::Uint16, data + DCV_SF),
            Field::Power => Point::scaled(address, ValueKind::Uint16, data + DCW_SF),
            Field::Energy => Point::scaled(address, ValueKind::Acc32, data + DCWH_SF),
            Field::Temperature => Point::raw(address, ValueKind::Int16),
            Field::State => Point::raw(address, ValueKind::Uint16),
        })
    }
}

/// Registers of the immediate controls model (123).
///
/// Exposed for callers implementing their own write path; this crate only reads.
pub mod controls {
    use super::ChainBlock;
    use crate::{register::RegisterAddress, types::Encoding};

    /// Writable control points.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Control {
        /// __R/W__ - Connection control. `0` disconnected, `1` connected.
        Conn,
        /// __R/W__ - Active power output limit, percent of `WMax`.
        WMaxLimPct,
        /// __R/W__ - Enable the power output limit.
        WMaxLimEna,
        /// __R/W__ - Fixed power factor setpoint.
        OutPfSet,
        /// __R/W__ - Enable the fixed power factor.
        OutPfSetEna,
        /// __R/W__ - Enable reactive power percent limit.
        VArPctEna,
        /// __R__ - Scale factor of `WMaxLimPct`.
        WMaxLimPctSf,
        /// __R__ - Scale factor of `OutPFSet`.
        OutPfSetSf,
    }

    impl Control {
        const fn offset(&self) -> u16 {
            match self {
                Control::Conn => 2,
                Control::WMaxLimPct => 3,
                Control::WMaxLimEna => 7,
                Control::OutPfSet => 8,
                Control::OutPfSetEna => 12,
                Control::VArPctEna => 20,
                Control::WMaxLimPctSf => 21,
                Control::OutPfSetSf => 22,
            }
        }

        pub const fn address(&self, encoding: Encoding) -> RegisterAddress {
            RegisterAddress::new(
                ChainBlock::ImmediateControls.data(encoding) + self.offset(),
                1,
            )
        }
    }
}

/// Registers of the basic storage control model (124), as offsets into its data block.
pub mod storage {
    use super::ChainBlock;
    use crate::{
        register::{Point, ValueKind},
        types::Encoding,
    };

    const WCHA_MAX: u16 = 0;
    const MIN_RSV_PCT: u16 = 5;
    const CHA_STATE: u16 = 6;
    const CHA_ST: u16 = 9;
    const WCHA_MAX_SF: u16 = 16;
    const MIN_RSV_PCT_SF: u16 = 19;
    const CHA_STATE_SF: u16 = 20;

    /// Where the storage data block starts, given the position of its header.
    const fn data(encoding: Encoding) -> u16 {
        ChainBlock::Storage.data(encoding)
    }

    /// __R__ - Maximum charge power. Watts.
    pub const fn max_charge_power(encoding: Encoding) -> Point {
        Point::scaled(data(encoding) + WCHA_MAX, ValueKind::Uint16, data(encoding) + WCHA_MAX_SF)
    }

    /// __R/W__ - Minimum reserve, percent of capacity.
    pub const fn minimum_reserve(encoding: Encoding) -> Point {
        Point::scaled(
            data(encoding) + MIN_RSV_PCT,
            ValueKind::Uint16,
            data(encoding) + MIN_RSV_PCT_SF,
        )
    }

    /// __R__ - State of charge, percent of capacity.
    pub const fn state_of_charge(encoding: Encoding) -> Point {
        Point::scaled(
            data(encoding) + CHA_STATE,
            ValueKind::Uint16,
            data(encoding) + CHA_STATE_SF,
        )
    }

    /// __R__ - Charge status, see [`ChargeStatus`](crate::types::ChargeStatus).
    pub const fn charge_status(encoding: Encoding) -> Point {
        Point::raw(data(encoding) + CHA_ST, ValueKind::Uint16)
    }
}
