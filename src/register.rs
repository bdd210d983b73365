//! This module is used to define the register windows shared by every Fronius SunSpec map.
//!
//! All addresses are zero-based protocol addresses. Fronius documentation numbers its
//! registers from one, so documented register `40001` is protocol address `40000`.

use crate::types::Encoding;

/// A contiguous, immutable register window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterAddress {
    pub address: u16,
    /// At least one. Two for 32-bit values, four for 64-bit values.
    pub count: u16,
}

impl RegisterAddress {
    pub const fn new(address: u16, count: u16) -> Self {
        Self { address, count }
    }

    /// First address after this window.
    pub const fn end(&self) -> u16 {
        self.address + self.count
    }

    /// Whether `address` falls inside this window.
    pub const fn contains(&self, address: u16) -> bool {
        address >= self.address && address < self.end()
    }
}

/// How a value is packed into its register window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int16,
    Uint16,
    Int32,
    Uint32,
    /// Accumulator, unsigned 32-bit counter.
    Acc32,
    /// IEEE-754 single precision, most significant word first.
    Float32,
}

impl ValueKind {
    /// Number of registers this kind occupies.
    pub const fn width(&self) -> u16 {
        match self {
            ValueKind::Int16 | ValueKind::Uint16 => 1,
            ValueKind::Int32 | ValueKind::Uint32 | ValueKind::Acc32 | ValueKind::Float32 => 2,
        }
    }
}

/// A fully resolved physical value: where it lives, how it is packed and, for
/// integer encodings, which register holds its scale factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub window: RegisterAddress,
    pub kind: ValueKind,
    pub scale_factor: Option<u16>,
}

impl Point {
    pub const fn float(address: u16) -> Self {
        Self {
            window: RegisterAddress::new(address, 2),
            kind: ValueKind::Float32,
            scale_factor: None,
        }
    }

    pub const fn scaled(address: u16, kind: ValueKind, scale_factor: u16) -> Self {
        Self {
            window: RegisterAddress::new(address, kind.width()),
            kind,
            scale_factor: Some(scale_factor),
        }
    }

    pub const fn raw(address: u16, kind: ValueKind) -> Self {
        Self {
            window: RegisterAddress::new(address, kind.width()),
            kind,
            scale_factor: None,
        }
    }
}

/// A row of the register table: a run of `members` consecutive values sharing one
/// scale factor, e.g. total current followed by the currents of phases A, B and C.
///
/// Float maps pack each member into two registers. Integer maps pack each member
/// into `int_kind.width()` registers and share the scale factor at `int_scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointGroup {
    pub float_base: u16,
    pub int_base: u16,
    pub int_kind: ValueKind,
    pub int_scale: Option<u16>,
    pub members: u16,
}

impl PointGroup {
    pub const fn new(
        float_base: u16,
        int_base: u16,
        int_kind: ValueKind,
        int_scale: Option<u16>,
        members: u16,
    ) -> Self {
        Self {
            float_base,
            int_base,
            int_kind,
            int_scale,
            members,
        }
    }

    /// Resolve member `index` (0-based) of this group under the given encoding.
    ///
    /// Returns `None` when the group has fewer members.
    pub const fn point(&self, index: u16, encoding: Encoding) -> Option<Point> {
        if index >= self.members {
            return None;
        }
        Some(match encoding {
            Encoding::Float => Point::float(self.float_base + 2 * index),
            Encoding::IntegerScaled => {
                let address = self.int_base + self.int_kind.width() * index;
                match self.int_scale {
                    Some(scale) => Point::scaled(address, self.int_kind, scale),
                    None => Point::raw(address, self.int_kind),
                }
            }
        })
    }
}

/// First address of any Fronius SunSpec map.
pub const SUNSPEC_BASE: u16 = 40000;

/// __R__ - The two-register "SunS" signature at the start of the map.
pub const SUNSPEC_ID: RegisterAddress = RegisterAddress::new(40000, 2);

/// The expected value of [`SUNSPEC_ID`]: ASCII `SunS`.
pub const SUNSPEC_SIGNATURE: [u16; 2] = [0x5375, 0x6E53];

/// Common model (1) block id and length header.
pub const COMMON_HEADER: RegisterAddress = RegisterAddress::new(40002, 2);

/// Model id of the SunSpec common model.
pub const COMMON_MODEL_ID: u16 = 1;

/// Fronius declares 65 registers; the SunSpec reference adds one pad register.
pub const COMMON_MODEL_LENGTHS: [u16; 2] = [65, 66];

/// Header plus the 65 data registers of the common model.
pub const COMMON_BLOCK: RegisterAddress = RegisterAddress::new(40002, 67);

/// Registers of the common model (1).
pub mod common {
    use super::RegisterAddress;

    /// __R__ - Manufacturer, e.g. `Fronius`.
    pub const MANUFACTURER: RegisterAddress = RegisterAddress::new(40004, 16);
    /// __R__ - Device model, e.g. `Symo 8.2-3-M`.
    pub const MODEL: RegisterAddress = RegisterAddress::new(40020, 16);
    /// __R__ - Options. Fronius reports the Datamanager firmware version here.
    pub const OPTIONS: RegisterAddress = RegisterAddress::new(40036, 8);
    /// __R__ - Firmware version of the device.
    pub const VERSION: RegisterAddress = RegisterAddress::new(40044, 8);
    /// __R__ - Serial number.
    pub const SERIAL_NUMBER: RegisterAddress = RegisterAddress::new(40052, 16);
    /// __R__ - Modbus device address.
    pub const DEVICE_ADDRESS: RegisterAddress = RegisterAddress::new(40068, 1);
}

/// Model id and declared length of the device model following the common block.
pub const MODEL_HEADER: RegisterAddress = RegisterAddress::new(40069, 2);

/// First data register of the device model.
pub const MODEL_BASE: u16 = 40071;

/// Id register value of the end-of-map marker.
pub const END_MARKER_ID: u16 = 0xFFFF;
/// Length register value of the end-of-map marker.
pub const END_MARKER_LENGTH: u16 = 0;
