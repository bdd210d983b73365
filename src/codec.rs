//! Conversions from raw register windows to typed physical values.
//!
//! SunSpec maps encode a quantity either as a big-endian IEEE-754 float spread over two
//! registers, or as an integer register paired with a scale factor register. In the latter
//! case the physical value is `raw * 10^scale_factor`.

use crate::{
    error::{Error, Result},
    register::{Point, ValueKind},
    shadow::RegisterShadow,
};

/// SunSpec marks an unimplemented `sunssf` register with this value.
pub const SCALE_FACTOR_UNIMPLEMENTED: i16 = i16::MIN;

/// Byte and word order of multi-register values.
///
/// The default is big-endian throughout ("ABCD"), which is what SunSpec mandates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterOrder {
    /// Least significant register first.
    pub word_swap: bool,
    /// Swap the two bytes inside each register.
    pub byte_swap: bool,
}

impl RegisterOrder {
    pub const BIG_ENDIAN: Self = Self {
        word_swap: false,
        byte_swap: false,
    };

    #[inline]
    const fn register(&self, value: u16) -> u16 {
        if self.byte_swap { value.swap_bytes() } else { value }
    }
}

/// Concatenate two registers into a `u32`.
///
/// Bytes are swapped inside each register first, then `word_swap` picks which register
/// supplies the high half.
pub const fn u32_from_registers(registers: [u16; 2], order: RegisterOrder) -> u32 {
    let r0 = order.register(registers[0]) as u32;
    let r1 = order.register(registers[1]) as u32;
    if order.word_swap {
        (r1 << 16) | r0
    } else {
        (r0 << 16) | r1
    }
}

/// Concatenate four registers into a `u64`, same rules as [`u32_from_registers`].
pub const fn u64_from_registers(registers: [u16; 4], order: RegisterOrder) -> u64 {
    let mut value = 0u64;
    let mut i = 0;
    while i < 4 {
        let index = if order.word_swap { 3 - i } else { i };
        value = (value << 16) | order.register(registers[index]) as u64;
        i += 1;
    }
    value
}

pub const fn i32_from_registers(registers: [u16; 2], order: RegisterOrder) -> i32 {
    u32_from_registers(registers, order) as i32
}

pub const fn i64_from_registers(registers: [u16; 4], order: RegisterOrder) -> i64 {
    u64_from_registers(registers, order) as i64
}

/// Reinterpret two big-endian registers as an IEEE-754 single precision float.
pub fn f32_from_registers(r0: u16, r1: u16) -> f32 {
    f32::from_bits(u32_from_registers([r0, r1], RegisterOrder::BIG_ENDIAN))
}

/// Apply a power of ten scale factor.
///
/// Negative factors divide so that exact decimal results such as `2305 * 10^-1` come out
/// as `230.5` rather than one ulp off.
pub fn scaled(raw: impl Into<f64>, scale_factor: i16) -> f64 {
    let raw = raw.into();
    let factor = 10f64.powi(scale_factor.unsigned_abs() as i32);
    if scale_factor < 0 {
        raw / factor
    } else {
        raw * factor
    }
}

/// Decode a physical value out of the register shadow.
///
/// Every register the point touches, including its scale factor, must have been fetched.
pub fn decode(shadow: &RegisterShadow, point: &Point) -> Result<f64> {
    let address = point.window.address;
    let raw: f64 = match point.kind {
        ValueKind::Float32 => {
            let [r0, r1] = shadow.words::<2>(address)?;
            return Ok(f32_from_registers(r0, r1) as f64);
        }
        ValueKind::Int16 => (shadow.word(address)? as i16).into(),
        ValueKind::Uint16 => shadow.word(address)?.into(),
        ValueKind::Int32 => i32_from_registers(shadow.words(address)?, RegisterOrder::BIG_ENDIAN).into(),
        ValueKind::Uint32 | ValueKind::Acc32 => {
            u32_from_registers(shadow.words(address)?, RegisterOrder::BIG_ENDIAN).into()
        }
    };

    match point.scale_factor {
        Some(scale_address) => {
            let scale_factor = shadow.word(scale_address)? as i16;
            if scale_factor == SCALE_FACTOR_UNIMPLEMENTED {
                return Err(Error::ScaleFactorUnimplemented {
                    address: scale_address,
                });
            }
            Ok(scaled(raw, scale_factor))
        }
        None => Ok(raw),
    }
}

/// Unpack an ASCII string packed two characters per register, trimming trailing NUL and
/// space padding.
pub fn string_from_registers<const N: usize>(registers: &[u16]) -> Result<heapless::String<N>> {
    let mut bytes: heapless::Vec<u8, N> = heapless::Vec::new();
    for register in registers {
        bytes
            .extend_from_slice(&register.to_be_bytes())
            .map_err(|_| Error::BufferError)?;
    }

    let text = core::str::from_utf8(&bytes).map_err(|_| Error::InvalidText)?;
    let mut string = heapless::String::new();
    string
        .push_str(text.trim_end_matches(['\0', ' ']))
        .map_err(|_| Error::BufferError)?;
    Ok(string)
}

/// Four digit uppercase hex, for diagnostics.
pub fn hex16(value: u16) -> heapless::String<4> {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";

    let mut string = heapless::String::new();
    for shift in [12, 8, 4, 0] {
        // Capacity is exactly four digits.
        let _ = string.push(DIGITS[((value >> shift) & 0xF) as usize] as char);
    }
    string
}
