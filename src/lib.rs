//! This crate reads Fronius inverters and smart meters over their SunSpec Modbus register map.
//!
//! It detects which SunSpec model a device reports, checks the register layout against the
//! expected block markers, and decodes measurements into physical values. Both SunSpec
//! encodings are supported:
//! * 32-bit IEEE-754 floats (models 111-113, 211-213)
//! * integers paired with a power of ten scale factor (models 101-103, 201-203)
//!
//! Supported devices:
//! * Fronius inverters (Primo, Symo, Galvo, Eco, Gen24), single or three phase
//! * Fronius hybrid inverters with a battery (storage model 124)
//! * Fronius Smart Meter, single or three phase
//!
//! The Multiple MPPT extension (model 160) is decoded as integer + scale factor on every
//! device, which is what Fronius hardware sends even in the float map.
//!
//! Devices are reached over Modbus TCP (default port 502) or Modbus RTU. The serial port
//! used for RTU should be configured like so:
//! * Default baud rate: 9600
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None
//!
//! ```no_run
//! use fronius_sunspec::{config::Config, device::Device, inverter::Inverter, transport, types::Phase};
//!
//! # fn main() -> Result<(), fronius_sunspec::error::Error> {
//! let config = Config::from_file("fronius.yaml")?;
//! let mut inverter = Inverter::new(transport::connect(&config)?);
//! inverter.validate()?;
//! println!("AC current: {} A", inverter.ac_current(Phase::Total)?);
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod inverter;
pub mod inverter_register;
pub mod meter;
pub mod meter_register;
pub mod register;
pub mod shadow;
pub mod transport;
pub mod types;

#[cfg(test)]
mod mock;
