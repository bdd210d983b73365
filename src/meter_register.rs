//! Register table of the Fronius smart meter models 201-203 / 211-213.
//!
//! Every quantity comes as a total (or average) followed by phases A, B and C. The integer
//! map shares one scale factor per quantity, and for energies one per quantity pair.

use crate::{
    register::{PointGroup, RegisterAddress, ValueKind},
    types::{Encoding, Quadrant},
};

/// The meter model data block, `MODEL_BASE .. MODEL_BASE + length`.
pub const fn model_block(encoding: Encoding) -> RegisterAddress {
    match encoding {
        Encoding::Float => RegisterAddress::new(40071, 124),
        Encoding::IntegerScaled => RegisterAddress::new(40071, 105),
    }
}

/// __R__ - End-of-map marker `(0xFFFF, 0)` straight after the meter model.
pub const fn end_marker(encoding: Encoding) -> RegisterAddress {
    RegisterAddress::new(model_block(encoding).end(), 2)
}

/// __R__ - AC current: total, phase A, B, C. Amps.
pub const CURRENT: PointGroup = PointGroup::new(40071, 40071, ValueKind::Int16, Some(40075), 4);
/// __R__ - Phase to neutral voltage: average, A, B, C. Volts.
pub const VOLTAGE_PHASE: PointGroup =
    PointGroup::new(40079, 40076, ValueKind::Int16, Some(40084), 4);
/// __R__ - Phase to phase voltage: average, AB, BC, CA. Volts.
pub const VOLTAGE_LINE: PointGroup =
    PointGroup::new(40087, 40080, ValueKind::Int16, Some(40084), 4);
/// __R__ - Frequency. Hertz.
pub const FREQUENCY: PointGroup = PointGroup::new(40095, 40085, ValueKind::Int16, Some(40086), 1);
/// __R__ - Real power: total, A, B, C. Watts.
pub const POWER: PointGroup = PointGroup::new(40097, 40087, ValueKind::Int16, Some(40091), 4);
/// __R__ - Apparent power: total, A, B, C. VA.
pub const APPARENT_POWER: PointGroup =
    PointGroup::new(40105, 40092, ValueKind::Int16, Some(40096), 4);
/// __R__ - Reactive power: total, A, B, C. VAr.
pub const REACTIVE_POWER: PointGroup =
    PointGroup::new(40113, 40097, ValueKind::Int16, Some(40101), 4);
/// __R__ - Power factor: average, A, B, C. Percent.
pub const POWER_FACTOR: PointGroup =
    PointGroup::new(40121, 40102, ValueKind::Int16, Some(40106), 4);
/// __R__ - Real energy exported: total, A, B, C. Watt-hours.
pub const ENERGY_EXPORTED: PointGroup =
    PointGroup::new(40129, 40107, ValueKind::Acc32, Some(40123), 4);
/// __R__ - Real energy imported: total, A, B, C. Watt-hours.
pub const ENERGY_IMPORTED: PointGroup =
    PointGroup::new(40137, 40115, ValueKind::Acc32, Some(40123), 4);
/// __R__ - Apparent energy exported: total, A, B, C. VA-hours.
pub const APPARENT_ENERGY_EXPORTED: PointGroup =
    PointGroup::new(40145, 40124, ValueKind::Acc32, Some(40140), 4);
/// __R__ - Apparent energy imported: total, A, B, C. VA-hours.
pub const APPARENT_ENERGY_IMPORTED: PointGroup =
    PointGroup::new(40153, 40132, ValueKind::Acc32, Some(40140), 4);
/// __R__ - Meter event flags.
pub const EVENTS: PointGroup = PointGroup::new(40193, 40174, ValueKind::Uint32, None, 1);

/// __R__ - Reactive energy of one quadrant: total, A, B, C. VAr-hours.
pub const fn reactive_energy(quadrant: Quadrant) -> PointGroup {
    let (float_base, int_base) = match quadrant {
        Quadrant::Q1 => (40161, 40141),
        Quadrant::Q2 => (40169, 40149),
        Quadrant::Q3 => (40177, 40157),
        Quadrant::Q4 => (40185, 40165),
    };
    PointGroup::new(float_base, int_base, ValueKind::Acc32, Some(40173), 4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    const ENCODINGS: [Encoding; 2] = [Encoding::Float, Encoding::IntegerScaled];

    #[test]
    fn events_close_the_model() {
        for encoding in ENCODINGS {
            let events = EVENTS.point(0, encoding).unwrap();
            assert_eq!(events.window.end(), model_block(encoding).end());
        }
    }

    #[test]
    fn end_markers() {
        assert_eq!(end_marker(Encoding::Float).address, 40195);
        assert_eq!(end_marker(Encoding::IntegerScaled).address, 40176);
    }

    #[test]
    fn float_groups_are_contiguous() {
        let mut groups = vec![
            CURRENT,
            VOLTAGE_PHASE,
            VOLTAGE_LINE,
            FREQUENCY,
            POWER,
            APPARENT_POWER,
            REACTIVE_POWER,
            POWER_FACTOR,
            ENERGY_EXPORTED,
            ENERGY_IMPORTED,
            APPARENT_ENERGY_EXPORTED,
            APPARENT_ENERGY_IMPORTED,
        ];
        groups.extend(Quadrant::iter().map(reactive_energy));
        groups.push(EVENTS);

        let mut next = model_block(Encoding::Float).address;
        for group in groups {
            assert_eq!(group.float_base, next);
            next = group.float_base + 2 * group.members;
        }
        assert_eq!(next, model_block(Encoding::Float).end());
    }

    #[test]
    fn integer_scale_factors_follow_their_groups() {
        // Each scale factor sits right after the last member it scales.
        for (group, last) in [
            (CURRENT, CURRENT),
            (VOLTAGE_PHASE, VOLTAGE_LINE),
            (FREQUENCY, FREQUENCY),
            (POWER, POWER),
            (APPARENT_POWER, APPARENT_POWER),
            (REACTIVE_POWER, REACTIVE_POWER),
            (POWER_FACTOR, POWER_FACTOR),
            (ENERGY_EXPORTED, ENERGY_IMPORTED),
            (APPARENT_ENERGY_EXPORTED, APPARENT_ENERGY_IMPORTED),
            (reactive_energy(Quadrant::Q1), reactive_energy(Quadrant::Q4)),
        ] {
            let end = last
                .point(last.members - 1, Encoding::IntegerScaled)
                .unwrap()
                .window
                .end();
            assert_eq!(group.int_scale, Some(end));
        }
    }

    #[test]
    fn average_voltage_scenario_address() {
        let point = VOLTAGE_PHASE.point(0, Encoding::IntegerScaled).unwrap();
        assert_eq!(point.window.address, 40076);
        assert_eq!(point.scale_factor, Some(40084));
    }
}
