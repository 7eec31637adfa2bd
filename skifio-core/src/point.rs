//! Hardware sample codes and the voltage conversions between them.

use crate::constants::{ADC_COUNT, ADC_STEP_UV, DAC_CODE_SHIFT, DAC_STEP_UV};

/// A signed 32-bit hardware code for one sample on one channel.
///
/// This is the unit the MCU side always deals in; voltage conversion only
/// happens on the host.
pub type Point = i32;

/// `ADC_COUNT` points produced together on a single sample tick.
///
/// Stored as one record in the MCU's ADC ring buffer so the six channels
/// never drift out of per-tick alignment with each other.
pub type AdcArray = [Point; ADC_COUNT];

/// Convert a DAC output voltage to the hardware code written over SPI.
///
/// `code = DAC_CODE_SHIFT + round(volts * 1e6 / DAC_STEP_UV)`
pub fn volts_to_dac_code(volts: f64) -> Point {
    let raw = DAC_CODE_SHIFT as f64 + libm::round(volts * 1e6 / DAC_STEP_UV);
    raw as Point
}

/// Convert an ADC hardware code read over SPI to a voltage.
///
/// `volts = (code / 256) * ADC_STEP_UV * 1e-6`
pub fn adc_code_to_volts(code: Point) -> f64 {
    (code as f64 / 256.0) * ADC_STEP_UV * 1e-6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dac_zero_volts_is_shift() {
        assert_eq!(volts_to_dac_code(0.0), DAC_CODE_SHIFT);
    }

    #[test]
    fn dac_round_trip_is_monotonic() {
        let a = volts_to_dac_code(-1.0);
        let b = volts_to_dac_code(0.0);
        let c = volts_to_dac_code(1.0);
        assert!(a < b && b < c);
    }

    #[test]
    fn adc_zero_code_is_zero_volts() {
        assert_eq!(adc_code_to_volts(0), 0.0);
    }

    #[test]
    fn adc_code_scales_linearly() {
        let v1 = adc_code_to_volts(256);
        let v2 = adc_code_to_volts(512);
        assert!((v2 - 2.0 * v1).abs() < 1e-12);
    }
}
