//! ADC interpretation
//!
//! The stock sensor layout puts IR distance sensors on every ADC channel but
//! the last, which reads the battery through a divider. Boards wired
//! differently should interpret [`SensorArray`] values themselves.

use serde::Serialize;

use crate::board::attributes::{ADC_COUNTS_PER_VOLT, BATTERY_VOLTAGE_MULTIPLIER, IR_NOISE_FLOOR};
use crate::board::SensorArray;

/// Voltages derived from one ADC read
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdcSummary {
    /// IR sensor voltages, noise readings removed
    pub ir_voltages: Vec<f64>,
    /// Battery voltage
    pub battery_level: f64,
}

/// Convert ADC counts to volts
pub fn counts_to_volts(counts: u16) -> f64 {
    counts as f64 / ADC_COUNTS_PER_VOLT
}

/// Interpret a successful ADC array. Returns `None` for failed or empty reads.
pub fn interpret_adc(array: &SensorArray) -> Option<AdcSummary> {
    if !array.is_success() {
        return None;
    }
    let (battery, ir) = array.values.split_last()?;

    let ir_voltages = ir
        .iter()
        .filter(|counts| **counts > IR_NOISE_FLOOR)
        .map(|counts| counts_to_volts(*counts))
        .collect();

    Some(AdcSummary {
        ir_voltages,
        battery_level: counts_to_volts(*battery) * BATTERY_VOLTAGE_MULTIPLIER,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::ArrayStatus;

    fn success(values: Vec<u16>) -> SensorArray {
        SensorArray {
            status: ArrayStatus::Success,
            values,
        }
    }

    #[test]
    fn test_interpret_board_sample() {
        // 9C7 11E E4E 5AB 20F 97B 767 058
        let array = success(vec![0x9C7, 0x11E, 0xE4E, 0x5AB, 0x20F, 0x97B, 0x767, 0x058]);
        let summary = interpret_adc(&array).unwrap();
        assert_eq!(summary.ir_voltages.len(), 7);
        assert!((summary.ir_voltages[0] - 2503.0 / 819.0).abs() < 1e-9);
        assert!((summary.battery_level - 88.0 / 819.0 * 3.21).abs() < 1e-9);
    }

    #[test]
    fn test_noise_readings_dropped() {
        let summary = interpret_adc(&success(vec![5, 10, 11, 4000])).unwrap();
        assert_eq!(summary.ir_voltages, vec![11.0 / 819.0]);
    }

    #[test]
    fn test_failed_reads_are_skipped() {
        assert!(interpret_adc(&SensorArray {
            status: ArrayStatus::Error("ERROR\r".into()),
            values: vec![],
        })
        .is_none());
        assert!(interpret_adc(&success(vec![])).is_none());
    }

    #[test]
    fn test_single_channel_is_battery() {
        let summary = interpret_adc(&success(vec![819])).unwrap();
        assert!(summary.ir_voltages.is_empty());
        assert!((summary.battery_level - 3.21).abs() < 1e-9);
    }
}
