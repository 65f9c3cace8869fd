//! Eddie control board attributes
//!
//! Fixed properties of the board and its firmware, shared by the driver and
//! the sensor interpretation code.

/// Potential GPIO pins
pub const GPIO_COUNT: usize = 10;

/// ADC channels
pub const ADC_PIN_COUNT: usize = 8;

/// Potential digital pins
pub const DIGITAL_PIN_COUNT: usize = 10;

/// Switchable auxiliary power ports
pub const AUXILIARY_POWER_RELAY_COUNT: usize = 3;

/// Firmware serial buffer size
pub const PARALLAX_MAX_BUFFER: usize = 256;

/// One encoder per wheel
pub const ENCODER_COUNT: usize = 2;

/// ADC counts per volt
pub const ADC_COUNTS_PER_VOLT: f64 = 819.0;

/// The battery channel reads a divided-down voltage
pub const BATTERY_VOLTAGE_MULTIPLIER: f64 = 3.21;

/// IR readings at or below this many counts are noise
pub const IR_NOISE_FLOOR: u16 = 10;

/// STOP distance that halts the wheels at once
pub const STOP_DISTANCE_IMMEDIATE: i32 = 0;

/// GO power ceiling
pub const MOTOR_POWER_MAX_FORWARD: i32 = 127;

/// The firmware accepts -128, clipped to keep forward and reverse symmetric
pub const MOTOR_POWER_MAX_REVERSE: i32 = -127;

/// GOSPD speed and TRVL/TURN distance limits
pub const TRAVEL_SPEED_MAX_FORWARD: i32 = 32767;

/// GOSPD speed and TRVL/TURN distance floor
pub const TRAVEL_SPEED_MAX_REVERSE: i32 = -32767;

/// TRVL/TURN speed ceiling
pub const TRAVEL_MAX_SPEED: i32 = 65535;

/// STOP distance ceiling
pub const STOP_MAX_DISTANCE: i32 = 65535;

/// ACC ramp value ceiling
pub const RAMP_MAX_RATE: i32 = 255;

/// GPIO commands take a 20-bit mask
pub const GPIO_MASK_MAX: i32 = 0xFFFFF;

/// 3.3V solid state relay
pub const RELAY_33V_PIN_NUMBER: u8 = 16;

/// 5V solid state relay
pub const RELAY_5V_PIN_NUMBER: u8 = 17;

/// 12V solid state relay
pub const RELAY_12V_PIN_NUMBER: u8 = 18;

/// Default wheel radius in meters
pub const DEFAULT_WHEEL_RADIUS: f64 = 0.0762;

/// Encoder ticks per wheel revolution
pub const DEFAULT_TICKS_PER_REVOLUTION: u32 = 36;

/// Distance covered per encoder tick with the default wheels, in meters
pub fn meters_per_tick() -> f64 {
    2.0 * std::f64::consts::PI * DEFAULT_WHEEL_RADIUS / DEFAULT_TICKS_PER_REVOLUTION as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_pins_are_distinct() {
        let pins = [
            RELAY_33V_PIN_NUMBER,
            RELAY_5V_PIN_NUMBER,
            RELAY_12V_PIN_NUMBER,
        ];
        assert_eq!(pins, [16, 17, 18]);
        assert!(pins.iter().all(|p| (1i32 << p) <= GPIO_MASK_MAX));
    }

    #[test]
    fn test_immediate_stop_is_a_valid_stop_distance() {
        assert_eq!(STOP_DISTANCE_IMMEDIATE, 0);
        assert!((0..=STOP_MAX_DISTANCE).contains(&STOP_DISTANCE_IMMEDIATE));
    }

    #[test]
    fn test_meters_per_tick() {
        let d = meters_per_tick();
        assert!((d - 0.0133).abs() < 0.0001);
    }
}
