//! Temperature conversion between the unit's Fahrenheit and canonical Celsius

/// Lowest target the unit accepts, °C
pub const MIN_TARGET_CELSIUS: f64 = 16.0;

/// Highest target the unit accepts, °C
pub const MAX_TARGET_CELSIUS: f64 = 30.0;

pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Round to the nearest multiple of `step`
pub fn round_to(value: f64, step: f64) -> f64 {
    (value / step).round() * step
}

/// Canonical target temperature: 0.5 °C steps, clamped to the unit's range
pub fn normalize_target(celsius: f64) -> f64 {
    round_to(celsius, 0.5).clamp(MIN_TARGET_CELSIUS, MAX_TARGET_CELSIUS)
}

/// Canonical measured temperature: 0.1 °C steps
pub fn normalize_reading(celsius: f64) -> f64 {
    (celsius * 10.0).round() / 10.0
}

/// Whole degrees Fahrenheit for a canonical target, as the unit expects
pub fn target_to_wire(celsius: f64) -> f64 {
    celsius_to_fahrenheit(celsius).round()
}

/// Canonical target for a whole-°F reading.
///
/// Several 0.5 °C steps share one whole °F, so `current` is kept when it
/// already encodes to `fahrenheit`.
pub fn target_from_wire(fahrenheit: f64, current: f64) -> f64 {
    if current.is_finite() && target_to_wire(current) == fahrenheit.round() {
        return current;
    }
    normalize_target(fahrenheit_to_celsius(fahrenheit))
}
