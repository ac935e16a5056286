use std::fmt;

use serde::{Deserialize, Serialize};

/// A point on the globe, decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.lat, self.lon)
    }
}

/// OpenWeather reports temperatures in Kelvin; conversion happens at the
/// presentation edge only.
pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - 273.15
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kelvin_conversion() {
        assert!((kelvin_to_celsius(273.15) - 0.0).abs() < f64::EPSILON);
        assert!((kelvin_to_celsius(293.15) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn coordinates_display_is_compact() {
        let c = Coordinates::new(48.8534, 2.3488);
        assert_eq!(c.to_string(), "48.8534, 2.3488");
    }
}
