// src/device.rs

//! Device configuration snapshot refreshed on `ConfigChanged`.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
    Square,
}

/// The subset of the device configuration an application typically reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfiguration {
    pub orientation: Orientation,
    /// Screen density in dots per inch.
    pub density_dpi: u32,
    /// BCP-47 language tag, e.g. "en-US".
    pub locale: String,
    pub night_mode: bool,
    pub screen_width_dp: u32,
    pub screen_height_dp: u32,
}

impl Default for DeviceConfiguration {
    fn default() -> Self {
        DeviceConfiguration {
            orientation: Orientation::Portrait,
            density_dpi: 160, // mdpi baseline
            locale: "en-US".to_string(),
            night_mode: false,
            screen_width_dp: 360,
            screen_height_dp: 640,
        }
    }
}

impl fmt::Display for DeviceConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "orientation={:?} dpi={} locale={} night={} size={}x{}dp",
            self.orientation,
            self.density_dpi,
            self.locale,
            self.night_mode,
            self.screen_width_dp,
            self.screen_height_dp
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_in_defaults() {
        let cfg: DeviceConfiguration =
            serde_json::from_str(r#"{"orientation":"Landscape","night_mode":true}"#).unwrap();
        assert_eq!(cfg.orientation, Orientation::Landscape);
        assert!(cfg.night_mode);
        assert_eq!(cfg.density_dpi, 160);
        assert_eq!(cfg.locale, "en-US");
    }

    #[test]
    fn display_is_a_single_line_summary() {
        let line = DeviceConfiguration::default().to_string();
        assert_eq!(
            line,
            "orientation=Portrait dpi=160 locale=en-US night=false size=360x640dp"
        );
    }
}
