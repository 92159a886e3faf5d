//! Sense HAT peripheral
//!
//! Optional indicator and environment sensors, selected once at startup:
//! - [`Peripheral::Present`]: 8x8 LED matrix framebuffer plus IIO sensors
//! - [`Peripheral::Absent`]: no-op stand-in when the board is missing or disabled

mod led;
mod sensors;

pub use led::{Colour, LedMatrix};
pub use sensors::{EnvironmentReadings, EnvironmentSensors};

use focus_monitor::FocusStatus;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

/// Sense HAT error types
#[derive(Error, Debug)]
pub enum SenseHatError {
    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unparseable value {value:?} in {path}")]
    Parse { path: String, value: String },
}

/// Sense HAT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenseHatConfig {
    /// Probe for the board at startup
    pub enabled: bool,
    /// sysfs mount point
    pub sysfs_root: PathBuf,
    /// Device node directory (framebuffer)
    pub dev_root: PathBuf,
    /// CPU heat correction divisor
    pub temperature_factor: f32,
}

impl Default for SenseHatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sysfs_root: PathBuf::from("/sys"),
            dev_root: PathBuf::from("/dev"),
            temperature_factor: 1.3,
        }
    }
}

/// Detected Sense HAT
pub struct SenseHat {
    leds: LedMatrix,
    sensors: EnvironmentSensors,
}

impl SenseHat {
    pub fn open(config: &SenseHatConfig) -> Result<Self, SenseHatError> {
        let leds = LedMatrix::find(&config.sysfs_root, &config.dev_root)?;
        let sensors = EnvironmentSensors::find(&config.sysfs_root, config.temperature_factor);
        leds.clear()?;
        Ok(Self { leds, sensors })
    }

    pub fn leds(&self) -> &LedMatrix {
        &self.leds
    }

    pub fn sensors(&self) -> &EnvironmentSensors {
        &self.sensors
    }
}

impl Drop for SenseHat {
    fn drop(&mut self) {
        if let Err(e) = self.leds.clear() {
            warn!("Failed to clear LED matrix: {}", e);
        }
    }
}

/// Indicator capability
pub enum Peripheral {
    Present(SenseHat),
    Absent,
}

impl Peripheral {
    /// Probe once; any failure selects the no-op variant
    pub fn detect(config: &SenseHatConfig) -> Self {
        if !config.enabled {
            info!("Sense HAT disabled");
            return Peripheral::Absent;
        }
        match SenseHat::open(config) {
            Ok(hat) => {
                info!(framebuffer = %hat.leds.path().display(), "Sense HAT initialized");
                Peripheral::Present(hat)
            }
            Err(e) => {
                warn!("Sense HAT not available, running without indicator: {}", e);
                Peripheral::Absent
            }
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Peripheral::Present(_))
    }

    /// Show the status pattern; NO FACE clears the matrix
    pub fn set_status(&self, status: FocusStatus) -> Result<(), SenseHatError> {
        let Peripheral::Present(hat) = self else {
            return Ok(());
        };
        match led::status_colour(status) {
            Some(colour) => hat.leds.show_pattern(colour),
            None => hat.leds.clear(),
        }
    }

    pub fn clear(&self) -> Result<(), SenseHatError> {
        match self {
            Peripheral::Present(hat) => hat.leds.clear(),
            Peripheral::Absent => Ok(()),
        }
    }

    /// Corrected temperature and humidity; `None` fields when unavailable
    pub fn read_environment(&self) -> EnvironmentReadings {
        match self {
            Peripheral::Present(hat) => hat.sensors.read(),
            Peripheral::Absent => EnvironmentReadings::default(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::fs;
    use std::path::Path;

    pub fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// Framebuffer fb1 named like the Sense HAT driver
    pub fn fake_framebuffer(root: &Path) {
        write(root, "sys/class/graphics/fb0/name", "simple\n");
        write(root, "sys/class/graphics/fb1/name", "RPi-Sense FB\n");
        write(root, "dev/fb1", "");
    }

    pub fn fake_sensors(root: &Path) {
        let hts = "sys/bus/iio/devices/iio:device0";
        write(root, &format!("{}/name", hts), "hts221\n");
        write(root, &format!("{}/in_temp_raw", hts), "100\n");
        write(root, &format!("{}/in_temp_offset", hts), "2000\n");
        write(root, &format!("{}/in_temp_scale", hts), "10\n");
        write(root, &format!("{}/in_humidityrelative_raw", hts), "4567\n");
        write(root, &format!("{}/in_humidityrelative_scale", hts), "10\n");

        let lps = "sys/bus/iio/devices/iio:device1";
        write(root, &format!("{}/name", lps), "lps25h\n");
        write(root, &format!("{}/in_temp_raw", lps), "1000\n");
        write(root, &format!("{}/in_temp_scale", lps), "23\n");

        write(root, "sys/class/thermal/thermal_zone0/temp", "35000\n");
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::fs;

    fn config(root: &std::path::Path) -> SenseHatConfig {
        SenseHatConfig {
            sysfs_root: root.join("sys"),
            dev_root: root.join("dev"),
            ..Default::default()
        }
    }

    #[test]
    fn test_absent_when_disabled_or_missing() {
        let dir = tempfile::tempdir().unwrap();
        let disabled = SenseHatConfig {
            enabled: false,
            ..config(dir.path())
        };
        assert!(!Peripheral::detect(&disabled).is_present());
        assert!(!Peripheral::detect(&config(dir.path())).is_present());

        let absent = Peripheral::Absent;
        assert!(absent.set_status(FocusStatus::Focused).is_ok());
        assert!(absent.clear().is_ok());
        assert_eq!(absent.read_environment(), EnvironmentReadings::default());
    }

    #[test]
    fn test_status_drives_leds() {
        let dir = tempfile::tempdir().unwrap();
        fake_framebuffer(dir.path());
        let peripheral = Peripheral::detect(&config(dir.path()));
        assert!(peripheral.is_present());

        let fb = dir.path().join("dev/fb1");
        peripheral.set_status(FocusStatus::Focused).unwrap();
        let lit = fs::read(&fb).unwrap();
        assert_eq!(lit.len(), 128);
        assert!(lit.iter().any(|&b| b != 0));

        peripheral.set_status(FocusStatus::NoFace).unwrap();
        assert!(fs::read(&fb).unwrap().iter().all(|&b| b == 0));

        peripheral.set_status(FocusStatus::Drowsy).unwrap();
        assert_ne!(fs::read(&fb).unwrap(), lit);
    }

    #[test]
    fn test_drop_clears_leds() {
        let dir = tempfile::tempdir().unwrap();
        fake_framebuffer(dir.path());
        let peripheral = Peripheral::detect(&config(dir.path()));
        peripheral.set_status(FocusStatus::Distracted).unwrap();
        drop(peripheral);

        let fb = fs::read(dir.path().join("dev/fb1")).unwrap();
        assert!(fb.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_environment_through_peripheral() {
        let dir = tempfile::tempdir().unwrap();
        fake_framebuffer(dir.path());
        fake_sensors(dir.path());
        let peripheral = Peripheral::detect(&config(dir.path()));

        let readings = peripheral.read_environment();
        assert_eq!(readings.temperature, Some(12.0));
        assert_eq!(readings.humidity, Some(45.67));
    }
}
