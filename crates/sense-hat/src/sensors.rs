//! Environment sensors (HTS221 humidity, LPS25H pressure) via Linux IIO

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::SenseHatError;

const HUMIDITY_SENSOR: &str = "hts221";
const PRESSURE_SENSOR: &str = "lps25h";

/// Corrected readings, rounded to 2 decimals
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EnvironmentReadings {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
}

fn round2(value: f64) -> f32 {
    ((value * 100.0).round() / 100.0) as f32
}

fn read_number(path: &Path) -> Result<f64, SenseHatError> {
    let text = fs::read_to_string(path).map_err(|source| SenseHatError::Io {
        path: path.display().to_string(),
        source,
    })?;
    text.trim().parse().map_err(|_| SenseHatError::Parse {
        path: path.display().to_string(),
        value: text.trim().to_string(),
    })
}

/// One IIO device directory
#[derive(Debug, Clone)]
struct IioDevice {
    dir: PathBuf,
}

impl IioDevice {
    /// Processed channel value: `(raw + offset) * scale`, in milli-units
    fn channel(&self, channel: &str) -> Result<f64, SenseHatError> {
        let raw = read_number(&self.dir.join(format!("in_{}_raw", channel)))?;
        let offset = read_number(&self.dir.join(format!("in_{}_offset", channel))).unwrap_or(0.0);
        let scale = read_number(&self.dir.join(format!("in_{}_scale", channel))).unwrap_or(1.0);
        Ok((raw + offset) * scale)
    }

    fn temperature(&self) -> Result<f64, SenseHatError> {
        Ok(self.channel("temp")? / 1000.0)
    }

    fn humidity(&self) -> Result<f64, SenseHatError> {
        Ok(self.channel("humidityrelative")? / 1000.0)
    }
}

fn find_iio(sysfs_root: &Path, name: &str) -> Option<IioDevice> {
    let devices = sysfs_root.join("bus/iio/devices");
    let mut dirs: Vec<PathBuf> = fs::read_dir(devices)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    dirs.sort();

    dirs.into_iter()
        .find(|dir| {
            fs::read_to_string(dir.join("name"))
                .map(|n| n.trim() == name)
                .unwrap_or(false)
        })
        .map(|dir| IioDevice { dir })
}

/// Temperature and humidity with CPU heat correction
#[derive(Debug, Clone)]
pub struct EnvironmentSensors {
    humidity_sensor: Option<IioDevice>,
    pressure_sensor: Option<IioDevice>,
    cpu_temp_path: PathBuf,
    factor: f64,
}

impl EnvironmentSensors {
    pub fn find(sysfs_root: &Path, factor: f32) -> Self {
        let humidity_sensor = find_iio(sysfs_root, HUMIDITY_SENSOR);
        let pressure_sensor = find_iio(sysfs_root, PRESSURE_SENSOR);
        debug!(
            hts221 = humidity_sensor.is_some(),
            lps25h = pressure_sensor.is_some(),
            "Environment sensors probed"
        );

        Self {
            humidity_sensor,
            pressure_sensor,
            cpu_temp_path: sysfs_root.join("class/thermal/thermal_zone0/temp"),
            factor: factor as f64,
        }
    }

    fn cpu_temperature(&self) -> Option<f64> {
        read_number(&self.cpu_temp_path)
            .map(|milli| milli / 1000.0)
            .map_err(|e| debug!("CPU temperature unavailable: {}", e))
            .ok()
    }

    /// Mean of both sensor temperatures (either alone if the other fails)
    fn raw_temperature(&self) -> Option<f64> {
        let readings: Vec<f64> = [&self.humidity_sensor, &self.pressure_sensor]
            .into_iter()
            .flatten()
            .filter_map(|device| {
                device
                    .temperature()
                    .map_err(|e| debug!("Temperature read failed: {}", e))
                    .ok()
            })
            .collect();

        if readings.is_empty() {
            None
        } else {
            Some(readings.iter().sum::<f64>() / readings.len() as f64)
        }
    }

    pub fn read(&self) -> EnvironmentReadings {
        let temperature = self.raw_temperature().map(|raw| {
            let corrected = match self.cpu_temperature() {
                Some(cpu) => correct_temperature(raw, cpu, self.factor),
                None => raw,
            };
            debug!(raw, corrected, "Temperature read");
            round2(corrected)
        });

        let humidity = self.humidity_sensor.as_ref().and_then(|device| {
            device
                .humidity()
                .map_err(|e| debug!("Humidity read failed: {}", e))
                .ok()
                .map(round2)
        });

        EnvironmentReadings {
            temperature,
            humidity,
        }
    }
}

/// Remove the CPU's heat bleed from the board temperature
pub fn correct_temperature(raw: f64, cpu: f64, factor: f64) -> f64 {
    raw - (cpu - raw) / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_sensors, write};

    #[test]
    fn test_correction_formula() {
        assert!((correct_temperature(30.0, 56.0, 1.3) - 10.0).abs() < 1e-9);
        assert_eq!(round2(21.4567), 21.46);
    }

    #[test]
    fn test_reads_and_corrects() {
        let dir = tempfile::tempdir().unwrap();
        fake_sensors(dir.path());
        let sensors = EnvironmentSensors::find(&dir.path().join("sys"), 1.3);

        // Board (21 + 23) / 2 = 22, CPU 35 -> 22 - 13 / 1.3 = 12
        let readings = sensors.read();
        assert_eq!(readings.temperature, Some(12.0));
        assert_eq!(readings.humidity, Some(45.67));
    }

    #[test]
    fn test_without_cpu_temperature_is_uncorrected() {
        let dir = tempfile::tempdir().unwrap();
        fake_sensors(dir.path());
        fs::remove_file(dir.path().join("sys/class/thermal/thermal_zone0/temp")).unwrap();

        let readings = EnvironmentSensors::find(&dir.path().join("sys"), 1.3).read();
        assert_eq!(readings.temperature, Some(22.0));
    }

    #[test]
    fn test_single_sensor_and_garbage() {
        let dir = tempfile::tempdir().unwrap();
        fake_sensors(dir.path());
        // Pressure sensor temperature unreadable, humidity garbage
        write(dir.path(), "sys/bus/iio/devices/iio:device1/in_temp_raw", "oops\n");
        write(dir.path(), "sys/bus/iio/devices/iio:device0/in_humidityrelative_raw", "n/a\n");

        let readings = EnvironmentSensors::find(&dir.path().join("sys"), 1.3).read();
        // hts221 alone: 21 - (35 - 21) / 1.3
        assert_eq!(readings.temperature, Some(round2(21.0 - 14.0 / 1.3)));
        assert_eq!(readings.humidity, None);
    }

    #[test]
    fn test_no_sensors() {
        let dir = tempfile::tempdir().unwrap();
        let readings = EnvironmentSensors::find(dir.path(), 1.3).read();
        assert_eq!(readings, EnvironmentReadings::default());
    }
}
