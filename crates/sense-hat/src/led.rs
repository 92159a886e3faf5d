//! 8x8 LED matrix through the `rpisense-fb` framebuffer

use focus_monitor::FocusStatus;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::SenseHatError;

const FRAMEBUFFER_NAME: &str = "RPi-Sense FB";
const PIXELS: usize = 64;

/// RGB colour, 8 bits per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Colour(pub u8, pub u8, pub u8);

impl Colour {
    pub const OFF: Colour = Colour(0, 0, 0);

    /// RGB565 as stored by the framebuffer
    pub fn to_rgb565(self) -> u16 {
        ((self.0 as u16 >> 3) << 11) | ((self.1 as u16 >> 2) << 5) | (self.2 as u16 >> 3)
    }
}

/// Dimmed status colours; `None` means the matrix stays dark
pub(crate) fn status_colour(status: FocusStatus) -> Option<Colour> {
    match status {
        FocusStatus::Focused => Some(Colour(0, 100, 0)),
        FocusStatus::Distracted => Some(Colour(100, 60, 0)),
        FocusStatus::Drowsy => Some(Colour(100, 0, 0)),
        FocusStatus::NoFace => None,
    }
}

// Flower, row-major; true = lit
#[rustfmt::skip]
const PATTERN: [u8; 8] = [
    0b1001_1001,
    0b0101_1010,
    0b0011_1100,
    0b1110_0111,
    0b1110_0111,
    0b0011_1100,
    0b0101_1010,
    0b1001_1001,
];

fn pattern_pixels(colour: Colour) -> [Colour; PIXELS] {
    let mut pixels = [Colour::OFF; PIXELS];
    for (row, bits) in PATTERN.iter().enumerate() {
        for col in 0..8 {
            if bits & (0x80 >> col) != 0 {
                pixels[row * 8 + col] = colour;
            }
        }
    }
    pixels
}

/// LED matrix framebuffer device
#[derive(Debug, Clone)]
pub struct LedMatrix {
    path: PathBuf,
}

impl LedMatrix {
    /// Locate the Sense HAT framebuffer among `/sys/class/graphics/fb*`
    pub fn find(sysfs_root: &Path, dev_root: &Path) -> Result<Self, SenseHatError> {
        let graphics = sysfs_root.join("class/graphics");
        let entries = fs::read_dir(&graphics).map_err(|e| {
            SenseHatError::NotFound(format!("{}: {}", graphics.display(), e))
        })?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("fb"))
            .collect();
        names.sort();

        names
            .into_iter()
            .find(|fb| {
                fs::read_to_string(graphics.join(fb).join("name"))
                    .map(|name| name.trim() == FRAMEBUFFER_NAME)
                    .unwrap_or(false)
            })
            .map(|fb| Self {
                path: dev_root.join(fb),
            })
            .ok_or_else(|| SenseHatError::NotFound(format!("no {:?} framebuffer", FRAMEBUFFER_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_pixels(&self, pixels: &[Colour; PIXELS]) -> Result<(), SenseHatError> {
        let buffer: Vec<u8> = pixels
            .iter()
            .flat_map(|c| c.to_rgb565().to_le_bytes())
            .collect();

        let io_err = |source| SenseHatError::Io {
            path: self.path.display().to_string(),
            source,
        };
        let mut device = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(io_err)?;
        device.write_all(&buffer).map_err(io_err)
    }

    pub fn show_pattern(&self, colour: Colour) -> Result<(), SenseHatError> {
        self.set_pixels(&pattern_pixels(colour))
    }

    pub fn clear(&self) -> Result<(), SenseHatError> {
        self.set_pixels(&[Colour::OFF; PIXELS])
    }
}
