//! Sample and frame types exchanged with the arm and camera drivers.
//!
//! The recorder never interprets these values: units and coordinate frames
//! belong to the drivers that produce them.

use serde::{Deserialize, Serialize};

/// Number of components in one arm state reading (six pose values + gripper).
pub const STATE_DIM: usize = 7;

/// Instantaneous arm pose and gripper state at one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateSample(pub [f64; STATE_DIM]);

impl StateSample {
    pub fn new(values: [f64; STATE_DIM]) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[f64; STATE_DIM] {
        &self.0
    }

    /// Gripper opening, the last component.
    pub fn gripper(&self) -> f64 {
        self.0[STATE_DIM - 1]
    }
}

/// Channel order of an 8-bit, three-channel image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Bgr8,
    Rgb8,
}

/// A frame as delivered by the camera driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Byte length a packed frame of these dimensions should have.
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }
}

/// A color frame normalized to RGB channel order.
///
/// Only [`to_canonical_color`] constructs frames, so every stored frame is RGB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    width: u32,
    height: u32,
    #[serde(with = "base64_bytes")]
    data: Vec<u8>,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Packed RGB bytes, row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// RGB triple at `(x, y)`, if inside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        let px = self.data.get(offset..offset + 3)?;
        Some([px[0], px[1], px[2]])
    }
}

/// Convert a driver frame to canonical RGB order.
pub fn to_canonical_color(raw: RawFrame) -> Frame {
    let RawFrame {
        width,
        height,
        format,
        mut data,
    } = raw;

    if format == PixelFormat::Bgr8 {
        for px in data.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
    }

    Frame {
        width,
        height,
        data,
    }
}

/// Pixel payloads are stored as base64 text in JSON.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
