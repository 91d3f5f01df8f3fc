//! A single LiDAR return

/// One LiDAR return in the sensor frame.
///
/// Coordinates are metres. Intensity is the sensor's reflectivity byte and
/// travels on the wire, but frame reconstruction only keeps the coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: u8,
}

impl Point {
    pub const fn new(x: f32, y: f32, z: f32, intensity: u8) -> Self {
        Self { x, y, z, intensity }
    }

    /// Coordinates as an `[x, y, z]` triple
    pub const fn xyz(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f32; 3]> for Point {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z, intensity: 0 }
    }
}
