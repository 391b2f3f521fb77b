//! Integer chunk grid coordinates

use glam::Vec3;

use crate::math::Aabb;

/// Integer coordinate identifying a chunk in the world grid
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkCoord {
    /// Create a new chunk coordinate
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Chunk containing a world position
    pub fn from_world_pos(pos: Vec3, chunk_size: u32) -> Self {
        let size = chunk_size as f32;
        Self {
            x: (pos.x / size).floor() as i32,
            y: (pos.y / size).floor() as i32,
            z: (pos.z / size).floor() as i32,
        }
    }

    /// World-space minimum corner of this chunk
    pub fn world_origin(&self, chunk_size: u32) -> Vec3 {
        Vec3::new(self.x as f32, self.y as f32, self.z as f32) * chunk_size as f32
    }

    /// World-space bounds of this chunk
    pub fn bounds(&self, chunk_size: u32) -> Aabb {
        let origin = self.world_origin(chunk_size);
        Aabb::new(origin, origin + Vec3::splat(chunk_size as f32))
    }
}

impl std::fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_world_pos_floors() {
        assert_eq!(ChunkCoord::from_world_pos(Vec3::new(0.0, 15.9, 16.0), 16), ChunkCoord::new(0, 0, 1));
        assert_eq!(ChunkCoord::from_world_pos(Vec3::new(-0.1, -16.0, -16.1), 16), ChunkCoord::new(-1, -1, -2));
    }

    #[test]
    fn test_origin_and_bounds() {
        let coord = ChunkCoord::new(-2, 1, 3);
        assert_eq!(coord.world_origin(8), Vec3::new(-16.0, 8.0, 24.0));
        let bounds = coord.bounds(8);
        assert_eq!(bounds.size(), Vec3::splat(8.0));
        assert!(bounds.contains_point(Vec3::new(-12.0, 12.0, 28.0)));
        assert_eq!(ChunkCoord::from_world_pos(bounds.center(), 8), coord);
    }
}
