use serde::{Deserialize, Serialize};

/// Map coordinate on the square grid, row-major from the north-west corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance; one step in any of the eight directions costs one.
    pub fn distance(self, other: Coord) -> u32 {
        let dx = (self.x - other.x).unsigned_abs();
        let dy = (self.y - other.y).unsigned_abs();
        dx.max(dy)
    }

    pub fn is_adjacent(self, other: Coord) -> bool {
        self != other && self.distance(other) == 1
    }

    /// The eight surrounding coordinates in a fixed clockwise order
    /// starting north. Callers filter off-map results.
    pub fn neighbors(self) -> [Coord; 8] {
        let Coord { x, y } = self;
        [
            Coord::new(x, y - 1),
            Coord::new(x + 1, y - 1),
            Coord::new(x + 1, y),
            Coord::new(x + 1, y + 1),
            Coord::new(x, y + 1),
            Coord::new(x - 1, y + 1),
            Coord::new(x - 1, y),
            Coord::new(x - 1, y - 1),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacency_is_eight_way() {
        let c = Coord::new(4, 4);
        for n in c.neighbors() {
            assert!(c.is_adjacent(n));
        }
        assert!(!c.is_adjacent(c));
        assert!(!c.is_adjacent(Coord::new(6, 4)));
    }

    #[test]
    fn distance_is_chebyshev() {
        assert_eq!(Coord::new(0, 0).distance(Coord::new(3, 1)), 3);
        assert_eq!(Coord::new(2, 2).distance(Coord::new(2, 2)), 0);
    }
}
