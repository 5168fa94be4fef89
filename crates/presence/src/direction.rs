use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[serde(alias = "n", alias = "up")]
    North,
    #[serde(alias = "ne", alias = "up_right")]
    NorthEast,
    #[serde(alias = "e", alias = "right")]
    East,
    #[serde(alias = "se", alias = "down_right")]
    SouthEast,
    #[default]
    #[serde(alias = "s", alias = "down")]
    South,
    #[serde(alias = "sw", alias = "down_left")]
    SouthWest,
    #[serde(alias = "w", alias = "left")]
    West,
    #[serde(alias = "nw", alias = "up_left")]
    NorthWest,
}

/// How west-leaning facings are produced from the loaded art.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorPolicy {
    /// Every facing has its own frames.
    PreMirrored,
    /// West-leaning facings reuse the east-leaning frames, flipped horizontally.
    #[default]
    MirrorWestFromEast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacingVisual {
    pub art_direction: Direction,
    pub flip_x: bool,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Self::North => "north",
            Self::NorthEast => "north_east",
            Self::East => "east",
            Self::SouthEast => "south_east",
            Self::South => "south",
            Self::SouthWest => "south_west",
            Self::West => "west",
            Self::NorthWest => "north_west",
        }
    }

    pub fn is_west_leaning(self) -> bool {
        matches!(self, Self::SouthWest | Self::West | Self::NorthWest)
    }

    pub fn mirrored(self) -> Direction {
        match self {
            Self::North => Self::North,
            Self::NorthEast => Self::NorthWest,
            Self::East => Self::West,
            Self::SouthEast => Self::SouthWest,
            Self::South => Self::South,
            Self::SouthWest => Self::SouthEast,
            Self::West => Self::East,
            Self::NorthWest => Self::NorthEast,
        }
    }

    pub fn visual(self, policy: MirrorPolicy) -> FacingVisual {
        match policy {
            MirrorPolicy::PreMirrored => FacingVisual {
                art_direction: self,
                flip_x: false,
            },
            MirrorPolicy::MirrorWestFromEast if self.is_west_leaning() => FacingVisual {
                art_direction: self.mirrored(),
                flip_x: true,
            },
            MirrorPolicy::MirrorWestFromEast => FacingVisual {
                art_direction: self,
                flip_x: false,
            },
        }
    }
}
