//! Integer codes shared by the cell and agent record layouts.
//!
//! Every enumeration here maps one-to-one onto the integers stored in state
//! buffers and in the grid encoding. The indices are part of the wire format
//! and must never be reordered.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default tile size, in pixels, used when rendering.
pub const TILE_PIXELS: usize = 32;

macro_rules! indexed_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $field:literal {
            $($variant:ident = $index:literal => $label:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            /// All variants in index order.
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// Integer code stored in state buffers.
            pub const fn to_index(self) -> i32 {
                match self {
                    $($name::$variant => $index,)+
                }
            }

            /// Looks a variant up by its integer code.
            pub fn from_index(index: i32) -> Result<Self> {
                match index {
                    $($index => Ok($name::$variant),)+
                    _ => Err(Error::invalid($field, index)),
                }
            }

            pub const fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($label => Ok($name::$variant),)+
                    _ => Err(Error::invalid($field, s)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

indexed_enum! {
    /// Kind of object occupying a cell.
    ObjType, "type" {
        Unseen = 0 => "unseen",
        Empty = 1 => "empty",
        Wall = 2 => "wall",
        Floor = 3 => "floor",
        Door = 4 => "door",
        Key = 5 => "key",
        Ball = 6 => "ball",
        Box = 7 => "box",
        Goal = 8 => "goal",
        Lava = 9 => "lava",
        Agent = 10 => "agent",
    }
}

indexed_enum! {
    /// Object and agent colors.
    Color, "color" {
        Red = 0 => "red",
        Green = 1 => "green",
        Blue = 2 => "blue",
        Purple = 3 => "purple",
        Yellow = 4 => "yellow",
        Grey = 5 => "grey",
    }
}

indexed_enum! {
    /// Facing of an agent, clockwise from east.
    Direction, "dir" {
        Right = 0 => "right",
        Down = 1 => "down",
        Left = 2 => "left",
        Up = 3 => "up",
    }
}

indexed_enum! {
    /// Auxiliary state of a door, stored in the cell record's aux slot.
    DoorState, "door state" {
        Open = 0 => "open",
        Closed = 1 => "closed",
        Locked = 2 => "locked",
    }
}

impl Color {
    pub const fn rgb(self) -> [u8; 3] {
        match self {
            Color::Red => [255, 0, 0],
            Color::Green => [0, 255, 0],
            Color::Blue => [0, 0, 255],
            Color::Purple => [112, 39, 195],
            Color::Yellow => [255, 255, 0],
            Color::Grey => [100, 100, 100],
        }
    }

    /// Deterministic default color for the record at flat index `index`.
    pub fn cycle(index: usize) -> Self {
        Color::ALL[index % Color::ALL.len()]
    }
}

impl Direction {
    /// Unit step taken when moving forward in this direction.
    pub const fn to_vec(self) -> (i32, i32) {
        match self {
            Direction::Right => (1, 0),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Up => (0, -1),
        }
    }

    /// Direction after a quarter turn clockwise.
    pub fn turn_right(self) -> Self {
        Direction::ALL[(self.to_index() as usize + 1) % 4]
    }

    /// Direction after a quarter turn counter-clockwise.
    pub fn turn_left(self) -> Self {
        Direction::ALL[(self.to_index() as usize + 3) % 4]
    }
}

impl ObjType {
    /// Whether an agent may step onto a cell holding this kind.
    ///
    /// Doors depend on their aux state; see [`crate::world_object::WorldObj::can_overlap`].
    pub const fn can_overlap(self) -> bool {
        matches!(
            self,
            ObjType::Empty | ObjType::Floor | ObjType::Goal | ObjType::Lava
        )
    }

    pub const fn can_pickup(self) -> bool {
        matches!(self, ObjType::Key | ObjType::Ball | ObjType::Box)
    }

    pub const fn can_contain(self) -> bool {
        matches!(self, ObjType::Box)
    }

    /// Default color for a freshly constructed object of this kind.
    pub const fn default_color(self) -> Color {
        match self {
            ObjType::Wall => Color::Grey,
            ObjType::Goal => Color::Green,
            ObjType::Lava => Color::Red,
            ObjType::Box => Color::Yellow,
            ObjType::Agent => Color::Red,
            _ => Color::Blue,
        }
    }
}
