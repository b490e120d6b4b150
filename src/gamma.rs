//! Gamma correction from logical brightness to 16-bit grayscale.

use crate::types::{BRG_MAX, Brightness};

/// Gamma 2.2 lookup, 101 steps over `0..=65535`.
pub const LINEARIZATION_TABLE: [u16; BRG_MAX as usize + 1] = [
    0, 3, 12, 29, 55, 90, 134, 189, 253, 328, 413, 510, 618, 736, 867, 1009, 1163, //
    1329, 1507, 1697, 1900, 2115, 2343, 2584, 2838, 3104, 3384, 3677, 3983, 4303, 4636, 4983, 5343, 5717, //
    6106, 6508, 6924, 7354, 7798, 8257, 8730, 9217, 9719, 10235, 10766, 11312, 11872, 12448, 13038, 13643, 14263, //
    14898, 15548, 16214, 16894, 17590, 18302, 19028, 19770, 20528, 21301, 22090, 22895, 23715, 24551, 25403, 26271, 27154, //
    28054, 28970, 29901, 30849, 31813, 32793, 33790, 34802, 35831, 36877, 37939, 39017, 40112, 41223, 42351, 43496, 44657, //
    45835, 47029, 48241, 49469, 50714, 51976, 53255, 54551, 55864, 57195, 58542, 59906, 61287, 62686, 64102, 65535,
];

/// Converts a logical brightness into the grayscale value sent to the driver.
///
/// # Panics
/// Panics if `brightness > BRG_MAX`. Validated input never produces such a value.
#[inline]
pub fn linearize(brightness: Brightness) -> u16 {
    LINEARIZATION_TABLE[usize::from(brightness)]
}
