//! Hardware sink for chain frames.

use crate::types::{CHAIN_SIZE, LED_COUNT};

/// Gamma-corrected grayscale values of one chain, indexed `[board][led]`.
pub type ChainFrame = [[u16; LED_COUNT]; CHAIN_SIZE];

/// Trait for abstracting the LED driver hardware.
///
/// Implement this for your bus (SPI, bit-banged, ...) to let the
/// [`BrightnessStore`](crate::BrightnessStore) commit chains. A commit is
/// expected to be synchronous and to finish well within one polling tick.
pub trait ChainDriver {
    /// Error reported by a failed commit.
    type Error;

    /// Writes a complete frame to the chain selected by `chain`.
    fn commit(&mut self, chain: usize, frame: &ChainFrame) -> Result<(), Self::Error>;
}
