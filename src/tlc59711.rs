//! TLC59711 daisy-chain encoding.
//!
//! Each TLC59711 takes a 224-bit (28 byte) word: a 32-bit header with the
//! write command, control flags and global brightness, followed by twelve
//! 16-bit grayscale values, most significant first. Grayscale data is laid
//! out from RGB LED 3 down to RGB LED 0, each as blue, green, red.
//!
//! A board carries one chip; board `n` of a chain is chip `n`. Board LEDs
//! `3k`, `3k + 1` and `3k + 2` are the red, green and blue channels of RGB
//! LED `k`.

use crate::driver::{ChainDriver, ChainFrame};
use crate::types::CHAIN_SIZE;

/// Bytes per chip.
pub const BYTES_PER_CHIP: usize = 28;

/// RGB LEDs per chip.
pub const RGB_LEDS_PER_CHIP: usize = 4;

/// Largest global brightness value (7 bits).
pub const GLOBAL_BRIGHTNESS_MAX: u8 = 127;

/// Bytes in one chain transfer.
pub const CHAIN_BUFFER_SIZE: usize = CHAIN_SIZE * BYTES_PER_CHIP;

const WRITE_COMMAND: u32 = 0x25;
const HEADER_SIZE: usize = 4;
const BYTES_PER_RGB_LED: usize = 6;

/// Header control bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    outtmg: bool,
    extgck: bool,
    tmgrst: bool,
    dsprpt: bool,
    blank: bool,
    bc_r: u8,
    bc_g: u8,
    bc_b: u8,
}

impl Header {
    const DEFAULT: Self = Self {
        outtmg: true,
        extgck: false,
        tmgrst: true,
        dsprpt: true,
        blank: false,
        bc_r: GLOBAL_BRIGHTNESS_MAX,
        bc_g: GLOBAL_BRIGHTNESS_MAX,
        bc_b: GLOBAL_BRIGHTNESS_MAX,
    };

    fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut word = WRITE_COMMAND & 0x3F;
        for flag in [self.outtmg, self.extgck, self.tmgrst, self.dsprpt, self.blank] {
            word = (word << 1) | u32::from(flag);
        }
        for bc in [self.bc_b, self.bc_g, self.bc_r] {
            word = (word << 7) | u32::from(bc & 0x7F);
        }
        word.to_be_bytes()
    }
}

/// Transmit buffer for one chain of TLC59711 chips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlc59711Chain {
    header: Header,
    buffer: [u8; CHAIN_BUFFER_SIZE],
}

impl Default for Tlc59711Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Tlc59711Chain {
    /// Creates a buffer with all outputs off and full global brightness.
    pub fn new() -> Self {
        let mut chain = Self {
            header: Header::DEFAULT,
            buffer: [0; CHAIN_BUFFER_SIZE],
        };
        chain.write_headers();
        chain
    }

    /// Sets the global brightness of every chip. Values above
    /// [`GLOBAL_BRIGHTNESS_MAX`] are clamped.
    pub fn set_global_brightness(&mut self, r: u8, g: u8, b: u8) {
        self.header.bc_r = r.min(GLOBAL_BRIGHTNESS_MAX);
        self.header.bc_g = g.min(GLOBAL_BRIGHTNESS_MAX);
        self.header.bc_b = b.min(GLOBAL_BRIGHTNESS_MAX);
        self.write_headers();
    }

    /// Sets the grayscale values of one RGB LED.
    ///
    /// # Returns
    /// `false` if `chip` or `led` is out of range; nothing is written then.
    pub fn set_led(&mut self, chip: usize, led: usize, r: u16, g: u16, b: u16) -> bool {
        if chip >= CHAIN_SIZE || led >= RGB_LEDS_PER_CHIP {
            return false;
        }

        let offset = chip * BYTES_PER_CHIP
            + HEADER_SIZE
            + (RGB_LEDS_PER_CHIP - 1 - led) * BYTES_PER_RGB_LED;
        self.buffer[offset..offset + 2].copy_from_slice(&b.to_be_bytes());
        self.buffer[offset + 2..offset + 4].copy_from_slice(&g.to_be_bytes());
        self.buffer[offset + 4..offset + 6].copy_from_slice(&r.to_be_bytes());
        true
    }

    /// Fills the grayscale data from a chain frame.
    pub fn encode(&mut self, frame: &ChainFrame) {
        for (chip, board) in frame.iter().enumerate() {
            for (led, rgb) in board.chunks_exact(3).enumerate() {
                self.set_led(chip, led, rgb[0], rgb[1], rgb[2]);
            }
        }
    }

    /// Returns the bytes to shift into the chain.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    fn write_headers(&mut self) {
        let header = self.header.to_bytes();
        for chip in self.buffer.chunks_exact_mut(BYTES_PER_CHIP) {
            chip[..HEADER_SIZE].copy_from_slice(&header);
        }
    }
}

/// Trait for the bus in front of the chains.
///
/// Implementations select `chain` (e.g. through a chip-select or
/// multiplexer line) and shift `bytes` out over SPI.
pub trait ChainBus {
    /// Error reported by a failed transfer.
    type Error;

    /// Shifts a complete chain buffer into the selected chain.
    fn transmit(&mut self, chain: usize, bytes: &[u8]) -> Result<(), Self::Error>;
}

/// [`ChainDriver`] for chains of TLC59711 boards.
#[derive(Debug)]
pub struct Tlc59711Driver<B: ChainBus> {
    bus: B,
    chain: Tlc59711Chain,
}

impl<B: ChainBus> Tlc59711Driver<B> {
    /// Creates a driver over `bus` with full global brightness.
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            chain: Tlc59711Chain::new(),
        }
    }

    /// Sets the global brightness sent with every following commit.
    pub fn set_global_brightness(&mut self, r: u8, g: u8, b: u8) {
        self.chain.set_global_brightness(r, g, b);
    }

    /// Returns a reference to the bus.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Returns a mutable reference to the bus.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }
}

impl<B: ChainBus> ChainDriver for Tlc59711Driver<B> {
    type Error = B::Error;

    fn commit(&mut self, chain: usize, frame: &ChainFrame) -> Result<(), Self::Error> {
        self.chain.encode(frame);
        self.bus.transmit(chain, self.chain.as_bytes())
    }
}
