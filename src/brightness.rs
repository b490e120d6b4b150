//! Active and idle brightness tables with per-chain dirty tracking.
//!
//! [`BrightnessStore`] owns the [`ChainDriver`] and is the only place that
//! touches hardware. Everything else is a plain table operation, so the
//! player and the command handlers can call it every tick.

use crate::driver::{ChainDriver, ChainFrame};
use crate::gamma::linearize;
use crate::types::{
    Brightness, BrightnessTable, CHAIN_COUNT, CHAIN_SIZE, DARK_TABLE, LED_COUNT, LedAddress,
};

/// Authoritative brightness state of the installation.
///
/// * `active` is what is currently driven (or about to be driven) on the LEDs.
/// * `idle` is the calibrated rest state restored on boot, abort and delete.
///
/// Writes to `active` mark the owning chain dirty. [`flush`](Self::flush)
/// commits dirty chains and is a cheap no-op otherwise.
///
/// All accessors index the tables directly. Addresses must be validated
/// beforehand (see [`LedAddress::validate`]); an out-of-range address panics.
pub struct BrightnessStore<D: ChainDriver> {
    driver: D,
    active: BrightnessTable,
    idle: BrightnessTable,
    dirty: [bool; CHAIN_COUNT],
}

impl<D: ChainDriver> BrightnessStore<D> {
    /// Creates a store with every LED off in both tables.
    ///
    /// All chains start dirty so the first flush initialises the hardware.
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            active: DARK_TABLE,
            idle: DARK_TABLE,
            dirty: [true; CHAIN_COUNT],
        }
    }

    /// Returns the active brightness of one LED.
    #[inline]
    pub fn active(&self, led: LedAddress) -> Brightness {
        self.active[led.chain_idx()][led.board_idx()][led.led_idx()]
    }

    /// Returns the idle brightness of one LED.
    #[inline]
    pub fn idle(&self, led: LedAddress) -> Brightness {
        self.idle[led.chain_idx()][led.board_idx()][led.led_idx()]
    }

    /// Reads the active brightness of `leds` into `levels`, in order.
    ///
    /// Stops at the shorter of both slices.
    pub fn get_active(&self, leds: &[LedAddress], levels: &mut [Brightness]) {
        for (level, led) in levels.iter_mut().zip(leds) {
            *level = self.active(*led);
        }
    }

    /// Writes `levels` as the active brightness of `leds` and marks their chains dirty.
    pub fn set_active(&mut self, leds: &[LedAddress], levels: &[Brightness]) {
        for (led, level) in leds.iter().zip(levels) {
            self.set_active_led(*led, *level);
        }
    }

    /// Writes the active brightness of a single LED.
    #[inline]
    pub fn set_active_led(&mut self, led: LedAddress, level: Brightness) {
        self.active[led.chain_idx()][led.board_idx()][led.led_idx()] = level;
        self.dirty[led.chain_idx()] = true;
    }

    /// Reads the idle brightness of `leds` into `levels`, in order.
    pub fn get_idle(&self, leds: &[LedAddress], levels: &mut [Brightness]) {
        for (level, led) in levels.iter_mut().zip(leds) {
            *level = self.idle(*led);
        }
    }

    /// Writes the idle brightness of `leds`. Does not mark anything dirty.
    pub fn set_idle(&mut self, leds: &[LedAddress], levels: &[Brightness]) {
        for (led, level) in leds.iter().zip(levels) {
            self.set_idle_led(*led, *level);
        }
    }

    /// Writes the idle brightness of a single LED.
    #[inline]
    pub fn set_idle_led(&mut self, led: LedAddress, level: Brightness) {
        self.idle[led.chain_idx()][led.board_idx()][led.led_idx()] = level;
    }

    /// Copies the whole idle table into the active table and marks every chain dirty.
    pub fn apply_idle_to_active(&mut self) {
        self.active = self.idle;
        self.dirty = [true; CHAIN_COUNT];
    }

    /// Returns the idle table, e.g. for saving a calibration.
    pub fn idle_table(&self) -> &BrightnessTable {
        &self.idle
    }

    /// Replaces the idle table, e.g. with a loaded calibration.
    pub fn load_idle_table(&mut self, table: &BrightnessTable) {
        self.idle = *table;
    }

    /// Resets the idle table to the built-in defaults (all off).
    pub fn load_default_idle(&mut self) {
        self.idle = DARK_TABLE;
    }

    /// Returns true if the chain has unflushed writes.
    ///
    /// # Panics
    /// Panics if `chain >= CHAIN_COUNT`.
    pub fn is_dirty(&self, chain: usize) -> bool {
        self.dirty[chain]
    }

    /// Commits a chain to hardware if it is dirty or `force` is set.
    ///
    /// # Returns
    /// * `Ok(true)` - The chain was committed and is clean now
    /// * `Ok(false)` - Nothing to do
    /// * `Err` - The driver rejected the frame; the chain stays dirty
    ///
    /// # Panics
    /// Panics if `chain >= CHAIN_COUNT`.
    pub fn flush(&mut self, chain: usize, force: bool) -> Result<bool, D::Error> {
        if !self.dirty[chain] && !force {
            return Ok(false);
        }

        let frame = self.frame(chain);
        self.driver.commit(chain, &frame)?;
        self.dirty[chain] = false;
        Ok(true)
    }

    /// Builds the gamma-corrected frame of one chain from the active table.
    pub fn frame(&self, chain: usize) -> ChainFrame {
        let mut frame = [[0u16; LED_COUNT]; CHAIN_SIZE];
        for (out_board, board) in frame.iter_mut().zip(&self.active[chain]) {
            for (out, level) in out_board.iter_mut().zip(board) {
                *out = linearize(*level);
            }
        }
        frame
    }

    /// Returns a reference to the driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Returns a mutable reference to the driver.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}
