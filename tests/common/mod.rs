//! Shared test infrastructure for sternenhimmel integration tests

#![allow(dead_code)] // Items used across multiple test files; Rust analyzes per-file

use std::cell::Cell;

use sternenhimmel::calibration::CALIBRATION_BLOB_MAX_LEN;
use sternenhimmel::{
    BrightnessStore, Calibration, CalibrationStore, ChainDriver, ChainFrame, LedAddress, Millis,
    Player, TimeSource, Transport,
};

// ============================================================================
// Mock Time Source
// ============================================================================

/// Mock 32-bit millisecond clock with controllable advancement
pub struct MockTimeSource {
    current_time: Cell<Millis>,
}

impl MockTimeSource {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(millis: u32) -> Self {
        Self {
            current_time: Cell::new(Millis(millis)),
        }
    }

    /// Advance time by `millis`, wrapping like the hardware counter
    pub fn advance(&self, millis: u32) {
        self.current_time.set(self.current_time.get().wrapping_add(millis));
    }

    pub fn set_time(&self, millis: u32) {
        self.current_time.set(Millis(millis));
    }
}

impl TimeSource<Millis> for MockTimeSource {
    fn now(&self) -> Millis {
        self.current_time.get()
    }
}

// ============================================================================
// Mock Chain Driver
// ============================================================================

/// Chain driver that records every commit
#[derive(Default)]
pub struct RecordingDriver {
    pub commits: Vec<(usize, ChainFrame)>,
    pub fail: bool,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Chains committed, in order
    pub fn committed_chains(&self) -> Vec<usize> {
        self.commits.iter().map(|(chain, _)| *chain).collect()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct CommitFailed;

impl ChainDriver for RecordingDriver {
    type Error = CommitFailed;

    fn commit(&mut self, chain: usize, frame: &ChainFrame) -> Result<(), Self::Error> {
        if self.fail {
            return Err(CommitFailed);
        }
        self.commits.push((chain, *frame));
        Ok(())
    }
}

// ============================================================================
// Mock Calibration Store
// ============================================================================

/// Calibration store backed by an in-memory blob, using the crate's binary format
#[derive(Default)]
pub struct MemoryCalibrationStore {
    pub blob: Option<Vec<u8>>,
    /// Returned by `load` as is, bypassing the blob format
    pub unchecked: Option<Calibration>,
    pub fail: bool,
    pub saves: usize,
    pub deletes: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub struct StorageFailed;

impl MemoryCalibrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(calibration: &Calibration) -> Self {
        let mut store = Self::new();
        store.save(calibration).unwrap();
        store.saves = 0;
        store
    }

    pub fn with_blob(blob: &[u8]) -> Self {
        Self {
            blob: Some(blob.to_vec()),
            ..Self::default()
        }
    }

    pub fn unchecked(calibration: Calibration) -> Self {
        Self {
            unchecked: Some(calibration),
            ..Self::default()
        }
    }

    pub fn stored(&self) -> Option<Calibration> {
        self.blob
            .as_deref()
            .and_then(|blob| Calibration::decode(blob).ok())
    }
}

impl CalibrationStore for MemoryCalibrationStore {
    type Error = StorageFailed;

    fn load(&mut self) -> Result<Option<Calibration>, Self::Error> {
        if self.fail {
            return Err(StorageFailed);
        }
        if let Some(calibration) = &self.unchecked {
            return Ok(Some(calibration.clone()));
        }
        Ok(self.stored())
    }

    fn save(&mut self, calibration: &Calibration) -> Result<(), Self::Error> {
        if self.fail {
            return Err(StorageFailed);
        }
        let mut buffer = [0u8; CALIBRATION_BLOB_MAX_LEN];
        let len = calibration.encode(&mut buffer).map_err(|_| StorageFailed)?;
        self.blob = Some(buffer[..len].to_vec());
        self.saves += 1;
        Ok(())
    }

    fn delete(&mut self) -> Result<(), Self::Error> {
        if self.fail {
            return Err(StorageFailed);
        }
        self.blob = None;
        self.deletes += 1;
        Ok(())
    }
}

// ============================================================================
// Mock Transport
// ============================================================================

/// Transport that records every sent frame
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Vec<Vec<u8>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last response as text, without its terminator
    pub fn last_response(&self) -> Option<&str> {
        let frame = self.sent.last()?;
        let text = frame.strip_suffix(b"\0")?;
        std::str::from_utf8(text).ok()
    }
}

impl Transport for RecordingTransport {
    type Error = core::convert::Infallible;

    fn send(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.sent.push(data.to_vec());
        Ok(())
    }
}

// ============================================================================
// Test Helper Functions
// ============================================================================

pub type TestPlayer<'t> = Player<'t, Millis, MockTimeSource>;

/// Internal 0-based address, panics if out of range
pub fn led(chain: u8, board: u8, led: u8) -> LedAddress {
    LedAddress::new(chain, board, led).unwrap()
}

pub fn store() -> BrightnessStore<RecordingDriver> {
    BrightnessStore::new(RecordingDriver::new())
}

/// Runs the player once per millisecond for `millis` milliseconds
pub fn run_for<S, D>(
    player: &mut TestPlayer<'_>,
    timer: &MockTimeSource,
    sequence: &S,
    store: &mut BrightnessStore<D>,
    millis: u32,
) where
    S: sternenhimmel::Sequence + ?Sized,
    D: ChainDriver,
{
    for _ in 0..millis {
        timer.advance(1);
        player.run(sequence, store);
    }
}
