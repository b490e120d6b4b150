//! Byte transport and request frame reassembly.
//!
//! Requests arrive in chunks (BLE writes, UART reads, ...). Each request is a
//! NUL-terminated document; [`RxBuffer`] collects chunks until the last byte
//! received is `\0`, and drops frames that take longer than the timeout.

use heapless::Vec;

use crate::time::{TimeDuration, TimeInstant};

/// Capacity of the request buffer in bytes.
pub const RX_BUFFER_SIZE: usize = 10 * 1024;

/// Capacity of the response buffer in bytes.
pub const TX_BUFFER_SIZE: usize = 10 * 1024;

/// Time allowed between the first chunk of a request and its terminator.
pub const RX_TIMEOUT_MS: u32 = 1000;

/// Frame terminator.
pub const FRAME_TERMINATOR: u8 = b'\0';

/// Trait for the link responses are written to.
pub trait Transport {
    /// Error reported by a failed send.
    type Error;

    /// Sends one complete, NUL-terminated response.
    fn send(&mut self, data: &[u8]) -> Result<(), Self::Error>;
}

/// Reassembles NUL-terminated request frames.
#[derive(Debug)]
pub struct RxBuffer<I: TimeInstant> {
    data: Vec<u8, RX_BUFFER_SIZE>,
    started: Option<I>,
    complete: bool,
}

impl<I: TimeInstant> Default for RxBuffer<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: TimeInstant> RxBuffer<I> {
    /// Creates an empty buffer.
    pub const fn new() -> Self {
        Self {
            data: Vec::new(),
            started: None,
            complete: false,
        }
    }

    /// Appends a received chunk.
    ///
    /// The first chunk of a frame starts the timeout clock at `now`.
    ///
    /// # Returns
    /// * `Ok(true)` - The chunk completed a frame
    /// * `Ok(false)` - More chunks are expected
    ///
    /// # Errors
    /// * `EmptyChunk` - `chunk` is empty; the buffer is unchanged
    /// * `FramePending` - A complete frame has not been taken yet; the chunk is dropped
    /// * `Overflow` - The frame does not fit; the partial frame is discarded
    pub fn push(&mut self, chunk: &[u8], now: I) -> Result<bool, RxError> {
        if chunk.is_empty() {
            return Err(RxError::EmptyChunk);
        }
        if self.complete {
            return Err(RxError::FramePending);
        }
        if self.started.is_none() {
            self.data.clear();
            self.started = Some(now);
        }

        if self.data.extend_from_slice(chunk).is_err() {
            self.clear();
            return Err(RxError::Overflow);
        }

        self.complete = self.data.last() == Some(&FRAME_TERMINATOR);
        Ok(self.complete)
    }

    /// Returns the completed frame without its terminator, if any.
    pub fn frame(&self) -> Option<&[u8]> {
        if !self.complete {
            return None;
        }
        let end = self
            .data
            .iter()
            .rposition(|byte| *byte != FRAME_TERMINATOR)
            .map_or(0, |last| last + 1);
        Some(&self.data[..end])
    }

    /// Discards a partial frame older than `timeout_ms`.
    ///
    /// Completed frames never expire.
    ///
    /// # Returns
    /// `true` if a frame was discarded.
    pub fn expire(&mut self, now: I, timeout_ms: u32) -> bool {
        let Some(started) = self.started else {
            return false;
        };
        if self.complete || now.duration_since(started).as_millis() < u64::from(timeout_ms) {
            return false;
        }
        self.clear();
        true
    }

    /// Drops any buffered data.
    pub fn clear(&mut self) {
        self.data.clear();
        self.started = None;
        self.complete = false;
    }

    /// Returns true while a frame is being received or waiting to be taken.
    pub fn is_receiving(&self) -> bool {
        self.started.is_some()
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Frame reassembly errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxError {
    /// An empty chunk was received.
    EmptyChunk,

    /// The previous frame has not been processed yet.
    FramePending,

    /// The frame exceeds [`RX_BUFFER_SIZE`].
    Overflow,
}

impl core::fmt::Display for RxError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RxError::EmptyChunk => write!(f, "received data is empty"),
            RxError::FramePending => write!(f, "previous request still pending"),
            RxError::Overflow => write!(f, "RX buffer overflow (max {} bytes)", RX_BUFFER_SIZE),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RxError {}
