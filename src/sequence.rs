//! Sequence steps and the [`Sequence`] abstraction the player walks through.

use crate::types::{AddressError, LED_COUNT_TOTAL, LedAddress};

/// Timing of one sequence step.
///
/// Each phase duration is in milliseconds; zero skips the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepTiming {
    /// Ramp from the current brightness down to off.
    pub ramp_down_ms: u32,

    /// Hold all LEDs off.
    pub pause_ms: u32,

    /// Ramp from off up to full (or idle) brightness.
    pub ramp_up_ms: u32,

    /// Hold all LEDs at full (or idle) brightness.
    pub pulse_ms: u32,

    /// Number of times the four phases run, at least 1.
    pub repetitions: u32,

    /// On the last repetition, ramp up to and pulse at each LED's idle
    /// brightness instead of full brightness.
    pub idle_return: bool,
}

impl StepTiming {
    /// Creates a single-repetition timing without idle return.
    #[inline]
    pub const fn new(ramp_down_ms: u32, pause_ms: u32, ramp_up_ms: u32, pulse_ms: u32) -> Self {
        Self {
            ramp_down_ms,
            pause_ms,
            ramp_up_ms,
            pulse_ms,
            repetitions: 1,
            idle_return: false,
        }
    }

    /// Sets the repetition count.
    #[inline]
    pub const fn repetitions(mut self, repetitions: u32) -> Self {
        self.repetitions = repetitions;
        self
    }

    /// Sets the idle-return flag.
    #[inline]
    pub const fn idle_return(mut self, idle_return: bool) -> Self {
        self.idle_return = idle_return;
        self
    }
}

/// A group of LEDs and the timing applied to them.
///
/// The step only borrows its LEDs; the caller keeps them alive and unchanged
/// while the step is being played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceStep<'a> {
    /// LEDs animated by this step.
    pub leds: &'a [LedAddress],

    /// Phase durations, repetitions and idle return.
    pub timing: StepTiming,
}

impl<'a> SequenceStep<'a> {
    /// Creates a new sequence step.
    #[inline]
    pub const fn new(leds: &'a [LedAddress], timing: StepTiming) -> Self {
        Self { leds, timing }
    }

    /// Checks the step's structure and every LED address.
    ///
    /// # Errors
    /// * `NoLeds` - The step has no LEDs
    /// * `TooManyLeds` - More LEDs than the installation has
    /// * `ZeroRepetitions` - Repetition count is 0
    /// * `InvalidAddress` - An LED lies outside the chain/board/LED bounds
    pub fn validate(&self) -> Result<(), StepError> {
        if self.leds.is_empty() {
            return Err(StepError::NoLeds);
        }
        if self.leds.len() > LED_COUNT_TOTAL {
            return Err(StepError::TooManyLeds(self.leds.len()));
        }
        if self.timing.repetitions == 0 {
            return Err(StepError::ZeroRepetitions);
        }
        for led in self.leds {
            led.validate().map_err(StepError::InvalidAddress)?;
        }
        Ok(())
    }
}

/// An ordered list of steps played front to back.
///
/// Implemented for slices and arrays of [`SequenceStep`], for a single step,
/// and for [`Show`](crate::Show).
pub trait Sequence {
    /// Number of steps.
    fn len(&self) -> usize;

    /// Returns the step at `index`, if any.
    fn step(&self, index: usize) -> Option<SequenceStep<'_>>;

    /// Returns true if there are no steps.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Sequence for [SequenceStep<'_>] {
    fn len(&self) -> usize {
        <[SequenceStep<'_>]>::len(self)
    }

    fn step(&self, index: usize) -> Option<SequenceStep<'_>> {
        self.get(index).copied()
    }
}

impl<const N: usize> Sequence for [SequenceStep<'_>; N] {
    fn len(&self) -> usize {
        N
    }

    fn step(&self, index: usize) -> Option<SequenceStep<'_>> {
        self.get(index).copied()
    }
}

impl Sequence for SequenceStep<'_> {
    fn len(&self) -> usize {
        1
    }

    fn step(&self, index: usize) -> Option<SequenceStep<'_>> {
        (index == 0).then_some(*self)
    }
}

/// Step validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepError {
    /// The step has no LEDs.
    NoLeds,

    /// More LEDs than [`LED_COUNT_TOTAL`].
    TooManyLeds(usize),

    /// Repetitions must be at least 1.
    ZeroRepetitions,

    /// An LED address is out of range.
    InvalidAddress(AddressError),
}

impl core::fmt::Display for StepError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StepError::NoLeds => write!(f, "step has no LEDs"),
            StepError::TooManyLeds(size) => {
                write!(f, "invalid LEDs size: {} (max {})", size, LED_COUNT_TOTAL)
            }
            StepError::ZeroRepetitions => write!(f, "repetitions must be greater than 0"),
            StepError::InvalidAddress(err) => write!(f, "{}", err),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for StepError {}
