//! The sequence player.
//!
//! Provides [`Player`], a non-blocking state machine that animates groups of
//! LEDs through ramp-down, pause, ramp-up and pulse phases. It never sleeps:
//! [`Player::run`] is called once per polling tick, looks at the clock, and
//! does at most one tick's worth of work before returning.

use crate::brightness::BrightnessStore;
use crate::driver::ChainDriver;
use crate::sequence::{Sequence, StepError, StepTiming};
use crate::time::{TimeDuration, TimeInstant, TimeSource};
use crate::types::{BRG_MAX, BRG_OFF, Brightness, LED_COUNT_TOTAL, LedAddress};

/// Finest brightness change per ramp tick.
pub const STEP_SIZE_MIN: Brightness = 1;

/// Shortest time between two ramp ticks, in milliseconds.
pub const TICK_TIME_MIN_MS: u32 = 5;

/// Upper bound on ramp ticks per phase, reached at [`STEP_SIZE_MIN`].
pub const TICK_COUNT_MAX: u32 = (BRG_MAX / STEP_SIZE_MIN) as u32;

/// The current phase of the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlayerState {
    /// Nothing playing.
    Idle,
    /// Ramping the step's LEDs down to off.
    RampDown,
    /// Holding the step's LEDs off.
    Pause,
    /// Ramping the step's LEDs up to full (or idle) brightness.
    RampUp,
    /// Holding the step's LEDs at full (or idle) brightness.
    Pulse,
}

/// Reasons a sequence is refused by [`Player::play_sequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlayerError {
    /// Another sequence is still playing.
    Busy,

    /// The sequence has no steps.
    EmptySequence,

    /// The sequence reported a length but returned no step at `index`.
    MissingStep {
        /// Index of the missing step
        index: usize,
    },

    /// A step failed validation.
    InvalidStep {
        /// Index of the offending step
        index: usize,
        /// What is wrong with it
        error: StepError,
    },
}

impl core::fmt::Display for PlayerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PlayerError::Busy => write!(f, "player is busy"),
            PlayerError::EmptySequence => write!(f, "sequence has no steps"),
            PlayerError::MissingStep { index } => write!(f, "sequence step {} missing", index),
            PlayerError::InvalidStep { index, error } => {
                write!(f, "invalid sequence step {}: {}", index, error)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PlayerError {}

/// Checks every step of `sequence` without playing it.
///
/// # Returns
/// The number of steps.
///
/// # Errors
/// * `EmptySequence` - `sequence` has no steps
/// * `MissingStep` - `sequence` is shorter than its reported length
/// * `InvalidStep` - A step failed [`SequenceStep::validate`](crate::SequenceStep::validate)
pub fn validate_sequence<S: Sequence + ?Sized>(sequence: &S) -> Result<usize, PlayerError> {
    let step_count = sequence.len();
    if step_count == 0 {
        return Err(PlayerError::EmptySequence);
    }

    for index in 0..step_count {
        let step = sequence
            .step(index)
            .ok_or(PlayerError::MissingStep { index })?;
        step.validate()
            .map_err(|error| PlayerError::InvalidStep { index, error })?;
    }
    Ok(step_count)
}

/// Timing of one phase. `start` is `Some` while the phase is running.
#[derive(Debug, Clone, Copy)]
struct Phase<I> {
    duration_ms: u32,
    start: Option<I>,
}

impl<I> Phase<I> {
    const fn new(duration_ms: u32) -> Self {
        Self {
            duration_ms,
            start: None,
        }
    }
}

/// Tick plan of a ramp phase.
///
/// Short ramps tick every [`TICK_TIME_MIN_MS`] with a coarser brightness step.
/// Long ramps are capped at [`TICK_COUNT_MAX`] ticks of [`STEP_SIZE_MIN`]
/// and stretch the tick time instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ramp {
    total_ticks: u32,
    remaining_ticks: u32,
    tick_time_ms: u32,
    step_size: u32,
}

impl Ramp {
    const IDLE: Self = Self {
        total_ticks: 0,
        remaining_ticks: 0,
        tick_time_ms: TICK_TIME_MIN_MS,
        step_size: STEP_SIZE_MIN as u32,
    };

    fn new(duration_ms: u32) -> Self {
        // At least one tick, so ramps shorter than a tick still finish on the target.
        let ticks = (duration_ms / TICK_TIME_MIN_MS).max(1);

        if ticks > TICK_COUNT_MAX {
            Self {
                total_ticks: TICK_COUNT_MAX,
                remaining_ticks: TICK_COUNT_MAX,
                tick_time_ms: duration_ms / TICK_COUNT_MAX,
                step_size: u32::from(STEP_SIZE_MIN),
            }
        } else {
            Self {
                total_ticks: ticks,
                remaining_ticks: ticks,
                tick_time_ms: TICK_TIME_MIN_MS,
                step_size: u32::from(BRG_MAX) / ticks,
            }
        }
    }

    /// Level after the current tick of a ramp-down.
    fn down_target(&self) -> Brightness {
        clamp_level(self.remaining_ticks * self.step_size)
    }

    /// Level after the current tick of a ramp-up. The last tick always lands on [`BRG_MAX`].
    fn up_target(&self) -> Brightness {
        if self.remaining_ticks == 0 {
            BRG_MAX
        } else {
            clamp_level((self.total_ticks - self.remaining_ticks) * self.step_size)
        }
    }
}

fn clamp_level(value: u32) -> Brightness {
    Brightness::try_from(value).map_or(BRG_MAX, |level| level.min(BRG_MAX))
}

/// Plays sequences of steps on the LEDs of a [`BrightnessStore`].
///
/// The player borrows nothing between calls. [`play_sequence`](Self::play_sequence)
/// validates a sequence and starts it; every following [`run`](Self::run) must be
/// handed the same, unmodified sequence until the player is idle again or has
/// been [`abort`](Self::abort)ed.
///
/// # Type Parameters
/// * `'t` - Lifetime of the time source reference
/// * `I` - Time instant type
/// * `T` - Time source implementation type
pub struct Player<'t, I: TimeInstant, T: TimeSource<I>> {
    time_source: &'t T,
    state: PlayerState,
    step_index: usize,
    step_count: usize,
    timing: StepTiming,
    repetitions: u32,
    ramp_down: Phase<I>,
    pause: Phase<I>,
    ramp_up: Phase<I>,
    pulse: Phase<I>,
    ramp: Ramp,
    levels: [Brightness; LED_COUNT_TOTAL],
}

impl<'t, I: TimeInstant, T: TimeSource<I>> Player<'t, I, T> {
    /// Creates an idle player.
    pub fn new(time_source: &'t T) -> Self {
        Self {
            time_source,
            state: PlayerState::Idle,
            step_index: 0,
            step_count: 0,
            timing: StepTiming::new(0, 0, 0, 0),
            repetitions: 0,
            ramp_down: Phase::new(0),
            pause: Phase::new(0),
            ramp_up: Phase::new(0),
            pulse: Phase::new(0),
            ramp: Ramp::IDLE,
            levels: [BRG_OFF; LED_COUNT_TOTAL],
        }
    }

    /// Returns the current state of the player.
    #[inline]
    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// Returns true if no sequence is playing.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.state == PlayerState::Idle
    }

    /// Returns the index of the step being played, if any.
    pub fn current_step(&self) -> Option<usize> {
        (!self.is_idle()).then_some(self.step_index)
    }

    /// Returns the repetitions left for the current step, including the running one.
    pub fn repetitions_remaining(&self) -> u32 {
        if self.is_idle() { 0 } else { self.repetitions }
    }

    /// Validates `sequence` and starts playing its first step.
    ///
    /// The player must be idle. Nothing is written to the LEDs here; the first
    /// [`run`](Self::run) sets up the first phase.
    ///
    /// # Errors
    /// * `Busy` - A sequence is still playing
    /// * `EmptySequence` - `sequence` has no steps
    /// * `MissingStep` - `sequence` is shorter than its reported length
    /// * `InvalidStep` - A step failed [`SequenceStep::validate`](crate::SequenceStep::validate)
    ///
    /// On error the player is left untouched.
    pub fn play_sequence<S: Sequence + ?Sized>(&mut self, sequence: &S) -> Result<(), PlayerError> {
        if !self.is_idle() {
            warn!("sequence rejected: player busy");
            return Err(PlayerError::Busy);
        }

        let step_count = validate_sequence(sequence).inspect_err(|err| {
            warn!("sequence rejected: {}", err);
        })?;

        let first = sequence.step(0).ok_or(PlayerError::MissingStep { index: 0 })?;
        self.step_count = step_count;
        self.play_step(0, first.timing);
        info!("sequence started: {} steps", step_count);
        Ok(())
    }

    /// Stops playback and restores the idle brightness of every LED.
    ///
    /// Always succeeds and may be called any number of times.
    pub fn abort<D: ChainDriver>(&mut self, store: &mut BrightnessStore<D>) {
        if !self.is_idle() {
            info!("sequence aborted at step {}", self.step_index);
        }
        self.reset();
        store.apply_idle_to_active();
    }

    /// Advances the playing sequence according to the clock.
    ///
    /// Falls through phases that are already complete (zero duration), but
    /// applies at most one ramp tick per call. A call while idle does nothing.
    ///
    /// `sequence` must be the one passed to [`play_sequence`](Self::play_sequence).
    ///
    /// # Panics
    /// In debug builds, if `sequence` has a different length than the one being played.
    ///
    /// # Returns
    /// The state after this call.
    pub fn run<S, D>(&mut self, sequence: &S, store: &mut BrightnessStore<D>) -> PlayerState
    where
        S: Sequence + ?Sized,
        D: ChainDriver,
    {
        if self.is_idle() {
            return self.state;
        }
        debug_assert_eq!(
            sequence.len(),
            self.step_count,
            "run() must be given the sequence passed to play_sequence()"
        );

        let Some(step) = sequence.step(self.step_index) else {
            error!("sequence step {} vanished, stopping", self.step_index);
            self.reset();
            return self.state;
        };
        let leds = step.leds;

        if self.state == PlayerState::RampDown {
            if !self.run_ramp_down(leds, store) {
                return self.state;
            }
            self.state = PlayerState::Pause;
        }

        if self.state == PlayerState::Pause {
            if !self.run_pause(leds, store) {
                return self.state;
            }
            self.state = PlayerState::RampUp;
        }

        if self.state == PlayerState::RampUp {
            if !self.run_ramp_up(leds, store) {
                return self.state;
            }
            self.state = PlayerState::Pulse;
        }

        if self.state == PlayerState::Pulse && self.run_pulse(leds, store) {
            self.finish_repetition(sequence);
        }

        self.state
    }

    fn reset(&mut self) {
        self.state = PlayerState::Idle;
        self.step_index = 0;
        self.step_count = 0;
        self.repetitions = 0;
        self.ramp = Ramp::IDLE;
        for phase in [
            &mut self.ramp_down,
            &mut self.pause,
            &mut self.ramp_up,
            &mut self.pulse,
        ] {
            phase.start = None;
        }
    }

    fn play_step(&mut self, index: usize, timing: StepTiming) {
        self.step_index = index;
        self.timing = timing;
        self.repetitions = timing.repetitions;
        self.ramp_down = Phase::new(timing.ramp_down_ms);
        self.pause = Phase::new(timing.pause_ms);
        self.ramp_up = Phase::new(timing.ramp_up_ms);
        self.pulse = Phase::new(timing.pulse_ms);
        self.state = PlayerState::RampDown;
        debug!("step {} started, {} repetitions", index, timing.repetitions);
    }

    fn finish_repetition<S: Sequence + ?Sized>(&mut self, sequence: &S) {
        self.repetitions = self.repetitions.saturating_sub(1);
        if self.repetitions > 0 {
            self.state = PlayerState::RampDown;
            return;
        }

        let next = self.step_index + 1;
        match sequence.step(next).filter(|_| next < self.step_count) {
            Some(step) => self.play_step(next, step.timing),
            None => {
                info!("sequence complete");
                self.reset();
            }
        }
    }

    /// Idle return only shapes the last repetition of a step.
    fn idle_return_active(&self) -> bool {
        self.timing.idle_return && self.repetitions == 1
    }

    /// Milliseconds since `start`, safe across clock wraparound.
    fn elapsed_ms(&self, start: I) -> u64 {
        self.time_source.now().duration_since(start).as_millis()
    }

    fn run_ramp_down<D: ChainDriver>(
        &mut self,
        leds: &[LedAddress],
        store: &mut BrightnessStore<D>,
    ) -> bool {
        let Some(start) = self.ramp_down.start else {
            if self.ramp_down.duration_ms == 0 {
                return true;
            }
            self.begin_ramp(self.ramp_down.duration_ms, leds, store);
            self.ramp_down.start = Some(self.time_source.now());
            return false;
        };

        if self.elapsed_ms(start) < u64::from(self.ramp.tick_time_ms) {
            return false;
        }

        self.ramp.remaining_ticks -= 1;
        let target = self.ramp.down_target();
        let levels = &mut self.levels[..leds.len()];
        for level in levels.iter_mut() {
            if *level > target {
                *level = target;
            }
        }
        store.set_active(leds, levels);

        if self.ramp.remaining_ticks == 0 {
            self.ramp_down.start = None;
            true
        } else {
            self.ramp_down.start = Some(self.time_source.now());
            false
        }
    }

    fn run_pause<D: ChainDriver>(
        &mut self,
        leds: &[LedAddress],
        store: &mut BrightnessStore<D>,
    ) -> bool {
        let Some(start) = self.pause.start else {
            if self.pause.duration_ms == 0 {
                return true;
            }
            for led in leds {
                store.set_active_led(*led, BRG_OFF);
            }
            self.pause.start = Some(self.time_source.now());
            return false;
        };

        if self.elapsed_ms(start) < u64::from(self.pause.duration_ms) {
            return false;
        }
        self.pause.start = None;
        true
    }

    fn run_ramp_up<D: ChainDriver>(
        &mut self,
        leds: &[LedAddress],
        store: &mut BrightnessStore<D>,
    ) -> bool {
        let Some(start) = self.ramp_up.start else {
            if self.ramp_up.duration_ms == 0 {
                return true;
            }
            self.begin_ramp(self.ramp_up.duration_ms, leds, store);
            self.ramp_up.start = Some(self.time_source.now());
            return false;
        };

        if self.elapsed_ms(start) < u64::from(self.ramp.tick_time_ms) {
            return false;
        }

        self.ramp.remaining_ticks -= 1;
        let target = self.ramp.up_target();
        let idle_return = self.idle_return_active();
        let levels = &mut self.levels[..leds.len()];
        for (level, led) in levels.iter_mut().zip(leds) {
            if idle_return {
                let idle = store.idle(*led);
                *level = (*level).max(target.min(idle)).min(idle);
            } else if *level < target {
                *level = target;
            }
        }
        store.set_active(leds, levels);

        if self.ramp.remaining_ticks == 0 {
            self.ramp_up.start = None;
            true
        } else {
            self.ramp_up.start = Some(self.time_source.now());
            false
        }
    }

    fn run_pulse<D: ChainDriver>(
        &mut self,
        leds: &[LedAddress],
        store: &mut BrightnessStore<D>,
    ) -> bool {
        let Some(start) = self.pulse.start else {
            if self.pulse.duration_ms == 0 {
                return true;
            }
            let idle_return = self.idle_return_active();
            for led in leds {
                let level = if idle_return { store.idle(*led) } else { BRG_MAX };
                store.set_active_led(*led, level);
            }
            self.pulse.start = Some(self.time_source.now());
            return false;
        };

        if self.elapsed_ms(start) < u64::from(self.pulse.duration_ms) {
            return false;
        }
        self.pulse.start = None;
        true
    }

    /// Captures the step's current levels as the ramp's starting point.
    fn begin_ramp<D: ChainDriver>(
        &mut self,
        duration_ms: u32,
        leds: &[LedAddress],
        store: &BrightnessStore<D>,
    ) {
        store.get_active(leds, &mut self.levels[..leds.len()]);
        self.ramp = Ramp::new(duration_ms);
    }
}

impl<'t, I: TimeInstant, T: TimeSource<I>> core::fmt::Debug for Player<'t, I, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Player")
            .field("state", &self.state)
            .field("step_index", &self.step_index)
            .field("step_count", &self.step_count)
            .field("repetitions", &self.repetitions)
            .finish_non_exhaustive()
    }
}
