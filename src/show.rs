//! Owned show buffer built from a `play_show` request.

use core::ops::Range;

use heapless::Vec;

use crate::sequence::{Sequence, SequenceStep, StepTiming};
use crate::types::LedAddress;

/// Maximum number of LEDs across all groups of a show.
pub const MAX_LED_OBJECTS: usize = 256;

/// Maximum number of LED groups in a show.
pub const MAX_LED_GROUPS: usize = 16;

/// Maximum number of steps in a show.
pub const MAX_SEQUENCE_STEPS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ShowStep {
    group: usize,
    timing: StepTiming,
}

/// LED groups and the steps that animate them.
///
/// All groups share one LED buffer; a group is a range into it. Several steps
/// may refer to the same group. A `Show` implements [`Sequence`] and can be
/// handed to the player directly.
#[derive(Debug, Clone, Default)]
pub struct Show {
    leds: Vec<LedAddress, MAX_LED_OBJECTS>,
    groups: Vec<Range<usize>, MAX_LED_GROUPS>,
    steps: Vec<ShowStep, MAX_SEQUENCE_STEPS>,
}

impl Show {
    /// Creates an empty show.
    pub const fn new() -> Self {
        Self {
            leds: Vec::new(),
            groups: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Removes all groups and steps.
    pub fn clear(&mut self) {
        self.leds.clear();
        self.groups.clear();
        self.steps.clear();
    }

    /// Appends a group and returns its index.
    ///
    /// # Errors
    /// * `TooManyGroups` - [`MAX_LED_GROUPS`] groups already exist
    /// * `TooManyLeds` - The group does not fit into [`MAX_LED_OBJECTS`]
    ///
    /// On error the show is left unchanged.
    pub fn add_group(&mut self, leds: &[LedAddress]) -> Result<usize, ShowError> {
        if self.groups.is_full() {
            return Err(ShowError::TooManyGroups);
        }
        let start = self.leds.len();
        self.leds
            .extend_from_slice(leds)
            .map_err(|_| ShowError::TooManyLeds)?;
        let index = self.groups.len();
        self.groups
            .push(start..self.leds.len())
            .map_err(|_| ShowError::TooManyGroups)?;
        Ok(index)
    }

    /// Appends a step animating `group`.
    ///
    /// # Errors
    /// * `UnknownGroup` - No group with that index
    /// * `TooManySteps` - [`MAX_SEQUENCE_STEPS`] steps already exist
    pub fn add_step(&mut self, group: usize, timing: StepTiming) -> Result<(), ShowError> {
        if group >= self.groups.len() {
            return Err(ShowError::UnknownGroup(group));
        }
        self.steps
            .push(ShowStep { group, timing })
            .map_err(|_| ShowError::TooManySteps)
    }

    /// Returns the LEDs of a group.
    pub fn group(&self, index: usize) -> Option<&[LedAddress]> {
        self.groups
            .get(index)
            .and_then(|range| self.leds.get(range.clone()))
    }

    /// Number of groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Returns true if any group includes `led`.
    pub fn contains(&self, led: LedAddress) -> bool {
        self.leds.contains(&led)
    }
}

impl Sequence for Show {
    fn len(&self) -> usize {
        self.steps.len()
    }

    fn step(&self, index: usize) -> Option<SequenceStep<'_>> {
        let step = self.steps.get(index)?;
        let leds = self.group(step.group)?;
        Some(SequenceStep::new(leds, step.timing))
    }
}

/// Show buffer errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ShowError {
    /// More than [`MAX_LED_OBJECTS`] LEDs across all groups.
    TooManyLeds,

    /// More than [`MAX_LED_GROUPS`] groups.
    TooManyGroups,

    /// More than [`MAX_SEQUENCE_STEPS`] steps.
    TooManySteps,

    /// A step refers to a group that does not exist.
    UnknownGroup(usize),
}

impl core::fmt::Display for ShowError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ShowError::TooManyLeds => write!(f, "too many LEDs (max {})", MAX_LED_OBJECTS),
            ShowError::TooManyGroups => write!(f, "too many groups (max {})", MAX_LED_GROUPS),
            ShowError::TooManySteps => {
                write!(f, "too many sequence steps (max {})", MAX_SEQUENCE_STEPS)
            }
            ShowError::UnknownGroup(group) => write!(f, "invalid group index: {}", group),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ShowError {}
