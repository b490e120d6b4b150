#![cfg_attr(not(feature = "std"), no_std)]
#![doc = include_str!("../README.md")]

//! # Core Concepts
//!
//! - **`BrightnessStore`**: Active and idle brightness of every LED, with per-chain dirty tracking
//! - **`Player`**: Plays a `Sequence` of steps through ramp-down, pause, ramp-up and pulse
//! - **`SequenceStep`**: A borrowed LED group plus its `StepTiming`
//! - **`Show`**: Owned groups and steps built from a `play_show` request
//! - **`Controller`**: Reassembles requests, executes commands and runs the polling loop
//! - **`ChainDriver`**: Trait to implement for your LED driver hardware (or use `Tlc59711Driver`)
//! - **`CalibrationStore`**: Trait to implement for persistent idle brightness
//! - **`Transport`**: Trait to implement for the link responses are sent on
//! - **`TimeSource`**: Trait to implement for your timing system
//!
//! Brightness is a percentage (`0..=100`) everywhere except at the driver,
//! which receives gamma-corrected 16-bit grayscale values.

#[macro_use]
mod fmt;

pub mod brightness;
pub mod calibration;
pub mod controller;
pub mod driver;
pub mod gamma;
pub mod link;
pub mod player;
pub mod protocol;
pub mod sequence;
pub mod show;
pub mod time;
pub mod tlc59711;
pub mod types;

pub use brightness::BrightnessStore;
pub use calibration::{
    CALIBRATION_NAME_MAX_LEN, Calibration, CalibrationError, CalibrationStore,
    DEFAULT_CALIBRATION_NAME,
};
pub use controller::Controller;
pub use driver::{ChainDriver, ChainFrame};
pub use link::{RX_BUFFER_SIZE, RX_TIMEOUT_MS, RxBuffer, RxError, TX_BUFFER_SIZE, Transport};
pub use player::{
    Player, PlayerError, PlayerState, STEP_SIZE_MIN, TICK_COUNT_MAX, TICK_TIME_MIN_MS,
    validate_sequence,
};
pub use protocol::{Command, STATUS_ERROR, STATUS_OK};
pub use sequence::{Sequence, SequenceStep, StepError, StepTiming};
pub use show::{MAX_LED_GROUPS, MAX_LED_OBJECTS, MAX_SEQUENCE_STEPS, Show, ShowError};
pub use time::{Millis, MillisDuration, TimeDuration, TimeInstant, TimeSource};
pub use tlc59711::{ChainBus, Tlc59711Chain, Tlc59711Driver};
pub use types::{
    AddressError, BOARD_COUNT, BRG_LOW, BRG_MAX, BRG_MEDIUM, BRG_OFF, Brightness,
    BrightnessError, BrightnessTable, CHAIN_COUNT, CHAIN_SIZE, DARK_TABLE, LED_COUNT,
    LED_COUNT_TOTAL, LedAddress, LedObj,
};
