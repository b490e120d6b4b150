//! JSON wire format of the command surface.
//!
//! Every request is a JSON object with a request id and a command name:
//!
//! ```text
//! {"rid":7,"cmd":"set_brightness","leds":[[1,1,50],[1,2,50]]}
//! ```
//!
//! Every response echoes the id and carries a status, `0` on success and `-1`
//! on failure, plus a message and any command-specific payload:
//!
//! ```text
//! {"rid":7,"status":0,"msg":"OK"}
//! ```
//!
//! Both directions are NUL-terminated on the transport. Boards are numbered
//! globally from 1, LEDs per board from 1; see [`LedAddress::from_wire`](crate::LedAddress::from_wire).

use core::fmt::Write;

use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use crate::link::FRAME_TERMINATOR;
use crate::show::{MAX_LED_GROUPS, MAX_LED_OBJECTS, MAX_SEQUENCE_STEPS};
use crate::types::Brightness;

/// Status of a successful request.
pub const STATUS_OK: i32 = 0;

/// Status of a failed request.
pub const STATUS_ERROR: i32 = -1;

/// Request id reported when the request carried none.
pub const RID_UNKNOWN: i32 = -1;

/// Maximum response message length in bytes.
pub const MSG_MAX_LEN: usize = 128;

/// Firmware version reported by `get_version`.
pub const VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

/// Response message text.
pub type Message = String<MSG_MAX_LEN>;

/// Commands understood by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Report the firmware version.
    GetVersion,
    /// Report the name of the active calibration.
    GetCalibrationName,
    /// Forget the stored calibration and go dark.
    DeleteCalibration,
    /// Persist the idle table under a name.
    SaveCalibration,
    /// Set the idle (and, when no show runs, active) brightness of LEDs.
    SetBrightness,
    /// Report the idle brightness of LEDs.
    GetBrightness,
    /// Start a show.
    PlayShow,
    /// Abort the running show.
    StopShow,
}

impl Command {
    /// All commands, in wire order.
    pub const ALL: [Command; 8] = [
        Command::GetVersion,
        Command::GetCalibrationName,
        Command::DeleteCalibration,
        Command::SaveCalibration,
        Command::SetBrightness,
        Command::GetBrightness,
        Command::PlayShow,
        Command::StopShow,
    ];

    /// Returns the command's wire name.
    pub const fn name(&self) -> &'static str {
        match self {
            Command::GetVersion => "get_version",
            Command::GetCalibrationName => "get_calibration_name",
            Command::DeleteCalibration => "delete_calibration",
            Command::SaveCalibration => "save_calibration",
            Command::SetBrightness => "set_brightness",
            Command::GetBrightness => "get_brightness",
            Command::PlayShow => "play_show",
            Command::StopShow => "stop_show",
        }
    }

    /// Looks a command up by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.name() == name)
    }
}

/// `[group, ramp_down_ms, pause_ms, ramp_up_ms, pulse_ms, repetitions, idle_return]`
pub type WireStep = [u32; 7];

/// `[board, led]`
pub type WireLed = [u16; 2];

/// A decoded request. Which fields are required depends on the command.
#[derive(Debug, Deserialize)]
pub struct Request<'a> {
    /// Request id, echoed in the response.
    pub rid: Option<i32>,

    /// Command name.
    #[serde(borrow)]
    pub cmd: Option<&'a str>,

    /// Calibration name (`save_calibration`).
    #[serde(borrow)]
    pub name: Option<&'a str>,

    /// Abort a running show first (`play_show`), `0` or `1`.
    pub force: Option<u8>,

    /// `[board, led, brightness]` for `set_brightness`, `[board, led]` for `get_brightness`.
    pub leds: Option<Vec<Vec<u16, 3>, MAX_LED_OBJECTS>>,

    /// LED groups of a show (`play_show`).
    pub groups: Option<Vec<Vec<WireLed, MAX_LED_OBJECTS>, MAX_LED_GROUPS>>,

    /// Steps of a show (`play_show`).
    pub sequence: Option<Vec<WireStep, MAX_SEQUENCE_STEPS>>,
}

impl<'a> Request<'a> {
    /// Decodes a request from a frame without its terminator.
    ///
    /// # Errors
    /// Malformed JSON or a field that does not fit its type or capacity.
    pub fn parse(frame: &'a [u8]) -> Result<Self, serde_json_core::de::Error> {
        serde_json_core::from_slice(frame).map(|(request, _)| request)
    }
}

/// A response ready to be serialized.
#[derive(Debug, Serialize)]
pub struct Response<'a> {
    /// Id of the request this answers.
    pub rid: i32,

    /// [`STATUS_OK`] or [`STATUS_ERROR`].
    pub status: i32,

    /// Human-readable outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<Message>,

    /// Firmware version (`get_version`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<&'a str>,

    /// Calibration name (`get_calibration_name`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,

    /// `[board, led, brightness]` triples (`get_brightness`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leds: Option<Vec<[u16; 3], MAX_LED_OBJECTS>>,
}

impl<'a> Response<'a> {
    /// A successful response with message `"OK"`.
    pub fn ok(rid: i32) -> Self {
        Self::with_status(rid, STATUS_OK, format_args!("OK"))
    }

    /// A failed response with a formatted message.
    ///
    /// Messages longer than [`MSG_MAX_LEN`] are truncated.
    pub fn error(rid: i32, args: core::fmt::Arguments<'_>) -> Self {
        Self::with_status(rid, STATUS_ERROR, args)
    }

    fn with_status(rid: i32, status: i32, args: core::fmt::Arguments<'_>) -> Self {
        Self {
            rid,
            status,
            msg: Some(format_message(args)),
            version: None,
            name: None,
            leds: None,
        }
    }

    /// Returns true if the response reports success.
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    /// Serializes the response followed by the frame terminator.
    ///
    /// # Returns
    /// Number of bytes written, terminator included.
    ///
    /// # Errors
    /// `BufferFull` if `buffer` is too small.
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, serde_json_core::ser::Error> {
        let len = serde_json_core::to_slice(self, buffer)?;
        let Some(terminator) = buffer.get_mut(len) else {
            return Err(serde_json_core::ser::Error::BufferFull);
        };
        *terminator = FRAME_TERMINATOR;
        Ok(len + 1)
    }
}

/// Formats into a bounded message, keeping whatever fits.
pub fn format_message(args: core::fmt::Arguments<'_>) -> Message {
    let mut msg = Truncating(Message::new());
    let _ = msg.write_fmt(args);
    msg.0
}

struct Truncating(Message);

impl Write for Truncating {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                return Err(core::fmt::Error);
            }
        }
        Ok(())
    }
}

/// Builds the `[board, led, brightness]` entry of a `get_brightness` response.
pub fn wire_led_level(wire: (u16, u16), level: Brightness) -> [u16; 3] {
    [wire.0, wire.1, u16::from(level)]
}
