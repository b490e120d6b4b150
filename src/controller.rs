//! Command dispatch and the polling loop.
//!
//! [`Controller`] ties everything together: it reassembles requests from the
//! transport, executes commands against the [`Player`] and the
//! [`BrightnessStore`], answers on the transport, and flushes dirty chains.
//! The firmware main loop calls [`Controller::run`] once per tick and feeds
//! received bytes into [`Controller::data_received`].

use heapless::{String, Vec};

use crate::brightness::BrightnessStore;
use crate::calibration::{
    CALIBRATION_NAME_MAX_LEN, Calibration, CalibrationStore, DEFAULT_CALIBRATION_NAME,
};
use crate::driver::ChainDriver;
use crate::link::{RX_TIMEOUT_MS, RxBuffer, TX_BUFFER_SIZE, Transport};
use crate::player::{Player, validate_sequence};
use crate::protocol::{
    Command, Message, RID_UNKNOWN, Request, Response, STATUS_ERROR, VERSION, WireLed, WireStep,
    format_message, wire_led_level,
};
use crate::sequence::StepTiming;
use crate::show::{MAX_LED_OBJECTS, Show};
use crate::time::{TimeInstant, TimeSource};
use crate::types::{BrightnessError, CHAIN_COUNT, LedAddress, LedObj};

/// Executes commands. Kept apart from the RX buffer so a request borrowed
/// from it can be handled without copying.
struct Engine<'t, I: TimeInstant, T: TimeSource<I>, D: ChainDriver, C: CalibrationStore> {
    store: BrightnessStore<D>,
    player: Player<'t, I, T>,
    show: Show,
    calibrations: C,
    calibration_name: String<CALIBRATION_NAME_MAX_LEN>,
}

/// The installation's controller.
///
/// # Type Parameters
/// * `'t` - Lifetime of the time source reference
/// * `I` - Time instant type
/// * `T` - Time source implementation type
/// * `D` - Chain driver
/// * `C` - Calibration storage
/// * `X` - Response transport
pub struct Controller<'t, I, T, D, C, X>
where
    I: TimeInstant,
    T: TimeSource<I>,
    D: ChainDriver,
    C: CalibrationStore,
    X: Transport,
{
    time_source: &'t T,
    rx: RxBuffer<I>,
    tx: [u8; TX_BUFFER_SIZE],
    transport: X,
    engine: Engine<'t, I, T, D, C>,
}

impl<'t, I, T, D, C, X> Controller<'t, I, T, D, C, X>
where
    I: TimeInstant,
    T: TimeSource<I>,
    D: ChainDriver,
    C: CalibrationStore,
    X: Transport,
{
    /// Creates a controller. Call [`initialize`](Self::initialize) before the first [`run`](Self::run).
    pub fn new(time_source: &'t T, driver: D, calibrations: C, transport: X) -> Self {
        let default = Calibration::default();
        Self {
            time_source,
            rx: RxBuffer::new(),
            tx: [0; TX_BUFFER_SIZE],
            transport,
            engine: Engine {
                store: BrightnessStore::new(driver),
                player: Player::new(time_source),
                show: Show::new(),
                calibrations,
                calibration_name: default.name,
            },
        }
    }

    /// Loads the stored calibration and drives every LED to its idle brightness.
    ///
    /// A missing, unreadable or corrupt calibration leaves the defaults in place,
    /// as does one with a level above [`BRG_MAX`](crate::BRG_MAX).
    pub fn initialize(&mut self) {
        let engine = &mut self.engine;
        match engine.calibrations.load() {
            Ok(Some(calibration)) if calibration.validate().is_err() => {
                warn!("calibration '{}' out of range, using defaults", calibration.name.as_str());
                engine.reset_calibration();
            }
            Ok(Some(calibration)) => {
                engine.store.load_idle_table(&calibration.idle);
                engine.calibration_name = calibration.name;
                info!("calibration '{}' loaded", engine.calibration_name.as_str());
            }
            Ok(None) => {
                info!("no calibration stored, using defaults");
                engine.reset_calibration();
            }
            Err(_) => {
                warn!("calibration load failed, using defaults");
                engine.reset_calibration();
            }
        }

        engine.store.apply_idle_to_active();
        self.flush(true);
        info!("controller initialized");
    }

    /// Feeds bytes received from the transport.
    ///
    /// A completed request is executed on the next [`run`](Self::run).
    pub fn data_received(&mut self, chunk: &[u8]) {
        let now = self.time_source.now();
        match self.rx.push(chunk, now) {
            Ok(true) => debug!("request received: {} bytes", self.rx.len()),
            Ok(false) => {}
            Err(err) => error!("RX failed: {}", err),
        }
    }

    /// One polling tick: handle a pending request, advance the player, flush dirty chains.
    pub fn run(&mut self) {
        if self.rx.frame().is_some() {
            self.process_request();
        } else if self.rx.expire(self.time_source.now(), RX_TIMEOUT_MS) {
            error!("RX timeout expired, request dropped");
        }

        let engine = &mut self.engine;
        engine.player.run(&engine.show, &mut engine.store);
        self.flush(false);
    }

    /// Commits dirty chains, or every chain when `force` is set.
    ///
    /// A failed chain stays dirty and is retried on the next flush.
    pub fn flush(&mut self, force: bool) {
        for chain in 0..CHAIN_COUNT {
            if self.engine.store.flush(chain, force).is_err() {
                error!("chain {} commit failed", chain);
            }
        }
    }

    fn process_request(&mut self) {
        let Some(frame) = self.rx.frame() else {
            return;
        };

        let response = match Request::parse(frame) {
            Ok(request) => self.engine.handle(&request),
            Err(err) => {
                Response::error(RID_UNKNOWN, format_args!("Deserialize JSON string failed: {}", err))
            }
        };

        match response.encode(&mut self.tx) {
            Ok(len) => {
                if self.transport.send(&self.tx[..len]).is_err() {
                    error!("failed to send response");
                }
            }
            Err(_) => error!("failed to serialize response"),
        }

        self.rx.clear();
    }

    /// Returns the player.
    pub fn player(&self) -> &Player<'t, I, T> {
        &self.engine.player
    }

    /// Returns the brightness store.
    pub fn store(&self) -> &BrightnessStore<D> {
        &self.engine.store
    }

    /// Returns the show of the last accepted `play_show`.
    pub fn show(&self) -> &Show {
        &self.engine.show
    }

    /// Returns the name of the active calibration.
    pub fn calibration_name(&self) -> &str {
        &self.engine.calibration_name
    }

    /// Returns the calibration storage.
    pub fn calibrations(&self) -> &C {
        &self.engine.calibrations
    }

    /// Returns the transport.
    pub fn transport(&self) -> &X {
        &self.transport
    }

    /// Returns a mutable reference to the transport.
    pub fn transport_mut(&mut self) -> &mut X {
        &mut self.transport
    }
}

impl<'t, I, T, D, C> Engine<'t, I, T, D, C>
where
    I: TimeInstant,
    T: TimeSource<I>,
    D: ChainDriver,
    C: CalibrationStore,
{
    fn handle(&mut self, request: &Request<'_>) -> Response<'_> {
        let Some(rid) = request.rid else {
            return Response::error(RID_UNKNOWN, format_args!("Missing key 'rid'"));
        };
        let Some(cmd) = request.cmd else {
            return Response::error(rid, format_args!("Missing key 'cmd'"));
        };
        let Some(command) = Command::from_name(cmd) else {
            warn!("unknown command '{}'", cmd);
            return Response::error(rid, format_args!("Unknown 'cmd': '{}'", cmd));
        };

        info!("CMD '{}' [...]", command.name());
        let result = match command {
            Command::GetVersion => Ok(self.get_version(rid)),
            Command::GetCalibrationName => Ok(self.get_calibration_name(rid)),
            Command::DeleteCalibration => self.delete_calibration(rid),
            Command::SaveCalibration => self.save_calibration(rid, request),
            Command::SetBrightness => self.set_brightness(rid, request),
            Command::GetBrightness => self.get_brightness(rid, request),
            Command::PlayShow => self.play_show(rid, request),
            Command::StopShow => Ok(self.stop_show(rid)),
        };

        match result {
            Ok(response) => {
                info!("CMD '{}' [OK]", command.name());
                response
            }
            Err(msg) => {
                warn!("CMD '{}' [FAILED]: {}", command.name(), msg.as_str());
                Response {
                    status: STATUS_ERROR,
                    msg: Some(msg),
                    ..Response::ok(rid)
                }
            }
        }
    }

    fn get_version(&self, rid: i32) -> Response<'_> {
        Response {
            version: Some(VERSION),
            ..Response::ok(rid)
        }
    }

    fn get_calibration_name(&self, rid: i32) -> Response<'_> {
        Response {
            name: Some(self.calibration_name.as_str()),
            ..Response::ok(rid)
        }
    }

    fn delete_calibration(&mut self, rid: i32) -> Result<Response<'_>, Message> {
        self.calibrations
            .delete()
            .map_err(|_| format_message(format_args!("Failed to delete calibration")))?;

        self.reset_calibration();
        self.player.abort(&mut self.store);
        Ok(Response::ok(rid))
    }

    fn save_calibration(&mut self, rid: i32, request: &Request<'_>) -> Result<Response<'_>, Message> {
        let name = required(request.name, "name")?;
        let calibration = Calibration::new(name, self.store.idle_table())
            .map_err(|err| format_message(format_args!("{}", err)))?;

        self.calibrations
            .save(&calibration)
            .map_err(|_| format_message(format_args!("Failed to save calibration")))?;

        self.calibration_name = calibration.name;
        Ok(Response::ok(rid))
    }

    fn set_brightness(&mut self, rid: i32, request: &Request<'_>) -> Result<Response<'_>, Message> {
        let entries = required(request.leds.as_ref(), "leds")?;
        if entries.is_empty() {
            return Err(format_message(format_args!("Invalid 'leds' size: 0")));
        }

        // Validate everything before touching any table.
        let mut leds: Vec<LedObj, MAX_LED_OBJECTS> = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            let &[board, led, brightness] = entry.as_slice() else {
                return Err(format_message(format_args!(
                    "Invalid LED entry {}: expected [board, led, brightness]",
                    index
                )));
            };
            let obj = LedAddress::from_wire(board, led)
                .map_err(BrightnessError::from)
                .and_then(|address| LedObj::new(address, brightness))
                .map_err(|err| format_message(format_args!("Invalid LED entry {}: {}", index, err)))?;
            // Capacity matches the request's.
            let _ = leds.push(obj);
        }

        // A running show keeps control of its own LEDs.
        let show_running = !self.player.is_idle();
        for obj in &leds {
            self.store.set_idle_led(obj.address, obj.brightness);
            if !show_running || !self.show.contains(obj.address) {
                self.store.set_active_led(obj.address, obj.brightness);
            }
        }
        Ok(Response::ok(rid))
    }

    fn get_brightness(&self, rid: i32, request: &Request<'_>) -> Result<Response<'_>, Message> {
        let entries = required(request.leds.as_ref(), "leds")?;
        if entries.is_empty() {
            return Err(format_message(format_args!("Invalid 'leds' size: 0")));
        }

        let mut levels = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            let &[board, led] = entry.as_slice() else {
                return Err(format_message(format_args!(
                    "Invalid LED entry {}: expected [board, led]",
                    index
                )));
            };
            let address = LedAddress::from_wire(board, led)
                .map_err(|err| format_message(format_args!("Invalid LED entry {}: {}", index, err)))?;
            // Capacity matches the request's.
            let _ = levels.push(wire_led_level((board, led), self.store.idle(address)));
        }

        Ok(Response {
            leds: Some(levels),
            ..Response::ok(rid)
        })
    }

    fn play_show(&mut self, rid: i32, request: &Request<'_>) -> Result<Response<'_>, Message> {
        let groups = required(request.groups.as_ref(), "groups")?;
        let sequence = required(request.sequence.as_ref(), "sequence")?;

        let show = build_show(groups, sequence)?;
        validate_sequence(&show).map_err(|err| format_message(format_args!("{}", err)))?;

        if !self.player.is_idle() {
            if request.force.unwrap_or(0) == 0 {
                return Err(format_message(format_args!("Show already running")));
            }
            self.player.abort(&mut self.store);
        }

        // The player is idle here, so nothing refers to the old show anymore.
        self.show = show;
        self.player
            .play_sequence(&self.show)
            .map_err(|err| format_message(format_args!("{}", err)))?;
        Ok(Response::ok(rid))
    }

    fn stop_show(&mut self, rid: i32) -> Response<'_> {
        self.player.abort(&mut self.store);
        Response::ok(rid)
    }

    /// Dark idle table named [`DEFAULT_CALIBRATION_NAME`].
    fn reset_calibration(&mut self) {
        self.store.load_default_idle();
        self.calibration_name.clear();
        // Fits: the default name is shorter than the capacity.
        let _ = self.calibration_name.push_str(DEFAULT_CALIBRATION_NAME);
    }
}

fn required<T>(value: Option<T>, key: &str) -> Result<T, Message> {
    value.ok_or_else(|| format_message(format_args!("Missing key '{}'", key)))
}

fn build_show<const G: usize, const L: usize, const S: usize>(
    groups: &Vec<Vec<WireLed, L>, G>,
    sequence: &Vec<WireStep, S>,
) -> Result<Show, Message> {
    let mut show = Show::new();

    for (group_index, group) in groups.iter().enumerate() {
        let mut leds: Vec<LedAddress, MAX_LED_OBJECTS> = Vec::new();
        for &[board, led] in group {
            let address = LedAddress::from_wire(board, led).map_err(|err| {
                format_message(format_args!("Invalid group {}: {}", group_index, err))
            })?;
            leds.push(address).map_err(|_| {
                format_message(format_args!("Invalid group {}: too many LEDs", group_index))
            })?;
        }
        show.add_group(&leds)
            .map_err(|err| format_message(format_args!("Invalid group {}: {}", group_index, err)))?;
    }

    for (step_index, step) in sequence.iter().enumerate() {
        let [group, ramp_down_ms, pause_ms, ramp_up_ms, pulse_ms, repetitions, idle_return] = *step;
        let timing = StepTiming::new(ramp_down_ms, pause_ms, ramp_up_ms, pulse_ms)
            .repetitions(repetitions)
            .idle_return(idle_return != 0);
        let group = usize::try_from(group).unwrap_or(usize::MAX);
        show.add_step(group, timing).map_err(|err| {
            format_message(format_args!("Invalid sequence step {}: {}", step_index, err))
        })?;
    }

    Ok(show)
}
