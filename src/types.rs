//! Hardware geometry, LED addressing and brightness levels.

/// Number of independent chains, each behind its own bus select line.
pub const CHAIN_COUNT: usize = 6;

/// Number of daisy-chained driver boards per chain.
pub const CHAIN_SIZE: usize = 10;

/// Number of LED channels per board (4 RGB groups of 3 channels).
pub const LED_COUNT: usize = 12;

/// Number of boards across all chains. Wire board numbers run `1..=BOARD_COUNT`.
pub const BOARD_COUNT: usize = CHAIN_COUNT * CHAIN_SIZE;

/// Number of LEDs across all chains.
pub const LED_COUNT_TOTAL: usize = CHAIN_COUNT * CHAIN_SIZE * LED_COUNT;

/// Logical brightness in percent, `0..=BRG_MAX`.
pub type Brightness = u8;

/// LED switched off.
pub const BRG_OFF: Brightness = 0;
/// Dim level used for ambient scenes.
pub const BRG_LOW: Brightness = 10;
/// Half brightness.
pub const BRG_MEDIUM: Brightness = 50;
/// Full brightness.
pub const BRG_MAX: Brightness = 100;

/// Brightness of every LED, indexed `[chain][board][led]`.
pub type BrightnessTable = [[[Brightness; LED_COUNT]; CHAIN_SIZE]; CHAIN_COUNT];

/// A table with every LED switched off.
pub const DARK_TABLE: BrightnessTable = [[[BRG_OFF; LED_COUNT]; CHAIN_SIZE]; CHAIN_COUNT];

/// Identifies one physical LED by its 0-based position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LedAddress {
    /// Chain index, `< CHAIN_COUNT`.
    pub chain: u8,
    /// Board index within the chain, `< CHAIN_SIZE`.
    pub board: u8,
    /// LED channel on the board, `< LED_COUNT`.
    pub led: u8,
}

impl LedAddress {
    /// Creates a validated address from 0-based indices.
    pub fn new(chain: u8, board: u8, led: u8) -> Result<Self, AddressError> {
        let address = Self { chain, board, led };
        address.validate()?;
        Ok(address)
    }

    /// Converts a 1-based wire address into an internal one.
    ///
    /// `board` is the global board number across all chains (`1..=BOARD_COUNT`),
    /// `led` the channel on that board (`1..=LED_COUNT`).
    pub fn from_wire(board: u16, led: u16) -> Result<Self, AddressError> {
        let board_idx = usize::from(board)
            .checked_sub(1)
            .filter(|idx| *idx < BOARD_COUNT)
            .ok_or(AddressError::Board(board))?;
        let led_idx = usize::from(led)
            .checked_sub(1)
            .filter(|idx| *idx < LED_COUNT)
            .ok_or(AddressError::Led(led))?;

        // All three fit in u8: BOARD_COUNT / CHAIN_SIZE, CHAIN_SIZE and LED_COUNT are small.
        Ok(Self {
            chain: (board_idx / CHAIN_SIZE) as u8,
            board: (board_idx % CHAIN_SIZE) as u8,
            led: led_idx as u8,
        })
    }

    /// Converts back to the 1-based `(board, led)` wire pair.
    pub fn to_wire(&self) -> (u16, u16) {
        let board = u16::from(self.chain) * CHAIN_SIZE as u16 + u16::from(self.board) + 1;
        (board, u16::from(self.led) + 1)
    }

    /// Checks every index against the hardware geometry.
    pub fn validate(&self) -> Result<(), AddressError> {
        if usize::from(self.chain) >= CHAIN_COUNT {
            return Err(AddressError::Chain(self.chain.into()));
        }
        if usize::from(self.board) >= CHAIN_SIZE {
            return Err(AddressError::Board(self.board.into()));
        }
        if usize::from(self.led) >= LED_COUNT {
            return Err(AddressError::Led(self.led.into()));
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn chain_idx(&self) -> usize {
        usize::from(self.chain)
    }

    #[inline]
    pub(crate) fn board_idx(&self) -> usize {
        usize::from(self.board)
    }

    #[inline]
    pub(crate) fn led_idx(&self) -> usize {
        usize::from(self.led)
    }
}

/// An LED address paired with a brightness value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LedObj {
    /// The LED.
    pub address: LedAddress,
    /// Its brightness, `0..=BRG_MAX`.
    pub brightness: Brightness,
}

impl LedObj {
    /// Creates a validated LED/brightness pair.
    ///
    /// Brightness above [`BRG_MAX`] is rejected, never clamped.
    pub fn new(address: LedAddress, brightness: u16) -> Result<Self, BrightnessError> {
        address.validate().map_err(BrightnessError::Address)?;
        let brightness = validate_brightness(brightness)?;
        Ok(Self { address, brightness })
    }
}

/// Checks a raw brightness against [`BRG_MAX`].
pub fn validate_brightness(value: u16) -> Result<Brightness, BrightnessError> {
    if value > u16::from(BRG_MAX) {
        return Err(BrightnessError::OutOfRange(value));
    }
    Ok(value as Brightness)
}

/// LED address validation errors.
///
/// Carries the offending index as it was supplied (0-based for internal
/// addresses, 1-based for wire addresses).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressError {
    /// Chain index out of range.
    Chain(u16),

    /// Board index out of range.
    Board(u16),

    /// LED index out of range.
    Led(u16),
}

impl core::fmt::Display for AddressError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AddressError::Chain(idx) => write!(f, "invalid chain index: {}", idx),
            AddressError::Board(idx) => write!(f, "invalid board index: {}", idx),
            AddressError::Led(idx) => write!(f, "invalid LED index: {}", idx),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AddressError {}

/// Brightness validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BrightnessError {
    /// Value above [`BRG_MAX`].
    OutOfRange(u16),

    /// The LED the value was meant for does not exist.
    Address(AddressError),
}

impl core::fmt::Display for BrightnessError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BrightnessError::OutOfRange(value) => {
                write!(f, "invalid brightness value: {} (max {})", value, BRG_MAX)
            }
            BrightnessError::Address(err) => write!(f, "{}", err),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BrightnessError {}

impl From<AddressError> for BrightnessError {
    fn from(err: AddressError) -> Self {
        BrightnessError::Address(err)
    }
}
