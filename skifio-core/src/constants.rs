//! Compile-time constants shared by both ends of the link.
//!
//! These mirror `source/common/include/common/config.h` in the original
//! firmware: one place both the MCU and the host agree on, instead of
//! duplicated literals on each side.

/// Number of ADC channels sampled on every tick.
pub const ADC_COUNT: usize = 6;

/// DAC code corresponding to 0 V.
pub const DAC_CODE_SHIFT: i32 = 32767;

/// DAC code step, in microvolts.
pub const DAC_STEP_UV: f64 = 315.7445;

/// ADC code step, in microvolts.
pub const ADC_STEP_UV: f64 = 346.8012;

/// Maximum length of a single RPMSG message, in bytes, for either direction.
pub const RPMSG_MAX_APP_MSG_LEN: usize = 496;
pub const RPMSG_MAX_MCU_MSG_LEN: usize = 496;

/// Host keep-alive transmit period.
pub const KEEP_ALIVE_PERIOD_MS: u32 = 100;
/// MCU-side deadline after which a silent host is declared dead.
pub const KEEP_ALIVE_MAX_DELAY_MS: u32 = 200;

/// Period between statistics report printouts, on either side.
pub const STATS_REPORT_PERIOD_MS: u32 = 10_000;

/// Minimum capacity of the MCU-side DAC ring buffer.
pub const DAC_BUFFER_SIZE: usize = 1024;
/// Minimum capacity of each MCU-side ADC ring buffer.
pub const ADC_BUFFER_SIZE: usize = 256;

/// Number of sample-ready interrupts ignored at startup to let the ADC
/// pipeline settle.
pub const FIRST_SAMPLES_TO_SKIP: u32 = 1;

/// Byte size of one wire-format array-length header (`u16`).
const ARRAY_HEADER_LEN: usize = 2;

/// Largest number of DAC points that fit in one `DacData` message body.
pub const DAC_MSG_MAX_POINTS: usize =
    (RPMSG_MAX_APP_MSG_LEN - 1 - ARRAY_HEADER_LEN) / core::mem::size_of::<i32>();

/// Largest number of ADC arrays (`ADC_COUNT` points each) that fit in one
/// `AdcData` message body.
pub const ADC_MSG_MAX_POINTS: usize =
    (RPMSG_MAX_MCU_MSG_LEN - 1 - ARRAY_HEADER_LEN) / (ADC_COUNT * core::mem::size_of::<i32>());

/// Largest `Debug` message text (one tag byte + NUL terminator reserved).
pub const DEBUG_MSG_MAX_LEN: usize = RPMSG_MAX_MCU_MSG_LEN - 1 - 1;
/// Largest `Error` message text (tag byte + code byte + NUL reserved).
pub const ERROR_MSG_MAX_LEN: usize = RPMSG_MAX_MCU_MSG_LEN - 2 - 1;

static_assertions::const_assert!(DAC_MSG_MAX_POINTS > 0);
static_assertions::const_assert!(ADC_MSG_MAX_POINTS > 0);
// An AdcData message carrying a full batch must itself fit in one RPMSG buffer.
static_assertions::const_assert!(
    1 + ARRAY_HEADER_LEN + ADC_MSG_MAX_POINTS * ADC_COUNT * core::mem::size_of::<i32>()
        <= RPMSG_MAX_MCU_MSG_LEN
);
