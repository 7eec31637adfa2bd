//! Driver for the SkifIO analog I/O board: one SPI transfer per sample
//! tick (one DAC code out, six ADC codes in), plus discrete I/O and the
//! sample-ready/DAC-enable GPIOs.
#![no_std]

pub mod driver;
pub mod frame;

pub use driver::{DinIrq, DiscreteIo, Error, SampleReadyIrq, SkifIo, READY_DELAY_NS};
pub use frame::{crc16, decode_rx, encode_tx, RxFrame, FRAME_LEN};
