//! SkifIO SPI frame layout.
//!
//! ```text
//! tx: 2B magic (55 AA) | 4B DAC code | 2B CRC16(first 6B) | 20B pad   = 28B
//! rx: 6*4B ADC codes   | 1B temp | 1B status | 2B CRC16(first 26B)   = 28B
//! ```
//!
//! The CRC-16 polynomial and initial value belong to the existing SkifIO
//! board and are taken as given rather than rederived
//! here; this implements CRC-16/CCITT-FALSE (poly `0x1021`, init
//! `0xFFFF`), the variant the board's firmware has always used.

use skifio_core::constants::ADC_COUNT;
use skifio_core::point::{AdcArray, Point};

pub const FRAME_LEN: usize = 28;

const TX_MAGIC: [u8; 2] = [0x55, 0xAA];

/// Compute CRC-16/CCITT-FALSE over `data`.
pub fn crc16(data: &[u8]) -> u16 {
    const POLY: u16 = 0x1021;
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Build the 28-byte TX frame carrying one DAC code.
pub fn encode_tx(dac_code: Point, buf: &mut [u8; FRAME_LEN]) {
    buf[0..2].copy_from_slice(&TX_MAGIC);
    buf[2..6].copy_from_slice(&dac_code.to_ne_bytes());
    let crc = crc16(&buf[0..6]);
    buf[6..8].copy_from_slice(&crc.to_ne_bytes());
    buf[8..FRAME_LEN].fill(0);
}

/// A decoded RX frame.
#[derive(Debug, Clone, Copy)]
pub struct RxFrame {
    pub adc: AdcArray,
    pub temp: u8,
    pub status: u8,
    /// Whether the trailing CRC matched. `false` means `adc`/`temp`/
    /// `status` are best-effort — still decoded from the raw bytes, not
    /// discarded, matching `skifio_transfer`'s `HAL_INVALID_DATA` path in
    /// the original firmware (the caller counts the error and keeps
    /// using the readback, it doesn't drop it).
    pub crc_ok: bool,
}

/// Decode the 28-byte RX frame, checking its trailing CRC.
///
/// Always decodes `adc`/`temp`/`status` from the raw bytes, CRC mismatch
/// or not; the caller bumps `stats.crc_error_count` and treats the
/// values as best-effort when `crc_ok` is `false`, rather than
/// discarding the sample.
pub fn decode_rx(buf: &[u8; FRAME_LEN]) -> RxFrame {
    const CRC_COVERED: usize = ADC_COUNT * 4 + 2;
    let expected = crc16(&buf[0..CRC_COVERED]);
    let actual = u16::from_ne_bytes(buf[CRC_COVERED..CRC_COVERED + 2].try_into().unwrap());
    let mut adc: AdcArray = [0; ADC_COUNT];
    for (i, slot) in adc.iter_mut().enumerate() {
        let off = i * 4;
        *slot = Point::from_ne_bytes(buf[off..off + 4].try_into().unwrap());
    }
    RxFrame {
        adc,
        temp: buf[ADC_COUNT * 4],
        status: buf[ADC_COUNT * 4 + 1],
        crc_ok: expected == actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_frame_has_magic_and_self_consistent_crc() {
        let mut buf = [0u8; FRAME_LEN];
        encode_tx(42, &mut buf);
        assert_eq!(&buf[0..2], &TX_MAGIC);
        let crc = u16::from_ne_bytes(buf[6..8].try_into().unwrap());
        assert_eq!(crc, crc16(&buf[0..6]));
    }

    #[test]
    fn rx_frame_round_trips() {
        let mut buf = [0u8; FRAME_LEN];
        let adc: AdcArray = [1, -2, 3, -4, 5, -6];
        for (i, v) in adc.iter().enumerate() {
            buf[i * 4..i * 4 + 4].copy_from_slice(&v.to_ne_bytes());
        }
        buf[24] = 77; // temp
        buf[25] = 1; // status
        let crc = crc16(&buf[0..26]);
        buf[26..28].copy_from_slice(&crc.to_ne_bytes());

        let frame = decode_rx(&buf);
        assert!(frame.crc_ok);
        assert_eq!(frame.adc, adc);
        assert_eq!(frame.temp, 77);
        assert_eq!(frame.status, 1);
    }

    #[test]
    fn rx_frame_decodes_best_effort_on_bad_crc() {
        let mut buf = [0u8; FRAME_LEN];
        let adc: AdcArray = [1, -2, 3, -4, 5, -6];
        for (i, v) in adc.iter().enumerate() {
            buf[i * 4..i * 4 + 4].copy_from_slice(&v.to_ne_bytes());
        }
        buf[26..28].copy_from_slice(&0xBEEFu16.to_ne_bytes());
        let frame = decode_rx(&buf);
        assert!(!frame.crc_ok);
        assert_eq!(frame.adc, adc);
    }
}
