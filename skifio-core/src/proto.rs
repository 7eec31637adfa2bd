//! Wire message codec.
//!
//! Every message starts with a one-byte type tag; the remaining layout is
//! fixed per tag except for the DAC/ADC array payloads, which carry a
//! 16-bit little-endian length followed by that many native-endian `i32`
//! points (for ADC, in units of [`AdcArray`](crate::point::AdcArray) —
//! `len` there counts arrays, not individual points).
//!
//! `common/ipp/src/ipp.hpp` in the original firmware plays the same role
//! this module plays for both ends of the link: one definition of the
//! message set, shared.

use crate::constants::{
    ADC_COUNT, ADC_MSG_MAX_POINTS, DAC_MSG_MAX_POINTS, DEBUG_MSG_MAX_LEN, ERROR_MSG_MAX_LEN,
    RPMSG_MAX_APP_MSG_LEN,
};
use crate::point::{AdcArray, Point};

/// Messages sent from the host application to the MCU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppMsg {
    /// Reserved tag; never constructed by this codec.
    None,
    /// Handshake: start (or restart) the session.
    Connect,
    /// Liveness ping sent when nothing else needed sending.
    KeepAlive,
    /// New discrete-output nibble (masked to the low 4 bits on encode).
    DoutUpdate(u8),
    /// A batch of DAC codes to enqueue, at most [`DAC_MSG_MAX_POINTS`].
    DacData(heapless::Vec<Point, DAC_MSG_MAX_POINTS>),
    /// Reset all MCU-side statistics counters.
    StatsReset,
}

/// Messages sent from the MCU to the host application.
#[derive(Debug, Clone, PartialEq)]
pub enum McuMsg {
    /// Reserved tag; never constructed by this codec.
    None,
    /// New discrete-input byte.
    DinUpdate(u8),
    /// A batch of ADC arrays, at most [`ADC_MSG_MAX_POINTS`].
    AdcData(heapless::Vec<AdcArray, ADC_MSG_MAX_POINTS>),
    /// Credit grant: the MCU is now willing to accept this many more DAC
    /// points.
    DacRequest(u32),
    /// Free-form debug text.
    Debug(heapless::String<DEBUG_MSG_MAX_LEN>),
    /// An error code plus free-form text.
    Error(u8, heapless::String<ERROR_MSG_MAX_LEN>),
}

mod tag {
    pub const NONE: u8 = 0x00;
    pub const CONNECT: u8 = 0x01;
    pub const KEEP_ALIVE: u8 = 0x02;
    pub const DOUT_UPDATE: u8 = 0x10;
    pub const DAC_DATA: u8 = 0x11;
    pub const STATS_RESET: u8 = 0x20;

    pub const DIN_UPDATE: u8 = 0x10;
    pub const ADC_DATA: u8 = 0x11;
    pub const DAC_REQUEST: u8 = 0x12;
    pub const ERROR: u8 = 0xE0;
    pub const DEBUG: u8 = 0xE1;
}

/// Decode failure. Per §7, the caller logs and drops the message; it is
/// never a reason to tear down the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// The first byte did not match any known tag for this direction.
    UnknownTag(u8),
    /// The buffer ended before the fixed part of the body did.
    Truncated,
    /// A declared array/string length would read past the end of the
    /// buffer.
    LengthOverflow,
}

impl AppMsg {
    /// Encode into `buf`, returning the number of bytes written.
    ///
    /// # Panics
    /// Panics if `buf` is shorter than the encoded length (an internal
    /// invariant violation: callers always size buffers to
    /// `RPMSG_MAX_APP_MSG_LEN`).
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        match self {
            AppMsg::None => {
                buf[0] = tag::NONE;
                1
            }
            AppMsg::Connect => {
                buf[0] = tag::CONNECT;
                1
            }
            AppMsg::KeepAlive => {
                buf[0] = tag::KEEP_ALIVE;
                1
            }
            AppMsg::DoutUpdate(v) => {
                buf[0] = tag::DOUT_UPDATE;
                buf[1] = *v;
                2
            }
            AppMsg::DacData(points) => {
                buf[0] = tag::DAC_DATA;
                let len = points.len() as u16;
                buf[1..3].copy_from_slice(&len.to_le_bytes());
                let mut off = 3;
                for p in points {
                    buf[off..off + 4].copy_from_slice(&p.to_ne_bytes());
                    off += 4;
                }
                off
            }
            AppMsg::StatsReset => {
                buf[0] = tag::STATS_RESET;
                1
            }
        }
    }

    /// Size this message would occupy on the wire; must equal what
    /// `encode` produces.
    pub fn wire_len(&self) -> usize {
        match self {
            AppMsg::None | AppMsg::Connect | AppMsg::KeepAlive | AppMsg::StatsReset => 1,
            AppMsg::DoutUpdate(_) => 2,
            AppMsg::DacData(points) => 3 + points.len() * 4,
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ParseError> {
        let &first = buf.first().ok_or(ParseError::Truncated)?;
        match first {
            tag::NONE => Ok(AppMsg::None),
            tag::CONNECT => Ok(AppMsg::Connect),
            tag::KEEP_ALIVE => Ok(AppMsg::KeepAlive),
            tag::DOUT_UPDATE => {
                let v = *buf.get(1).ok_or(ParseError::Truncated)?;
                Ok(AppMsg::DoutUpdate(v))
            }
            tag::DAC_DATA => {
                let len = read_u16_len(buf)? as usize;
                let body = &buf[3..];
                if body.len() < len * 4 {
                    return Err(ParseError::LengthOverflow);
                }
                let mut points = heapless::Vec::new();
                for chunk in body[..len * 4].chunks_exact(4) {
                    let p = Point::from_ne_bytes(chunk.try_into().unwrap());
                    points.push(p).map_err(|_| ParseError::LengthOverflow)?;
                }
                Ok(AppMsg::DacData(points))
            }
            tag::STATS_RESET => Ok(AppMsg::StatsReset),
            other => Err(ParseError::UnknownTag(other)),
        }
    }
}

impl McuMsg {
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        match self {
            McuMsg::None => {
                buf[0] = tag::NONE;
                1
            }
            McuMsg::DinUpdate(v) => {
                buf[0] = tag::DIN_UPDATE;
                buf[1] = *v;
                2
            }
            McuMsg::AdcData(arrays) => {
                buf[0] = tag::ADC_DATA;
                let len = arrays.len() as u16;
                buf[1..3].copy_from_slice(&len.to_le_bytes());
                let mut off = 3;
                for arr in arrays {
                    for p in arr {
                        buf[off..off + 4].copy_from_slice(&p.to_ne_bytes());
                        off += 4;
                    }
                }
                off
            }
            McuMsg::DacRequest(count) => {
                buf[0] = tag::DAC_REQUEST;
                buf[1..5].copy_from_slice(&count.to_le_bytes());
                5
            }
            McuMsg::Debug(s) => {
                buf[0] = tag::DEBUG;
                let bytes = s.as_bytes();
                buf[1..1 + bytes.len()].copy_from_slice(bytes);
                buf[1 + bytes.len()] = 0;
                1 + bytes.len() + 1
            }
            McuMsg::Error(code, s) => {
                buf[0] = tag::ERROR;
                buf[1] = *code;
                let bytes = s.as_bytes();
                buf[2..2 + bytes.len()].copy_from_slice(bytes);
                buf[2 + bytes.len()] = 0;
                2 + bytes.len() + 1
            }
        }
    }

    pub fn wire_len(&self) -> usize {
        match self {
            McuMsg::None => 1,
            McuMsg::DinUpdate(_) => 2,
            McuMsg::AdcData(arrays) => 3 + arrays.len() * ADC_COUNT * 4,
            McuMsg::DacRequest(_) => 5,
            McuMsg::Debug(s) => 1 + s.len() + 1,
            McuMsg::Error(_, s) => 2 + s.len() + 1,
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ParseError> {
        let &first = buf.first().ok_or(ParseError::Truncated)?;
        match first {
            tag::NONE => Ok(McuMsg::None),
            tag::DIN_UPDATE => {
                let v = *buf.get(1).ok_or(ParseError::Truncated)?;
                Ok(McuMsg::DinUpdate(v))
            }
            tag::ADC_DATA => {
                let len = read_u16_len(buf)? as usize;
                let body = &buf[3..];
                if body.len() < len * ADC_COUNT * 4 {
                    return Err(ParseError::LengthOverflow);
                }
                let mut arrays = heapless::Vec::new();
                let mut off = 0;
                for _ in 0..len {
                    let mut arr: AdcArray = [0; ADC_COUNT];
                    for slot in arr.iter_mut() {
                        let chunk = &body[off..off + 4];
                        *slot = Point::from_ne_bytes(chunk.try_into().unwrap());
                        off += 4;
                    }
                    arrays.push(arr).map_err(|_| ParseError::LengthOverflow)?;
                }
                Ok(McuMsg::AdcData(arrays))
            }
            tag::DAC_REQUEST => {
                let bytes: [u8; 4] = buf
                    .get(1..5)
                    .ok_or(ParseError::Truncated)?
                    .try_into()
                    .unwrap();
                Ok(McuMsg::DacRequest(u32::from_le_bytes(bytes)))
            }
            tag::ERROR => {
                let code = *buf.get(1).ok_or(ParseError::Truncated)?;
                let s = read_cstr(&buf[2..])?;
                Ok(McuMsg::Error(code, s))
            }
            tag::DEBUG => {
                let s = read_cstr(&buf[1..])?;
                Ok(McuMsg::Debug(s))
            }
            other => Err(ParseError::UnknownTag(other)),
        }
    }
}

fn read_u16_len(buf: &[u8]) -> Result<u16, ParseError> {
    let bytes: [u8; 2] = buf
        .get(1..3)
        .ok_or(ParseError::Truncated)?
        .try_into()
        .unwrap();
    Ok(u16::from_le_bytes(bytes))
}

fn read_cstr<const N: usize>(buf: &[u8]) -> Result<heapless::String<N>, ParseError> {
    let nul = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let s = core::str::from_utf8(&buf[..nul]).map_err(|_| ParseError::LengthOverflow)?;
    let mut out = heapless::String::new();
    out.push_str(s).map_err(|_| ParseError::LengthOverflow)?;
    Ok(out)
}
