//! RTP packet handling.

use bytes::{Buf, Bytes};
use failure::{format_err, Error};
use log::trace;
use pretty_hex::PrettyHex;

mod reorder;

pub use reorder::Reorderer;

/// An RTP packet, as an owned value.
///
/// Only `sequence_number` matters to the [`Reorderer`]; the other fields
/// pass through it untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub mark: bool,
    pub payload: Bytes,
}

/// Returns the range within `buf` that `subset` occupies, or `None` if
/// `subset` is empty or isn't a subslice of `buf`.
fn as_range(buf: &Bytes, subset: &[u8]) -> Option<std::ops::Range<usize>> {
    if subset.is_empty() {
        return None;
    }
    let start = (subset.as_ptr() as usize).checked_sub(buf.as_ptr() as usize)?;
    let end = start + subset.len();
    if end > buf.len() {
        return None;
    }
    Some(start..end)
}

impl Packet {
    /// Parses a raw RTP datagram, slicing the payload out of `data`
    /// without copying.
    pub fn parse(mut data: Bytes) -> Result<Self, Error> {
        let reader = rtp_rs::RtpReader::new(&data[..])
            .map_err(|e| format_err!("corrupt RTP header: {:?}", e))?;
        let sequence_number = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = reader.timestamp();
        let ssrc = reader.ssrc();
        let mark = reader.mark();
        trace!("pkt{} seq={:04x} ts={}", if mark { "(M)" } else { "   " }, sequence_number,
               timestamp);
        trace!("{:?}", data.hex_dump());
        let payload_range = as_range(&data, reader.payload())
            .ok_or_else(|| format_err!("empty RTP payload"))?;
        data.truncate(payload_range.end);
        data.advance(payload_range.start);
        Ok(Packet {
            sequence_number,
            timestamp,
            ssrc,
            mark,
            payload: data,
        })
    }
}
