use crate::parsers::pt3::header::Pt3Header;

/// Number of sync periods counted by `nsync` before it wraps.
pub const T3WRAPAROUND: u64 = 65536;

/// Channel id PicoHarp uses for overflow and marker records.
pub const SPECIAL_CHANNEL: u8 = 0xF;

/// Time scales needed to turn a raw record into an absolute time.
///
/// Both values are in nanoseconds.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DecodeContext {
    pub sync_period: f64,
    pub resolution: f64,
}

impl DecodeContext {
    pub fn new(sync_period: f64, resolution: f64) -> Self {
        Self {
            sync_period,
            resolution,
        }
    }

    pub fn from_header(header: &Pt3Header) -> Self {
        Self::new(header.sync_period(), header.resolution())
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum DecodedRecord {
    /// A detected photon. `time` is in nanoseconds.
    Photon {
        channel: u8,
        nsync: u16,
        microtime: u16,
        time: f64,
    },
    /// `nsync` wrapped around.
    Overflow,
    /// External marker. The micro-time bits hold the marker id, so `time` has
    /// sync resolution only.
    Marker { marker: u8, nsync: u16, time: f64 },
    /// Channel outside of the ones PicoHarp writes.
    Unknown { channel: u8 },
}

/// Decodes a PicoHarp T3 record.
///
/// Bit layout, most significant first: 4 bits channel, 12 bits micro-time
/// (marker id for special records), 16 bits nsync.
#[inline(always)]
pub fn decode(raw: u32, overflow_offset: &mut u64, ctx: &DecodeContext) -> DecodedRecord {
    let nsync = (raw & 0xFFFF) as u16;
    let channel = ((raw >> 28) & 0xF) as u8;

    match channel {
        1..=4 => {
            let microtime = ((raw >> 16) & 0xFFF) as u16;
            let true_nsync = *overflow_offset * T3WRAPAROUND + nsync as u64;
            let time = (true_nsync as f64) * ctx.sync_period + (microtime as f64) * ctx.resolution;
            DecodedRecord::Photon {
                channel,
                nsync,
                microtime,
                time,
            }
        }
        SPECIAL_CHANNEL => {
            let marker = ((raw >> 16) & 0xF) as u8;
            if marker == 0 {
                *overflow_offset += 1;
                DecodedRecord::Overflow
            } else {
                let true_nsync = *overflow_offset * T3WRAPAROUND + nsync as u64;
                DecodedRecord::Marker {
                    marker,
                    nsync,
                    time: (true_nsync as f64) * ctx.sync_period,
                }
            }
        }
        _ => DecodedRecord::Unknown { channel },
    }
}
