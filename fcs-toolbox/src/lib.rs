#[macro_use]
extern crate num_derive;
extern crate byteorder;

pub mod config;
pub mod errors;
pub mod headers;
pub mod parsers;
pub mod photons;
pub mod tttr_tools;

use crate::parsers::pt3::DecodedRecord;

pub(crate) trait TTTRStream {
    type RecordSize;
    fn parse_record(&mut self, raw_record: Self::RecordSize) -> DecodedRecord;
}

/// The TTTRFile trait ensures that all files we support know the time resolution
/// of their records, in nanoseconds, and what type of records they contain.
pub trait TTTRFile {
    fn time_resolution(&self) -> f64;
    fn sync_period(&self) -> f64;
    fn record_type(&self) -> headers::RecordType;
}
