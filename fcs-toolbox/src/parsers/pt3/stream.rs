const BUFFER_SIZE: usize = 1024 * 16;

use std::io::Read;

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};

use crate::errors::DecodeError;
use crate::parsers::pt3::header::Pt3Header;
use crate::parsers::pt3::records::{decode, DecodeContext, DecodedRecord};
use crate::photons::{MarkerEvent, PhotonStream};
use crate::TTTRStream;

/// Iterator over the records of a PT3 file.
///
/// Records are pulled from `source` in chunks of `BUFFER_SIZE` and decoded one
/// by one. Exactly `num_records` records are produced; if the source runs dry
/// before that a single `DecodeError::Truncated` is yielded and the iteration
/// stops.
pub struct Pt3Stream<R: Read> {
    source: R,
    click_buffer: Vec<u32>,
    byte_buffer: Vec<u8>,
    position: usize,
    num_records: usize,
    click_count: usize,
    byte_offset: u64,
    overflow_correction: u64,
    ctx: DecodeContext,
    finished: bool,
}

impl<R: Read> Pt3Stream<R> {
    /// `source` must be positioned on the first record, `byte_offset` is that
    /// position and is only used for error reports.
    pub fn new(source: R, num_records: usize, ctx: DecodeContext, byte_offset: u64) -> Self {
        Self {
            source,
            click_buffer: Vec::with_capacity(BUFFER_SIZE.min(num_records)),
            byte_buffer: Vec::with_capacity(4 * BUFFER_SIZE.min(num_records)),
            position: 0,
            num_records,
            click_count: 0,
            byte_offset,
            overflow_correction: 0,
            ctx,
            finished: false,
        }
    }

    pub fn from_header(source: R, header: &Pt3Header) -> Self {
        Self::new(
            source,
            header.records(),
            DecodeContext::from_header(header),
            header.data_offset,
        )
    }

    /// Records handed out so far.
    pub fn records_read(&self) -> usize {
        self.click_count
    }

    pub fn num_records(&self) -> usize {
        self.num_records
    }

    fn fill_buffer(&mut self) -> Result<(), DecodeError> {
        let wanted = (self.num_records - self.click_count).min(BUFFER_SIZE);
        self.byte_buffer.clear();
        let got = (&mut self.source)
            .take(4 * wanted as u64)
            .read_to_end(&mut self.byte_buffer)?;

        let complete = got / 4;
        if complete < wanted {
            return Err(DecodeError::Truncated {
                expected: self.num_records,
                found: self.click_count + complete,
                offset: self.byte_offset + (4 * complete) as u64,
            });
        }

        self.click_buffer.resize(complete, 0);
        LittleEndian::read_u32_into(&self.byte_buffer[..4 * complete], &mut self.click_buffer);
        self.byte_offset += got as u64;
        self.position = 0;
        Ok(())
    }
}

impl<R: Read> TTTRStream for Pt3Stream<R> {
    type RecordSize = u32;

    #[inline(always)]
    fn parse_record(&mut self, raw_record: u32) -> DecodedRecord {
        decode(raw_record, &mut self.overflow_correction, &self.ctx)
    }
}

impl<R: Read> Iterator for Pt3Stream<R> {
    type Item = Result<DecodedRecord, DecodeError>;

    #[inline(always)]
    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.click_count >= self.num_records {
            return None;
        }
        if self.position == self.click_buffer.len() {
            if let Err(err) = self.fill_buffer() {
                self.finished = true;
                return Some(Err(err));
            }
        }

        let raw = self.click_buffer[self.position];
        self.position += 1;
        self.click_count += 1;
        Some(Ok(self.parse_record(raw)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.num_records - self.click_count;
        (0, Some(left))
    }
}

/// Drains a record stream into the photon arrays.
///
/// Overflow records only move the time base, markers are stored apart and
/// records on unknown channels are logged and skipped.
pub fn collect_photons<I>(records: I) -> Result<PhotonStream, DecodeError>
where
    I: Iterator<Item = Result<DecodedRecord, DecodeError>>,
{
    let mut photons = PhotonStream::with_capacity(records.size_hint().1.unwrap_or(0));

    for (idx, record) in records.enumerate() {
        match record? {
            DecodedRecord::Photon {
                channel,
                microtime,
                time,
                ..
            } => photons.push(channel, time, microtime),
            DecodedRecord::Overflow => photons.overflows += 1,
            DecodedRecord::Marker { marker, time, .. } => photons.markers.push(MarkerEvent {
                marker,
                time,
                photon_index: photons.len(),
            }),
            DecodedRecord::Unknown { channel } => {
                photons.unknown_records += 1;
                debug!("{}", DecodeError::UnknownChannel { record: idx, channel });
            }
        }
    }

    if photons.unknown_records > 0 {
        warn!(
            "Skipped {} records with unknown channels",
            photons.unknown_records
        );
    }
    debug!(
        "Decoded {} photons, {} markers, {} overflows",
        photons.len(),
        photons.markers.len(),
        photons.overflows
    );
    Ok(photons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::pt3::records::tests::{photon, special};

    fn to_bytes(records: &[u32]) -> Vec<u8> {
        records.iter().flat_map(|r| r.to_le_bytes().to_vec()).collect()
    }

    #[test]
    fn test_stream_decodes_all_records() {
        let records = vec![photon(1, 0, 5), special(0, 0), photon(2, 3, 1), special(2, 4)];
        let bytes = to_bytes(&records);
        let stream = Pt3Stream::new(&bytes[..], 4, DecodeContext::new(1.0, 1.0), 0);
        let decoded: Vec<_> = stream.collect::<Result<_, _>>().unwrap();

        assert_eq!(decoded.len(), 4);
        assert_eq!(decoded[1], DecodedRecord::Overflow);
        match decoded[2] {
            DecodedRecord::Photon { time, .. } => assert_eq!(time, 65536.0 + 1.0 + 3.0),
            other => panic!("expected a photon, got {:?}", other),
        }
    }

    #[test]
    fn test_stream_stops_at_num_records() {
        let records = vec![photon(1, 0, 1), photon(1, 0, 2), photon(1, 0, 3)];
        let bytes = to_bytes(&records);
        let stream = Pt3Stream::new(&bytes[..], 2, DecodeContext::new(1.0, 1.0), 0);
        assert_eq!(stream.count(), 2);
    }

    #[test]
    fn test_truncated_stream() {
        let records = vec![photon(1, 0, 1), photon(1, 0, 2)];
        let mut bytes = to_bytes(&records);
        bytes.push(0xAB);
        let mut stream = Pt3Stream::new(&bytes[..], 5, DecodeContext::new(1.0, 1.0), 100);

        match stream.next() {
            Some(Err(DecodeError::Truncated {
                expected,
                found,
                offset,
            })) => {
                assert_eq!(expected, 5);
                assert_eq!(found, 2);
                assert_eq!(offset, 108);
            }
            other => panic!("expected truncation, got {:?}", other),
        }
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_collect_photons() {
        let records = vec![
            photon(1, 2, 10),
            special(0, 0),
            special(1, 3),
            photon(9, 0, 0),
            photon(2, 1, 4),
        ];
        let bytes = to_bytes(&records);
        let stream = Pt3Stream::new(&bytes[..], records.len(), DecodeContext::new(1.0, 1.0), 0);
        let photons = collect_photons(stream).unwrap();

        assert_eq!(photons.channel, vec![1, 2]);
        assert_eq!(photons.time, vec![12.0, 65536.0 + 4.0 + 1.0]);
        assert_eq!(photons.microtime, vec![2, 1]);
        assert_eq!(photons.overflows, 1);
        assert_eq!(photons.unknown_records, 1);
        assert_eq!(
            photons.markers,
            vec![MarkerEvent {
                marker: 1,
                time: 65539.0,
                photon_index: 1
            }]
        );
    }

    #[test]
    fn test_large_stream_crosses_buffers() {
        let n = BUFFER_SIZE * 2 + 17;
        let records: Vec<u32> = (0..n).map(|i| photon(1, 0, (i % 65536) as u32)).collect();
        let bytes = to_bytes(&records);
        let stream = Pt3Stream::new(&bytes[..], n, DecodeContext::new(1.0, 1.0), 0);
        let photons = collect_photons(stream).unwrap();
        assert_eq!(photons.len(), n);
    }
}
