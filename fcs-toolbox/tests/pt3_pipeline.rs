use std::io::Write;

use byteorder::{ByteOrder, LittleEndian};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::NamedTempFile;

use fcs_toolbox::errors::DecodeError;
use fcs_toolbox::headers::File;
use fcs_toolbox::parsers::pt3;
use fcs_toolbox::tttr_tools::analysis::{fcs_analysis, FcsParams};
use fcs_toolbox::tttr_tools::multitau::{CorrelationControl, CorrelatorConfig};

const HEADER_SIZE: usize = 728;

/// Smallest valid PicoHarp T3 header: 100 ns sync period, 4 ps resolution.
fn header(records: i32) -> Vec<u8> {
    let mut bytes = vec![0u8; HEADER_SIZE];
    bytes[..12].copy_from_slice(b"PicoHarp 300");
    LittleEndian::write_i32(&mut bytes[332..336], 32); // BitsPerRecord
    LittleEndian::write_i32(&mut bytes[348..352], 3); // MeasurementMode
    LittleEndian::write_f32(&mut bytes[584..588], 0.004); // Resolution
    LittleEndian::write_i32(&mut bytes[704..708], 10_000_000); // CntRate0
    LittleEndian::write_i32(&mut bytes[720..724], records);
    bytes
}

fn photon(channel: u32, microtime: u32, nsync: u32) -> u32 {
    (channel << 28) | (microtime << 16) | nsync
}

fn special(marker: u32, nsync: u32) -> u32 {
    (0xF << 28) | (marker << 16) | nsync
}

/// Random two channel acquisition with overflows and one marker.
fn synthetic_records(n_photons: usize) -> (Vec<u32>, u64) {
    let mut rng = StdRng::seed_from_u64(42);
    let mut records = Vec::with_capacity(n_photons + 64);
    let mut sync: u64 = 0;
    let mut overflows = 0;
    for i in 0..n_photons {
        sync += rng.gen_range(1..400);
        while sync >= (overflows + 1) * 65536 {
            records.push(special(0, 0));
            overflows += 1;
        }
        let nsync = (sync % 65536) as u32;
        if i == n_photons / 2 {
            records.push(special(1, nsync));
        }
        let channel = rng.gen_range(1..3);
        records.push(photon(channel, rng.gen_range(0..4096), nsync));
    }
    (records, overflows)
}

fn write_pt3(records: &[u32], declared: i32) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".pt3").tempfile().unwrap();
    file.write_all(&header(declared)).unwrap();
    for rec in records {
        file.write_all(&rec.to_le_bytes()).unwrap();
    }
    file.flush().unwrap();
    file
}

#[test]
fn decode_synthetic_file() {
    let (records, overflows) = synthetic_records(5000);
    let file = write_pt3(&records, records.len() as i32);

    let (header, photons) = pt3::read(file.path()).unwrap();
    assert_eq!(header.records(), records.len());
    assert_eq!(photons.len(), 5000);
    assert_eq!(photons.overflows, overflows);
    assert_eq!(photons.markers.len(), 1);
    assert_eq!(photons.markers[0].photon_index, 2500);
    assert_eq!(photons.channels(), vec![1, 2]);
    assert!(photons.time.windows(2).all(|w| w[0] <= w[1]));
    assert!(photons.microtime.iter().all(|&m| m < 4096));
}

#[test]
fn correlate_synthetic_file() {
    let (records, _) = synthetic_records(5000);
    let file = write_pt3(&records, records.len() as i32);

    let tttr = File::open(file.path().to_path_buf()).unwrap();
    assert!(format!("{}", tttr).contains("PicoHarp"));
    let photons = tttr.photons().unwrap();

    let params = FcsParams {
        correlator: CorrelatorConfig::new(0, 10, 4),
        photon_count_bin: 0.1,
        ..FcsParams::default()
    };
    let result = fcs_analysis(&photons, &params, &CorrelationControl::default()).unwrap();

    let labels: Vec<&str> = result.curves.iter().map(|c| c.label.as_str()).collect();
    assert_eq!(labels, vec!["AC1", "CC12", "CC21", "AC2"]);
    for curve in result.curves.iter() {
        assert_eq!(curve.lags.len(), 40);
        assert!(curve.lags.windows(2).all(|w| w[0] < w[1]));
        assert!(curve.g.iter().all(|g| g.is_finite()));
    }

    let traced: u32 = result
        .traces
        .iter()
        .map(|(_, trace)| trace.counts.iter().sum::<u32>())
        .sum();
    assert_eq!(traced, 5000);
}

#[test]
fn truncated_file() {
    let (records, _) = synthetic_records(100);
    let file = write_pt3(&records, records.len() as i32 + 10);

    match pt3::read(file.path()) {
        Err(DecodeError::Truncated {
            expected, found, ..
        }) => {
            assert_eq!(expected, records.len() + 10);
            assert_eq!(found, records.len());
        }
        other => panic!("expected a truncation error, got {:?}", other.map(|(_, p)| p.len())),
    }
}
