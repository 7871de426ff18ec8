pub mod header;
pub mod records;
pub mod stream;

use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::info;

use crate::errors::DecodeError;
use crate::headers;
use crate::photons::PhotonStream;
use crate::TTTRFile;

pub use self::header::Pt3Header;
pub use self::records::{decode, DecodeContext, DecodedRecord};
pub use self::stream::{collect_photons, Pt3Stream};

/// Metadata for a PT3 file from PicoQuant
pub struct Pt3File {
    pub path: PathBuf,
    pub header: Pt3Header,
}

impl Pt3File {
    /// Create a Pt3File from its filepath.
    ///
    /// If the file does not exist a FileNotAvailable error will be returned.
    pub fn new(filename: PathBuf) -> Result<Self, DecodeError> {
        if filename.exists() {
            let mut buffered = BufReader::new(std::fs::File::open(&filename)?);
            let header = header::read_pt3_header(&mut buffered)?;
            Ok(Self {
                path: filename,
                header,
            })
        } else {
            let filename_string = filename.display().to_string();
            Err(DecodeError::FileNotAvailable(filename_string))
        }
    }

    /// Streams the records of the file without loading it into memory.
    pub fn stream(&self) -> Result<Pt3Stream<BufReader<std::fs::File>>, DecodeError> {
        let mut buffered = BufReader::with_capacity(8 * 1024, std::fs::File::open(&self.path)?);
        buffered.seek(SeekFrom::Start(self.header.data_offset))?;
        Ok(Pt3Stream::from_header(buffered, &self.header))
    }

    /// Decodes every record of the file.
    pub fn photons(&self) -> Result<PhotonStream, DecodeError> {
        collect_photons(self.stream()?)
    }
}

impl TTTRFile for Pt3File {
    fn time_resolution(&self) -> f64 {
        self.header.resolution()
    }

    fn sync_period(&self) -> f64 {
        self.header.sync_period()
    }

    fn record_type(&self) -> headers::RecordType {
        headers::RecordType::PicoHarpT3
    }
}

impl std::fmt::Display for Pt3File {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:<35}: {}\n{}", "Path", self.path.display(), self.header)
    }
}

/// Reads header and photons from anything that yields the bytes of a PT3 file.
pub fn read_from<R: Read>(mut reader: R) -> Result<(Pt3Header, PhotonStream), DecodeError> {
    let header = header::read_pt3_header(&mut reader)?;
    info!(
        "PT3 header: {} records, sync period {} ns, resolution {} ns",
        header.records(),
        header.sync_period(),
        header.resolution()
    );
    let photons = collect_photons(Pt3Stream::from_header(&mut reader, &header))?;
    Ok((header, photons))
}

/// Reads a PT3 file into memory.
pub fn read<P: AsRef<Path>>(path: P) -> Result<(Pt3Header, PhotonStream), DecodeError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DecodeError::FileNotAvailable(path.display().to_string()));
    }
    info!("Reading {}", path.display());
    read_from(BufReader::new(std::fs::File::open(path)?))
}
