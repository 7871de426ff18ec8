use std::path::PathBuf;

use crate::errors::DecodeError;
use crate::parsers::pt3::Pt3File;
use crate::photons::PhotonStream;
use crate::TTTRFile;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum RecordType {
    PicoHarpT3,
}

pub enum File {
    PT3(Pt3File),
}

impl File {
    /// Opens a TTTR file, picking the parser from the file extension.
    pub fn open(filename: PathBuf) -> Result<Self, DecodeError> {
        let extension = filename
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("pt3") => Ok(File::PT3(Pt3File::new(filename)?)),
            _ => Err(DecodeError::NotImplemented(format!(
                "Unsupported file type: {}",
                filename.display()
            ))),
        }
    }

    pub fn photons(&self) -> Result<PhotonStream, DecodeError> {
        match self {
            File::PT3(f) => f.photons(),
        }
    }

    pub fn record_type(&self) -> RecordType {
        match self {
            File::PT3(f) => f.record_type(),
        }
    }

    /// Micro-time resolution in nanoseconds.
    pub fn time_resolution(&self) -> f64 {
        match self {
            File::PT3(f) => f.time_resolution(),
        }
    }
}

impl std::fmt::Display for File {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            File::PT3(pt3) => write!(f, "{}", pt3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_extension() {
        let result = File::open(PathBuf::from("measurement.ptu"));
        assert!(matches!(result, Err(DecodeError::NotImplemented(_))));
    }

    #[test]
    fn test_missing_pt3() {
        let result = File::open(PathBuf::from("/nonexistent/measurement.pt3"));
        assert!(matches!(result, Err(DecodeError::FileNotAvailable(_))));
    }
}
