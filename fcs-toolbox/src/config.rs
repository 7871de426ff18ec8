use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::tttr_tools::analysis::FcsParams;
use crate::tttr_tools::merge::DedupIndex;
use crate::tttr_tools::multitau::CorrelatorConfig;
use crate::tttr_tools::pie::{PieConfig, PieMode};

/// Analysis options as they appear in a JSON settings file.
///
/// Keys that are missing take their default value and unknown keys are ignored,
/// so settings files written for other tools can be read as they are.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// First cascade level included in the output.
    #[serde(rename = "NcascStart")]
    pub ncasc_start: usize,
    /// Number of cascade levels.
    #[serde(rename = "NcascEnd")]
    pub ncasc_end: usize,
    /// Sub-lags per cascade level.
    #[serde(rename = "Nsub")]
    pub nsub: usize,
    /// Decay histogram bin width in micro-time bins.
    #[serde(rename = "winInt")]
    pub win_int: f64,
    /// Intensity trace bin width in milliseconds.
    #[serde(rename = "photonCountBin")]
    pub photon_count_bin: f64,
    /// 0 disables PIE routing, 1 routes odd windows, 2 routes even windows.
    #[serde(rename = "PIE")]
    pub pie: i32,
    /// Inclusive range of detector channels moved by PIE routing.
    #[serde(rename = "PIEChannels")]
    pub pie_channels: [u8; 2],
    #[serde(rename = "PIEOffset")]
    pub pie_offset: u8,
    /// Marker id that opens a PIE window. Any marker if absent.
    #[serde(rename = "PIEMarker")]
    pub pie_marker: Option<u8>,
    /// Channels to correlate.
    #[serde(rename = "Channels")]
    pub channels: Vec<u8>,
    /// Keep the last photon of a run of equal time stamps instead of the first.
    #[serde(rename = "DedupLast")]
    pub dedup_last: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            ncasc_start: 0,
            ncasc_end: 25,
            nsub: 6,
            win_int: 10.0,
            photon_count_bin: 25.0,
            pie: 0,
            pie_channels: [1, 2],
            pie_offset: 2,
            pie_marker: None,
            channels: vec![1, 2],
            dedup_last: false,
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ncasc_start > self.ncasc_end {
            return Err(ConfigError::Invalid(format!(
                "NcascStart ({}) must not exceed NcascEnd ({})",
                self.ncasc_start, self.ncasc_end
            )));
        }
        if !(self.win_int > 0.0 && self.win_int.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "winInt must be positive, got {}",
                self.win_int
            )));
        }
        if !(self.photon_count_bin > 0.0 && self.photon_count_bin.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "photonCountBin must be positive, got {}",
                self.photon_count_bin
            )));
        }
        self.pie_mode()?;
        if self.pie_channels[0] > self.pie_channels[1] {
            return Err(ConfigError::Invalid(format!(
                "PIEChannels must be an increasing range, got {:?}",
                self.pie_channels
            )));
        }
        if self.channels.is_empty() {
            return Err(ConfigError::Invalid(
                "Channels must list at least one channel".to_string(),
            ));
        }
        Ok(())
    }

    pub fn pie_mode(&self) -> Result<PieMode, ConfigError> {
        PieMode::from_i32(self.pie).ok_or_else(|| {
            ConfigError::Invalid(format!("PIE must be 0, 1 or 2, got {}", self.pie))
        })
    }

    pub fn correlator_config(&self) -> CorrelatorConfig {
        CorrelatorConfig {
            dedup: if self.dedup_last {
                DedupIndex::Last
            } else {
                DedupIndex::First
            },
            ..CorrelatorConfig::new(self.ncasc_start, self.ncasc_end, self.nsub)
        }
    }

    pub fn fcs_params(&self) -> Result<FcsParams, ConfigError> {
        self.validate()?;
        Ok(FcsParams {
            correlator: self.correlator_config(),
            channels: self.channels.clone(),
            pie: PieConfig {
                mode: self.pie_mode()?,
                channels: self.pie_channels[0]..=self.pie_channels[1],
                offset: self.pie_offset,
            },
            pie_marker: self.pie_marker,
            photon_count_bin: self.photon_count_bin,
            win_int: self.win_int,
        })
    }
}
