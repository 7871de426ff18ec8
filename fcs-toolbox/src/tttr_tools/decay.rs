use crate::errors::BinningError;
use crate::photons::{ChannelFilter, PhotonStream};
use crate::tttr_tools::binning::bin;

/// Result from the decay histogram
pub struct DecayResult {
    /// Bin centers in micro-time bins.
    pub t: Vec<f64>,
    pub hist: Vec<u32>,
}

impl DecayResult {
    /// Bin centers in nanoseconds for a micro-time resolution in nanoseconds.
    pub fn t_ns(&self, resolution: f64) -> Vec<f64> {
        self.t.iter().map(|t| t * resolution).collect()
    }
}

/// Parameters for the decay histogram
///
/// # Parameters
///    - win_int: Width of the histogram bins in micro-time bins.
///    - channel: Optional channel to histogram. If None is passed all channels
///      are added together.
#[derive(Debug, Copy, Clone)]
pub struct DecayParams {
    pub win_int: f64,
    pub channel: Option<u8>,
}

/// Decay histogram of photon micro-times.
///
/// ## Algorithm description
/// In T3 mode every photon carries its delay to the preceding sync pulse, the
/// micro-time. Since the sync is locked to the pulsed excitation, a histogram of
/// micro-times is the fluorescence decay of the sample. The histogram starts at
/// the smallest micro-time present and uses `win_int` micro-time bins per
/// histogram bin.
pub fn decay(
    photons: &PhotonStream,
    params: &DecayParams,
) -> Result<DecayResult, BinningError> {
    let microtimes: Vec<f64> = photons.microtime.iter().map(|&m| m as f64).collect();
    let binned = bin(
        &microtimes,
        &photons.channel,
        ChannelFilter::from(params.channel),
        params.win_int,
    )?;
    Ok(DecayResult {
        t: binned.bin_centers,
        hist: binned.counts,
    })
}
