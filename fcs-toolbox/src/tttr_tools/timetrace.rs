use crate::errors::BinningError;
use crate::photons::{ChannelFilter, PhotonStream};
use crate::tttr_tools::binning::bin;

const NS_PER_MS: f64 = 1e6;

/// Parameters for the timetrace algorithm
///
/// ## Parameters
///   1. resolution: The resolution in milliseconds of the intensity time trace.
///   2. channel: Optional channel we want to monitor. If None is passed then
///      all channels are summed together.
#[derive(Debug, Copy, Clone)]
pub struct TimeTraceParams {
    pub resolution: f64,
    pub channel: Option<u8>,
}

/// Result from the timetrace algorithm
pub struct TimeTraceResult {
    /// Bin centers in milliseconds.
    pub t: Vec<f64>,
    /// Count rate in kHz.
    pub rate: Vec<f64>,
    pub counts: Vec<u32>,
}

/// Calculate the intensity timetrace of clicks on a TCSPC.
///
/// The intensity is computed by discretizing the duration of the experiment into
/// intervals of fixed duration and counting how many clicks occur on each of them. The
/// intensity during each interval is then the number of clicks divided by the length
/// of the interval. Counts per millisecond are reported, that is kHz.
///
/// ## Resolution/Variance tradeoff
/// Reducing the resolution value (finer discretization in time) makes it possible to
/// look at intensity dynamics on a finer timescale. This may be of interest if we are
/// for example studying blinking dynamics or diffusion of bright aggregates through
/// the focus. However, there is a limit to how fine the time resolution can be. Finer
/// resolutions lead to smaller numbers of clicks per interval and therefore the relative
/// error for the number of counts grows as we make intervals finer.
pub fn timetrace(
    photons: &PhotonStream,
    params: &TimeTraceParams,
) -> Result<TimeTraceResult, BinningError> {
    let times_ms: Vec<f64> = photons.time.iter().map(|t| t / NS_PER_MS).collect();
    let binned = bin(
        &times_ms,
        &photons.channel,
        ChannelFilter::from(params.channel),
        params.resolution,
    )?;

    let rate = binned
        .counts
        .iter()
        .map(|&c| (c as f64) / params.resolution)
        .collect();
    Ok(TimeTraceResult {
        t: binned.bin_centers,
        rate,
        counts: binned.counts,
    })
}
