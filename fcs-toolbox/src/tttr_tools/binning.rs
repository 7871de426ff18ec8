use crate::errors::BinningError;
use crate::photons::ChannelFilter;

/// Fixed width histogram of arrival times.
#[derive(Debug, Clone, PartialEq)]
pub struct Binned {
    pub counts: Vec<u32>,
    pub bin_centers: Vec<f64>,
    pub bin_width: f64,
}

impl Binned {
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }
}

/// Histograms the `times` whose channel passes `filter`.
///
/// The first bin starts at the earliest selected time and there are
/// `ceil((max - min) / bin_width)` bins, the last one closed on the right so
/// every selected time is counted. With fewer than two distinct selected times
/// a single bin is returned; its center sits half a bin after the only time,
/// or after zero when nothing was selected.
pub fn bin(
    times: &[f64],
    channels: &[u8],
    filter: ChannelFilter,
    bin_width: f64,
) -> Result<Binned, BinningError> {
    if !(bin_width > 0.0 && bin_width.is_finite()) {
        return Err(BinningError::InvalidBinWidth(bin_width));
    }

    let selected: Vec<f64> = times
        .iter()
        .zip(channels.iter())
        .filter(|(_, &ch)| filter.matches(ch))
        .map(|(&t, _)| t)
        .collect();

    let (min, max) = selected
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &t| {
            (lo.min(t), hi.max(t))
        });

    if selected.is_empty() {
        return Ok(Binned {
            counts: vec![0],
            bin_centers: vec![bin_width / 2.0],
            bin_width,
        });
    }

    let num_bins = (((max - min) / bin_width).ceil() as usize).max(1);
    let mut counts = vec![0u32; num_bins];
    for t in selected {
        let idx = (((t - min) / bin_width) as usize).min(num_bins - 1);
        counts[idx] += 1;
    }

    let bin_centers = (0..num_bins)
        .map(|i| min + (i as f64) * bin_width + bin_width / 2.0)
        .collect();

    Ok(Binned {
        counts,
        bin_centers,
        bin_width,
    })
}
