use log::info;

use crate::errors::{AnalysisError, NumericWarning};
use crate::photons::PhotonStream;
use crate::tttr_tools::decay::{decay, DecayParams, DecayResult};
use crate::tttr_tools::indicators::ChannelIndicatorMatrix;
use crate::tttr_tools::multitau::{correlate_with, CorrelationControl, CorrelatorConfig};
use crate::tttr_tools::pie::{marker_boundaries, route, PieConfig, PieMode};
use crate::tttr_tools::timetrace::{timetrace, TimeTraceParams, TimeTraceResult};

/// Parameters for a complete FCS analysis
///
/// # Parameters
///    - correlator: Lag schedule of the multi-tau correlator.
///    - channels: Channels to correlate, after PIE routing. Logical channel
///      `i + 1` in the curve labels is `channels[i]`.
///    - pie: Channel routing for pulsed interleaved excitation.
///    - pie_marker: Marker id delimiting the PIE windows, None for any marker.
///    - photon_count_bin: Intensity trace resolution in milliseconds.
///    - win_int: Decay histogram bin width in micro-time bins.
#[derive(Debug, Clone)]
pub struct FcsParams {
    pub correlator: CorrelatorConfig,
    pub channels: Vec<u8>,
    pub pie: PieConfig,
    pub pie_marker: Option<u8>,
    pub photon_count_bin: f64,
    pub win_int: f64,
}

impl Default for FcsParams {
    fn default() -> Self {
        Self {
            correlator: CorrelatorConfig::default(),
            channels: vec![1, 2],
            pie: PieConfig::default(),
            pie_marker: None,
            photon_count_bin: 25.0,
            win_int: 10.0,
        }
    }
}

/// A normalised correlation curve.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    /// `AC<a>` for autocorrelations, `CC<ab>` for channel `a` followed by
    /// channel `b`.
    pub label: String,
    /// Lag times in milliseconds.
    pub lags: Vec<f64>,
    pub g: Vec<f64>,
}

/// Result from a complete FCS analysis
pub struct FcsResult {
    pub curves: Vec<Curve>,
    /// One intensity trace per correlated channel.
    pub traces: Vec<(u8, TimeTraceResult)>,
    /// One decay histogram per correlated channel.
    pub decays: Vec<(u8, DecayResult)>,
    pub warnings: Vec<NumericWarning>,
}

impl FcsResult {
    pub fn curve(&self, label: &str) -> Option<&Curve> {
        self.curves.iter().find(|c| c.label == label)
    }
}

/// Runs the correlator on the selected channels and collects the labelled curves
/// together with the intensity trace and decay of every channel.
///
/// When PIE routing is enabled the channels are reassigned first, so
/// `params.channels` refers to the routed channel ids. Only evaluated lags end
/// up in the curves.
pub fn fcs_analysis(
    photons: &PhotonStream,
    params: &FcsParams,
    control: &CorrelationControl,
) -> Result<FcsResult, AnalysisError> {
    if params.channels.is_empty() {
        return Err(AnalysisError::NoChannels);
    }

    let routed;
    let photons = if params.pie.mode == PieMode::Off {
        photons
    } else {
        let boundaries = marker_boundaries(photons, params.pie_marker);
        info!(
            "PIE routing {:?} over {} marker windows",
            params.pie.mode,
            boundaries.len() + 1
        );
        routed = photons.with_channels(route(&photons.channel, &boundaries, &params.pie));
        &routed
    };

    let indicators = ChannelIndicatorMatrix::from_channels(&photons.channel, &params.channels);
    let result = correlate_with(&photons.time, &indicators, &params.correlator, control)?;
    let norm = result.normalized();

    let evaluated: Vec<usize> = (0..result.lags.len())
        .filter(|&slot| result.evaluated[slot])
        .collect();
    let lags: Vec<f64> = evaluated.iter().map(|&slot| result.lags[slot]).collect();

    let n = params.channels.len();
    let mut curves = Vec::with_capacity(n * n);
    for a in 0..n {
        for b in 0..n {
            let label = if a == b {
                format!("AC{}", a + 1)
            } else {
                format!("CC{}{}", a + 1, b + 1)
            };
            // curves[[lag, later, earlier]]
            let g = evaluated.iter().map(|&slot| norm[[slot, b, a]]).collect();
            curves.push(Curve {
                label,
                lags: lags.clone(),
                g,
            });
        }
    }

    let mut traces = Vec::with_capacity(n);
    let mut decays = Vec::with_capacity(n);
    for &ch in &params.channels {
        let trace = timetrace(
            photons,
            &TimeTraceParams {
                resolution: params.photon_count_bin,
                channel: Some(ch),
            },
        )?;
        traces.push((ch, trace));
        let hist = decay(
            photons,
            &DecayParams {
                win_int: params.win_int,
                channel: Some(ch),
            },
        )?;
        decays.push((ch, hist));
    }

    Ok(FcsResult {
        curves,
        traces,
        decays,
        warnings: result.warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BinningError;
    use crate::photons::MarkerEvent;
    use approx::assert_relative_eq;

    /// Channel 1 at 0, 2, 5, 8 and channel 2 at 1, 4, 7, 10 nanoseconds.
    fn photons() -> PhotonStream {
        let mut photons = PhotonStream::default();
        let times = [0.0, 1.0, 2.0, 4.0, 5.0, 7.0, 8.0, 10.0];
        for (i, &t) in times.iter().enumerate() {
            photons.push(if i % 2 == 0 { 1 } else { 2 }, t, i as u16);
        }
        photons
    }

    fn params() -> FcsParams {
        FcsParams {
            correlator: CorrelatorConfig::new(0, 1, 2),
            photon_count_bin: 1e-5,
            win_int: 2.0,
            ..FcsParams::default()
        }
    }

    #[test]
    fn test_labelled_curves() {
        let result = fcs_analysis(&photons(), &params(), &CorrelationControl::default()).unwrap();

        let labels: Vec<&str> = result.curves.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["AC1", "CC12", "CC21", "AC2"]);

        let ac1 = result.curve("AC1").unwrap();
        assert_eq!(ac1.lags.len(), 2);
        assert_relative_eq!(ac1.lags[0], 1e-6);
        assert_relative_eq!(ac1.g[0], -1.0);
        assert_relative_eq!(ac1.g[1], 10.0 / 8.0 * 10.0 / 16.0 - 1.0);

        // channel 2 one nanosecond after channel 1 happens once, the reverse three times
        let cc12 = result.curve("CC12").unwrap();
        let cc21 = result.curve("CC21").unwrap();
        assert_relative_eq!(cc12.g[0], 10.0 / 9.0 * 10.0 / 16.0 - 1.0);
        assert_relative_eq!(cc21.g[0], 30.0 / 9.0 * 10.0 / 16.0 - 1.0);

        assert_eq!(result.traces.len(), 2);
        assert_eq!(result.traces[1].0, 2);
        assert_eq!(result.decays[0].1.hist.iter().sum::<u32>(), 4);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_pie_routing_before_correlation() {
        let mut photons = photons();
        photons.markers.push(MarkerEvent {
            marker: 1,
            time: 4.5,
            photon_index: 4,
        });
        let params = FcsParams {
            channels: vec![1, 2, 3, 4],
            pie: PieConfig {
                mode: PieMode::Odd,
                ..PieConfig::default()
            },
            ..params()
        };
        let result = fcs_analysis(&photons, &params, &CorrelationControl::default()).unwrap();

        assert_eq!(result.curves.len(), 16);
        assert!(result.curve("CC34").is_some());
        let counts: Vec<u32> = result
            .traces
            .iter()
            .map(|(_, trace)| trace.counts.iter().sum())
            .collect();
        assert_eq!(counts, vec![2, 2, 2, 2]);
    }

    #[test]
    fn test_errors() {
        let control = CorrelationControl::default();
        let no_channels = FcsParams {
            channels: vec![],
            ..params()
        };
        assert_eq!(
            fcs_analysis(&photons(), &no_channels, &control).err(),
            Some(AnalysisError::NoChannels)
        );

        let bad_bin = FcsParams {
            photon_count_bin: 0.0,
            ..params()
        };
        assert_eq!(
            fcs_analysis(&photons(), &bad_bin, &control).err(),
            Some(AnalysisError::Binning(BinningError::InvalidBinWidth(0.0)))
        );
    }
}
