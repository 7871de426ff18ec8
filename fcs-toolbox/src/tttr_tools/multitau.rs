use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use rayon::prelude::*;

use crate::errors::{CorrelatorError, NumericWarning};
use crate::tttr_tools::indicators::ChannelIndicatorMatrix;
use crate::tttr_tools::merge::{intersect_shifted, unique_with_index, DedupIndex};

const NS_PER_MS: f64 = 1e6;

/// Relative distance to the acquisition length below which the edge correction
/// is considered unstable.
pub const UNSTABLE_LAG_EPS: f64 = 1e-6;

/// Parameters for the multi-tau correlator
///
/// # Parameters
///    - ncasc_start: First cascade level whose lags are evaluated. Levels below
///      it are skipped, their slots stay at zero.
///    - ncasc_end: Number of cascade levels.
///    - nsub: Number of lags per cascade level.
///    - dedup: Which photon of a run of equal time stamps anchors the merged bin.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CorrelatorConfig {
    pub ncasc_start: usize,
    pub ncasc_end: usize,
    pub nsub: usize,
    pub dedup: DedupIndex,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self::new(0, 25, 6)
    }
}

impl CorrelatorConfig {
    pub fn new(ncasc_start: usize, ncasc_end: usize, nsub: usize) -> Self {
        Self {
            ncasc_start,
            ncasc_end,
            nsub,
            dedup: DedupIndex::default(),
        }
    }

    pub fn validate(&self) -> Result<(), CorrelatorError> {
        if self.ncasc_start > self.ncasc_end {
            return Err(CorrelatorError::InvalidCascadeConfig {
                start: self.ncasc_start,
                end: self.ncasc_end,
            });
        }
        Ok(())
    }

    /// Length of the lag axis.
    pub fn n_lags(&self) -> usize {
        if self.nsub == 0 || self.ncasc_end == 0 {
            0
        } else {
            (self.ncasc_end + 1) * (self.nsub + 1)
        }
    }

    /// Lag of a slot in time stamp units.
    ///
    /// Slot `j * nsub + k` belongs to level `j` and sits at
    /// `(j * nsub + k + 1) * 2^j`.
    pub fn lag(&self, slot: usize) -> f64 {
        let level = (slot / self.nsub.max(1)) as i32;
        ((slot + 1) as f64) * 2f64.powi(level)
    }
}

/// Hooks into a running correlation.
///
/// `progress` is called after every cascade level with the number of finished
/// levels and the total. Setting `cancel` stops the run before the next level.
#[derive(Default)]
pub struct CorrelationControl<'a> {
    pub cancel: Option<&'a AtomicBool>,
    pub progress: Option<&'a dyn Fn(usize, usize)>,
}

impl<'a> CorrelationControl<'a> {
    fn cancelled(&self) -> bool {
        self.cancel
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

/// Result from the multi-tau correlator
#[derive(Debug, Clone)]
pub struct CorrelationResult {
    /// Lag times in milliseconds, strictly increasing.
    pub lags: Vec<f64>,
    /// `curves[[lag, a, b]]` correlates logical channel `a` at time `t` with
    /// channel `b` at `t - lag`.
    pub curves: Array3<f64>,
    /// Whether the cascade evaluated a slot.
    pub evaluated: Vec<bool>,
    /// Photons per logical channel.
    pub totals: Vec<f64>,
    /// Time between first and last photon in time stamp units.
    pub duration: f64,
    pub warnings: Vec<NumericWarning>,
}

impl CorrelationResult {
    pub fn n_channels(&self) -> usize {
        self.curves.shape()[1]
    }

    /// Correlation values of channel `a` against channel `b`.
    pub fn curve(&self, a: usize, b: usize) -> Vec<f64> {
        self.curves.slice(s![.., a, b]).to_vec()
    }

    /// Curves normalised to the shot noise floor,
    /// `G_ab = C_ab * duration / (N_a * N_b) - 1`.
    ///
    /// Slots that were not evaluated, or channels without photons, are zero.
    pub fn normalized(&self) -> Array3<f64> {
        let mut norm = Array3::<f64>::zeros(self.curves.raw_dim());
        for (slot, &done) in self.evaluated.iter().enumerate() {
            if !done {
                continue;
            }
            for a in 0..self.n_channels() {
                for b in 0..self.n_channels() {
                    let pairs = self.totals[a] * self.totals[b];
                    if pairs > 0.0 {
                        norm[[slot, a, b]] = self.curves[[slot, a, b]] * self.duration / pairs - 1.0;
                    }
                }
            }
        }
        norm
    }
}

/// Redistributes per channel counts onto deduplicated time stamps.
///
/// `index` holds one row of `num` per unique time stamp. The counts of a unique
/// time stamp are the cumulative counts at its row minus the cumulative counts
/// at the row of the previous unique time stamp.
fn redistribute(num: ArrayView2<f64>, index: &[usize]) -> Array2<f64> {
    let n_ch = num.ncols();
    let mut out = Array2::<f64>::zeros((index.len(), n_ch));
    let mut running = vec![0.0; n_ch];
    let mut previous = vec![0.0; n_ch];
    let mut next_row = 0;

    for (u, &idx) in index.iter().enumerate() {
        while next_row <= idx {
            for c in 0..n_ch {
                running[c] += num[[next_row, c]];
            }
            next_row += 1;
        }
        for c in 0..n_ch {
            out[[u, c]] = running[c] - previous[c];
            previous[c] = running[c];
        }
    }
    out
}

/// `num[i1]ᵀ · num[i2]` over the time stamps matched at `shift`.
fn pair_products(y: &[i64], num: ArrayView2<f64>, shift: i64) -> Array2<f64> {
    let n_ch = num.ncols();
    let mut acc = Array2::<f64>::zeros((n_ch, n_ch));
    for (i1, i2) in intersect_shifted(y, shift) {
        for a in 0..n_ch {
            let va = num[[i1, a]];
            if va == 0.0 {
                continue;
            }
            for b in 0..n_ch {
                acc[[a, b]] += va * num[[i2, b]];
            }
        }
    }
    acc
}

#[inline]
fn half_ceil(v: i64) -> i64 {
    v.div_euclid(2) + v.rem_euclid(2)
}

/// Multi-tau correlation of a photon stream.
///
/// See [`correlate_with`].
pub fn correlate(
    times: &[f64],
    indicators: &ChannelIndicatorMatrix,
    config: &CorrelatorConfig,
) -> Result<CorrelationResult, CorrelatorError> {
    correlate_with(times, indicators, config, &CorrelationControl::default())
}

/// Computes all auto and cross correlations between the logical channels of
/// `indicators` for photons arriving at `times`.
///
/// ## Algorithm description
///
/// Time stamps are rounded to integers and correlated on a cascade of time
/// axes. At level `j` every bin is `2^j` time units wide: the stamps of the
/// previous level are halved (rounding up) and photons that collapse onto the
/// same stamp are merged, adding up their channel counts. Within a level the
/// correlation at an integer shift is found by matching the sorted stamps with
/// themselves shifted, which is a linear merge. The `nsub` shifts of one level
/// are independent and run in parallel.
///
/// Because the bin width doubles every level while the number of shifts per
/// level stays fixed, lags covering many decades cost about as much as a
/// handful of linear passes over the photons.
///
/// ## Edge correction
/// Fewer photon pairs are available at lags close to the acquisition length.
/// Every evaluated value is multiplied by `duration / (duration - lag)`. When
/// `lag` is within `UNSTABLE_LAG_EPS` of the duration, or beyond it, the factor
/// is meaningless: the value is kept as it is and a
/// `NumericWarning::UnstableLag` is recorded instead.
///
/// ## Errors
/// The configuration is validated before any work is done. `times` must be
/// non-decreasing and match the rows of `indicators`.
pub fn correlate_with(
    times: &[f64],
    indicators: &ChannelIndicatorMatrix,
    config: &CorrelatorConfig,
    control: &CorrelationControl,
) -> Result<CorrelationResult, CorrelatorError> {
    config.validate()?;
    if indicators.n_events() != times.len() {
        return Err(CorrelatorError::ShapeMismatch {
            rows: indicators.n_events(),
            events: times.len(),
        });
    }
    if let Some(i) = times.windows(2).position(|w| w[1] < w[0]) {
        return Err(CorrelatorError::UnsortedTimes(i + 1));
    }

    let n_ch = indicators.n_channels();
    let n_lags = config.n_lags();
    let duration = match (times.first(), times.last()) {
        (Some(first), Some(last)) => last - first,
        _ => 0.0,
    };
    let lags: Vec<f64> = (0..n_lags).map(|slot| config.lag(slot)).collect();
    let mut curves = Array3::<f64>::zeros((n_lags, n_ch, n_ch));
    let mut evaluated = vec![false; n_lags];

    info!(
        "Correlating {} photons in {} channels, {} cascade levels x {} lags",
        times.len(),
        n_ch,
        config.ncasc_end,
        config.nsub
    );

    if n_lags > 0 {
        let mut y: Vec<i64> = times.iter().map(|t| t.round() as i64).collect();
        let mut num = indicators.view().to_owned();
        let mut delta = 1.0;

        for level in 0..config.ncasc_end {
            if control.cancelled() {
                return Err(CorrelatorError::Cancelled(level));
            }

            let (unique, index) = unique_with_index(&y, config.dedup);
            num = redistribute(num.view(), &index);
            y = unique;

            if level >= config.ncasc_start {
                let base = level * config.nsub;
                let num_view = num.view();
                let y_ref = &y;
                let values: Vec<Array2<f64>> = (0..config.nsub)
                    .into_par_iter()
                    .map(|k| pair_products(y_ref, num_view, (base + k + 1) as i64) / delta)
                    .collect();
                for (k, value) in values.into_iter().enumerate() {
                    curves.index_axis_mut(Axis(0), base + k).assign(&value);
                    evaluated[base + k] = true;
                }
            }
            debug!("Cascade level {}: {} distinct time stamps", level, y.len());

            for v in y.iter_mut() {
                *v = half_ceil(*v);
            }
            delta *= 2.0;

            if let Some(progress) = control.progress {
                progress(level + 1, config.ncasc_end);
            }
        }
    }

    let mut warnings = Vec::new();
    for (slot, &lag) in lags.iter().enumerate() {
        if !evaluated[slot] {
            continue;
        }
        let remaining = duration - lag;
        if remaining <= UNSTABLE_LAG_EPS * duration {
            warnings.push(NumericWarning::UnstableLag {
                index: slot,
                lag,
                duration,
            });
            continue;
        }
        let factor = duration / remaining;
        curves
            .index_axis_mut(Axis(0), slot)
            .mapv_inplace(|c| c * factor);
    }
    if let Some(first) = warnings.first() {
        warn!("{} unstable lags, first one: {}", warnings.len(), first);
    }

    Ok(CorrelationResult {
        lags: lags.iter().map(|lag| lag / NS_PER_MS).collect(),
        curves,
        evaluated,
        totals: indicators.totals(),
        duration,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Eight photons, channel A at 0, 2, 5, 8 and channel B at 1, 4, 7, 10.
    fn fixture() -> (Vec<f64>, ChannelIndicatorMatrix) {
        let times = vec![0.0, 1.0, 2.0, 4.0, 5.0, 7.0, 8.0, 10.0];
        let channels = [1, 2, 1, 2, 1, 2, 1, 2];
        (times, ChannelIndicatorMatrix::from_channels(&channels, &[1, 2]))
    }

    #[test]
    fn test_hand_computed_fixture() {
        let (times, indicators) = fixture();
        let result = correlate(&times, &indicators, &CorrelatorConfig::new(0, 1, 2)).unwrap();

        assert_eq!(result.lags.len(), 6);
        let expected_lags = [1.0, 2.0, 6.0, 8.0, 20.0, 24.0];
        for (lag, expected) in result.lags.iter().zip(expected_lags.iter()) {
            assert_relative_eq!(*lag, expected / 1e6);
        }
        assert_eq!(result.evaluated, vec![true, true, false, false, false, false]);

        // lag 1: pairs (1,0) (2,1) (5,4) (8,7) -> A after B three times, B after A once
        let lag1 = result.curves.index_axis(Axis(0), 0);
        assert_relative_eq!(lag1[[0, 0]], 0.0);
        assert_relative_eq!(lag1[[0, 1]], 3.0 * 10.0 / 9.0);
        assert_relative_eq!(lag1[[1, 0]], 10.0 / 9.0);
        assert_relative_eq!(lag1[[1, 1]], 0.0);

        // lag 2: pairs (2,0) (4,2) (7,5) (10,8)
        let lag2 = result.curves.index_axis(Axis(0), 1);
        assert_relative_eq!(lag2[[0, 0]], 10.0 / 8.0);
        assert_relative_eq!(lag2[[0, 1]], 0.0);
        assert_relative_eq!(lag2[[1, 0]], 3.0 * 10.0 / 8.0);
        assert_relative_eq!(lag2[[1, 1]], 0.0);

        assert!(result.curves.slice(s![2.., .., ..]).iter().all(|&v| v == 0.0));
        assert!(result.warnings.is_empty());
        assert_eq!(result.totals, vec![4.0, 4.0]);
        assert_eq!(result.duration, 10.0);
    }

    #[test]
    fn test_fixture_summed_channels() {
        let (times, _) = fixture();
        let indicators = ChannelIndicatorMatrix::all(times.len());
        let result = correlate(&times, &indicators, &CorrelatorConfig::new(0, 1, 2)).unwrap();
        let curve = result.curve(0, 0);
        assert_relative_eq!(curve[0], 4.0 * 10.0 / 9.0);
        assert_relative_eq!(curve[1], 4.0 * 10.0 / 8.0);
    }

    #[test]
    fn test_lag_axis_shape() {
        let times: Vec<f64> = (0..50).map(|i| (i * i) as f64).collect();
        let indicators = ChannelIndicatorMatrix::all(times.len());
        for ncasc_end in 0..6 {
            for nsub in 0..5 {
                let config = CorrelatorConfig::new(0, ncasc_end, nsub);
                let result = correlate(&times, &indicators, &config).unwrap();
                if ncasc_end == 0 || nsub == 0 {
                    assert!(result.lags.is_empty());
                    assert_eq!(result.curves.shape()[0], 0);
                } else {
                    assert_eq!(result.lags.len(), (ncasc_end + 1) * (nsub + 1));
                    assert!(result.lags.windows(2).all(|w| w[0] < w[1]));
                }
            }
        }
    }

    #[test]
    fn test_invalid_config_checked_first() {
        // shapes do not match either, the configuration error must win
        let indicators = ChannelIndicatorMatrix::all(3);
        let err = correlate(&[0.0], &indicators, &CorrelatorConfig::new(3, 2, 4)).unwrap_err();
        assert_eq!(err, CorrelatorError::InvalidCascadeConfig { start: 3, end: 2 });
    }

    #[test]
    fn test_shape_and_order_checks() {
        let indicators = ChannelIndicatorMatrix::all(3);
        let config = CorrelatorConfig::new(0, 2, 2);
        assert_eq!(
            correlate(&[0.0, 1.0], &indicators, &config).unwrap_err(),
            CorrelatorError::ShapeMismatch { rows: 3, events: 2 }
        );
        assert_eq!(
            correlate(&[0.0, 3.0, 1.0], &indicators, &config).unwrap_err(),
            CorrelatorError::UnsortedTimes(2)
        );
    }

    #[test]
    fn test_skipped_levels_stay_zero() {
        let (times, indicators) = fixture();
        let result = correlate(&times, &indicators, &CorrelatorConfig::new(1, 2, 2)).unwrap();
        assert_eq!(result.evaluated[..4], [false, false, true, true]);
        assert!(result.curves.slice(s![..2, .., ..]).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_unstable_lags_are_flagged() {
        let times = vec![0.0, 1.0, 2.0];
        let indicators = ChannelIndicatorMatrix::all(3);
        let result = correlate(&times, &indicators, &CorrelatorConfig::new(0, 1, 4)).unwrap();

        // lag 1 is fine, lags 2, 3 and 4 reach or pass the 2 unit acquisition
        assert_relative_eq!(result.curve(0, 0)[0], 2.0 * 2.0);
        assert_eq!(result.warnings.len(), 3);
        assert_eq!(
            result.warnings[0],
            NumericWarning::UnstableLag {
                index: 1,
                lag: 2.0,
                duration: 2.0
            }
        );
        // lag 2 has one pair, kept without correction
        assert_relative_eq!(result.curve(0, 0)[1], 1.0);
        assert!(result.curves.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_redistribute_first_occurrence() {
        let num = array![[1.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        // time stamps [3, 3, 4, 4]
        let (unique, index) = unique_with_index(&[3, 3, 4, 4], DedupIndex::First);
        assert_eq!(unique, vec![3, 4]);
        let out = redistribute(num.view(), &index);
        assert_eq!(out, array![[1.0, 0.0], [1.0, 1.0]]);

        let (_, index) = unique_with_index(&[3, 3, 4, 4], DedupIndex::Last);
        let out = redistribute(num.view(), &index);
        assert_eq!(out, array![[1.0, 1.0], [2.0, 1.0]]);
    }

    #[test]
    fn test_half_ceil() {
        assert_eq!(half_ceil(0), 0);
        assert_eq!(half_ceil(1), 1);
        assert_eq!(half_ceil(2), 1);
        assert_eq!(half_ceil(7), 4);
        assert_eq!(half_ceil(-3), -1);
    }

    #[test]
    fn test_cancellation() {
        let (times, indicators) = fixture();
        let flag = AtomicBool::new(true);
        let control = CorrelationControl {
            cancel: Some(&flag),
            progress: None,
        };
        let err =
            correlate_with(&times, &indicators, &CorrelatorConfig::new(0, 3, 2), &control).unwrap_err();
        assert_eq!(err, CorrelatorError::Cancelled(0));
    }

    #[test]
    fn test_progress_reports_every_level() {
        let (times, indicators) = fixture();
        let seen = std::cell::RefCell::new(Vec::new());
        let report: &dyn Fn(usize, usize) = &|done, total| seen.borrow_mut().push((done, total));
        let control = CorrelationControl {
            cancel: None,
            progress: Some(report),
        };
        correlate_with(&times, &indicators, &CorrelatorConfig::new(0, 3, 2), &control).unwrap();
        assert_eq!(*seen.borrow(), vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn test_poisson_stream_is_flat() {
        let mut rng = StdRng::seed_from_u64(7);
        let mean_gap = 1000.0;
        let mut t = 0.0;
        let times: Vec<f64> = (0..20_000)
            .map(|_| {
                let u: f64 = rng.gen_range(1e-12..1.0);
                t += -mean_gap * u.ln();
                t
            })
            .collect();
        let indicators = ChannelIndicatorMatrix::all(times.len());
        let config = CorrelatorConfig::new(0, 12, 4);
        let result = correlate(&times, &indicators, &config).unwrap();
        let g = result.normalized();

        // from level 6 on every bin holds enough photons for a tight estimate
        for slot in 6 * config.nsub..config.ncasc_end * config.nsub {
            let value = g[[slot, 0, 0]];
            assert!(value.abs() < 0.2, "slot {} has G = {}", slot, value);
        }
        assert!(result.warnings.is_empty());
    }
}
