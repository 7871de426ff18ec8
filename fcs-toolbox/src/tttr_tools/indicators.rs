use ndarray::{Array2, ArrayView2, Axis};

/// Assignment of photons to logical channels.
///
/// Row `i` belongs to photon `i`, column `c` to logical channel `c`. An entry is
/// 1.0 when the photon counts for that channel and 0.0 otherwise. A photon may
/// count for more than one logical channel, which is how overlapping channel
/// selections are expressed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelIndicatorMatrix {
    data: Array2<f64>,
}

impl ChannelIndicatorMatrix {
    /// One logical channel per entry of `groups`; a photon is set in column `g`
    /// when its detector channel is listed in `groups[g]`.
    pub fn from_groups(channels: &[u8], groups: &[Vec<u8>]) -> Self {
        let mut data = Array2::<f64>::zeros((channels.len(), groups.len()));
        for (g, group) in groups.iter().enumerate() {
            for (i, ch) in channels.iter().enumerate() {
                if group.contains(ch) {
                    data[[i, g]] = 1.0;
                }
            }
        }
        Self { data }
    }

    /// One logical channel per detector channel in `selected`.
    pub fn from_channels(channels: &[u8], selected: &[u8]) -> Self {
        let groups: Vec<Vec<u8>> = selected.iter().map(|&ch| vec![ch]).collect();
        Self::from_groups(channels, &groups)
    }

    /// Every photon counts for a single logical channel.
    pub fn all(n_events: usize) -> Self {
        Self {
            data: Array2::<f64>::ones((n_events, 1)),
        }
    }

    pub fn from_array(data: Array2<f64>) -> Self {
        Self { data }
    }

    pub fn n_events(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_channels(&self) -> usize {
        self.data.ncols()
    }

    pub fn view(&self) -> ArrayView2<f64> {
        self.data.view()
    }

    /// Number of photons in every logical channel.
    pub fn totals(&self) -> Vec<f64> {
        self.data.sum_axis(Axis(0)).to_vec()
    }
}
