use crate::photons::PhotonStream;
use std::ops::RangeInclusive;

/// Which marker windows get their channels reassigned.
#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
pub enum PieMode {
    Off = 0,
    Odd = 1,
    Even = 2,
}

impl Default for PieMode {
    fn default() -> Self {
        PieMode::Off
    }
}

impl PieMode {
    fn applies_to(&self, window: usize) -> bool {
        match self {
            PieMode::Off => false,
            PieMode::Odd => window % 2 == 1,
            PieMode::Even => window % 2 == 0,
        }
    }
}

/// Pulsed interleaved excitation routing
///
/// Photons on a detector channel inside `channels` that fall into a window
/// selected by `mode` are moved to logical channel `channel + offset`.
#[derive(Debug, Clone, PartialEq)]
pub struct PieConfig {
    pub mode: PieMode,
    pub channels: RangeInclusive<u8>,
    pub offset: u8,
}

impl Default for PieConfig {
    fn default() -> Self {
        Self {
            mode: PieMode::Off,
            channels: 1..=2,
            offset: 2,
        }
    }
}

/// Photon indices at which a new marker window starts.
///
/// Only markers with id `marker` are used, or every marker if None is passed.
/// Every marker opens a window, so markers with no photon in between repeat
/// the same index and leave an empty window.
pub fn marker_boundaries(photons: &PhotonStream, marker: Option<u8>) -> Vec<usize> {
    photons
        .markers
        .iter()
        .filter(|m| marker.map_or(true, |id| m.marker == id))
        .map(|m| m.photon_index)
        .collect()
}

/// Reassigns channels inside the marker windows selected by `config.mode`.
///
/// Window 0 runs from the first photon up to `boundaries[0]`, window `w` starts
/// at photon `boundaries[w - 1]`. `boundaries` must be sorted; repeated entries
/// are empty windows. The input is not modified.
pub fn route(channels: &[u8], boundaries: &[usize], config: &PieConfig) -> Vec<u8> {
    if config.mode == PieMode::Off {
        return channels.to_vec();
    }

    let mut window = 0;
    channels
        .iter()
        .enumerate()
        .map(|(i, &ch)| {
            while window < boundaries.len() && boundaries[window] <= i {
                window += 1;
            }
            if config.mode.applies_to(window) && config.channels.contains(&ch) {
                ch.saturating_add(config.offset)
            } else {
                ch
            }
        })
        .collect()
}
