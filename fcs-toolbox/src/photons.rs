/// Selects which photons take part in a computation.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ChannelFilter {
    All,
    Only(u8),
}

impl ChannelFilter {
    #[inline]
    pub fn matches(&self, channel: u8) -> bool {
        match self {
            ChannelFilter::All => true,
            ChannelFilter::Only(ch) => *ch == channel,
        }
    }
}

impl From<Option<u8>> for ChannelFilter {
    fn from(channel: Option<u8>) -> Self {
        match channel {
            Some(ch) => ChannelFilter::Only(ch),
            None => ChannelFilter::All,
        }
    }
}

/// An external marker seen while decoding.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MarkerEvent {
    pub marker: u8,
    /// Absolute time in nanoseconds, sync resolution.
    pub time: f64,
    /// Index of the first photon recorded after the marker.
    pub photon_index: usize,
}

/// Decoded photons of one acquisition.
///
/// `channel`, `time` and `microtime` always have the same length. `time` is the
/// absolute arrival time in nanoseconds and never decreases.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotonStream {
    pub channel: Vec<u8>,
    pub time: Vec<f64>,
    pub microtime: Vec<u16>,
    pub markers: Vec<MarkerEvent>,
    /// Number of `nsync` wraparounds found in the file.
    pub overflows: u64,
    /// Records skipped because of an unknown channel.
    pub unknown_records: usize,
}

impl PhotonStream {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channel: Vec::with_capacity(capacity),
            time: Vec::with_capacity(capacity),
            microtime: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    pub fn push(&mut self, channel: u8, time: f64, microtime: u16) {
        self.channel.push(channel);
        self.time.push(time);
        self.microtime.push(microtime);
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Time between the first and the last photon in nanoseconds.
    pub fn duration(&self) -> f64 {
        match (self.time.first(), self.time.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    /// Distinct channels present, in increasing order.
    pub fn channels(&self) -> Vec<u8> {
        let mut seen = [false; 256];
        for &ch in &self.channel {
            seen[ch as usize] = true;
        }
        (0..=255u8).filter(|&ch| seen[ch as usize]).collect()
    }

    pub fn count(&self, filter: ChannelFilter) -> usize {
        self.channel.iter().filter(|&&ch| filter.matches(ch)).count()
    }

    /// Same photons with a different channel assignment.
    pub fn with_channels(&self, channel: Vec<u8>) -> Self {
        debug_assert_eq!(channel.len(), self.len());
        Self {
            channel,
            ..self.clone()
        }
    }
}
