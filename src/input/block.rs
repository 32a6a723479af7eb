//! Blocks of samples returned by stream reads.

use crate::types::{PrecisionUtcTime, SampleBuffer, SriChangeFlags, StreamSri};

/// Time of the sample at `offset` within a block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleTimestamp {
    pub time: PrecisionUtcTime,
    /// Sample offset within the block; complex samples count once.
    pub offset: usize,
    /// True if interpolated from a packet timestamp rather than received.
    pub synthetic: bool,
}

/// Samples read from one stream, never spanning an SRI change.
#[derive(Debug, Clone)]
pub struct DataBlock<B> {
    pub sri: StreamSri,
    pub buffer: B,
    pub timestamps: Vec<SampleTimestamp>,
    pub sri_changed: bool,
    pub sri_change_flags: SriChangeFlags,
    pub input_queue_flushed: bool,
}

impl<B: SampleBuffer> DataBlock<B> {
    /// Number of samples; a complex sample is two elements.
    pub fn size(&self) -> usize {
        self.buffer.len() / elements_per_sample(&self.sri)
    }

    pub fn is_complex(&self) -> bool {
        self.sri.is_complex()
    }

    pub fn xdelta(&self) -> f64 {
        self.sri.xdelta
    }

    /// Timestamp of the first sample.
    pub fn start_time(&self) -> Option<PrecisionUtcTime> {
        self.timestamps.first().map(|stamp| stamp.time)
    }
}

pub(crate) fn elements_per_sample(sri: &StreamSri) -> usize {
    if sri.is_complex() { 2 } else { 1 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::sri;

    #[test]
    fn complex_blocks_count_pairs() {
        let mut complex = sri::create("s1", 1.0);
        complex.mode = 1;
        let block = DataBlock {
            sri: complex,
            buffer: vec![0.0f32; 8],
            timestamps: vec![SampleTimestamp {
                time: PrecisionUtcTime::new(5.0, 0.0),
                offset: 0,
                synthetic: false,
            }],
            sri_changed: false,
            sri_change_flags: SriChangeFlags::NONE,
            input_queue_flushed: false,
        };
        assert_eq!(block.size(), 4);
        assert!(block.is_complex());
        assert_eq!(block.start_time().map(|t| t.twsec), Some(5.0));
    }
}
