//! Stream-oriented writer on top of an output port.

use tracing::trace;

use super::port::OutputPort;
use crate::types::{PrecisionUtcTime, SampleBuffer, StreamSri, Value};

/// Writer for one stream of an [`OutputPort`].
///
/// SRI edits are pushed lazily before the next write. With a non-zero
/// buffer size, writes accumulate until that many elements are held and go
/// out as one packet stamped with the first write's time.
///
/// ```rust
/// use bulkio::{InputPort, OutputPort, PrecisionUtcTime, Wait};
///
/// let output = OutputPort::<Vec<i32>>::new("dataLong_out");
/// let input = InputPort::<Vec<i32>>::new("dataLong_in");
/// output.connect_local(&input, "c1").unwrap();
///
/// let mut stream = output.create_stream("tone");
/// stream.set_sample_rate(1000.0);
/// stream.write(vec![1, 2, 3], PrecisionUtcTime::now());
/// stream.close();
///
/// let first = input.get_packet(Wait::NonBlocking).unwrap();
/// assert_eq!(first.sri.xdelta, 0.001);
/// assert!(input.get_packet(Wait::NonBlocking).unwrap().eos);
/// ```
#[derive(Debug)]
pub struct OutputStream<B: SampleBuffer> {
    port: OutputPort<B>,
    sri: StreamSri,
    sri_dirty: bool,
    buffer: B,
    buffer_size: usize,
    buffer_time: Option<PrecisionUtcTime>,
    last_time: Option<PrecisionUtcTime>,
}

impl<B: SampleBuffer> OutputStream<B> {
    pub(super) fn new(port: OutputPort<B>, sri: StreamSri) -> Self {
        let buffer = port.buffer_pool().acquire();
        Self {
            port,
            sri,
            sri_dirty: true,
            buffer,
            buffer_size: 0,
            buffer_time: None,
            last_time: None,
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.sri.stream_id
    }

    pub fn sri(&self) -> &StreamSri {
        &self.sri
    }

    /// Applies an SRI edit, flushing buffered data that belongs to the old SRI.
    fn modify(&mut self, edit: impl FnOnce(&mut StreamSri)) {
        self.flush();
        let stream_id = self.sri.stream_id.clone();
        edit(&mut self.sri);
        self.sri.stream_id = stream_id;
        self.sri_dirty = true;
    }

    /// Replaces the SRI; the stream ID is kept.
    pub fn set_sri(&mut self, sri: StreamSri) {
        self.modify(|current| *current = sri);
    }

    pub fn set_xstart(&mut self, xstart: f64) {
        self.modify(|sri| sri.xstart = xstart);
    }

    pub fn set_xdelta(&mut self, xdelta: f64) {
        self.modify(|sri| sri.xdelta = xdelta);
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.set_xdelta(1.0 / sample_rate);
    }

    pub fn set_xunits(&mut self, xunits: i16) {
        self.modify(|sri| sri.xunits = xunits);
    }

    pub fn set_subsize(&mut self, subsize: i32) {
        self.modify(|sri| sri.subsize = subsize);
    }

    pub fn set_complex(&mut self, complex: bool) {
        self.modify(|sri| sri.mode = i16::from(complex));
    }

    pub fn set_blocking(&mut self, blocking: bool) {
        self.modify(|sri| sri.blocking = blocking);
    }

    pub fn set_keyword(&mut self, id: &str, value: impl Into<Value>) {
        self.modify(|sri| sri.set_keyword(id, value));
    }

    pub fn erase_keyword(&mut self, id: &str) {
        self.modify(|sri| {
            sri.erase_keyword(id);
        });
    }

    /// Elements held before a buffered write goes out; zero disables buffering.
    pub fn set_buffer_size(&mut self, elements: usize) {
        self.buffer_size = elements;
        if self.buffer.len() >= elements {
            self.flush();
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn push_sri_if_dirty(&mut self) {
        if self.sri_dirty {
            let time = self.last_time.unwrap_or_else(PrecisionUtcTime::now);
            self.port.push_sri(self.sri.clone(), time);
            self.sri_dirty = false;
        }
    }

    pub fn write(&mut self, data: B, time: PrecisionUtcTime) {
        self.last_time = Some(time);
        if self.buffer_size == 0 {
            self.flush();
            self.push_sri_if_dirty();
            self.port.push_packet(data, time, false, &self.sri.stream_id);
            return;
        }
        if self.buffer.is_empty() {
            self.buffer_time = Some(time);
        }
        self.buffer.append(&data);
        self.port.buffer_pool().release(data);
        if self.buffer.len() >= self.buffer_size {
            self.flush();
        }
    }

    /// Sends any buffered elements.
    pub fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        self.push_sri_if_dirty();
        let data = std::mem::replace(&mut self.buffer, self.port.buffer_pool().acquire());
        let time = self.buffer_time.take().unwrap_or_else(PrecisionUtcTime::now);
        trace!(port = %self.port.name(), stream_id = %self.sri.stream_id, elements = data.len(), "Flushing buffered write");
        self.port.push_packet(data, time, false, &self.sri.stream_id);
    }

    /// Flushes and ends the stream.
    pub fn close(mut self) {
        self.flush();
        self.push_sri_if_dirty();
        let time = self.last_time.unwrap_or_else(PrecisionUtcTime::now);
        let empty = self.port.buffer_pool().acquire();
        self.port.push_packet(empty, time, true, &self.sri.stream_id);
    }
}
