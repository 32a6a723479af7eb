//! Stream-related information (SRI) and comparison helpers.

use serde::{Deserialize, Serialize};

use super::{SriChangeFlags, Value};

/// `xunits` value for time-domain data.
pub const UNITS_TIME_S: i16 = 1;
/// `yunits` value when the second dimension is unused.
pub const UNITS_NONE: i16 = 0;

/// Named keyword attached to an SRI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: String,
    pub value: Value,
}

impl Keyword {
    pub fn new(id: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { id: id.into(), value: value.into() }
    }
}

/// Metadata describing one logical stream.
///
/// `stream_id` identifies the stream within a port. `mode` is 0 for scalar
/// and 1 for complex samples; `subsize` is non-zero for framed data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSri {
    pub hversion: i32,
    pub xstart: f64,
    pub xdelta: f64,
    pub xunits: i16,
    pub subsize: i32,
    pub ystart: f64,
    pub ydelta: f64,
    pub yunits: i16,
    pub mode: i16,
    pub stream_id: String,
    pub blocking: bool,
    pub keywords: Vec<Keyword>,
}

impl Default for StreamSri {
    fn default() -> Self {
        create("", 1.0)
    }
}

impl StreamSri {
    /// Returns true for complex (interleaved real/imaginary) samples.
    pub fn is_complex(&self) -> bool {
        self.mode != 0
    }

    /// Sample rate implied by `xdelta`.
    pub fn sample_rate(&self) -> f64 {
        if self.xdelta == 0.0 { 0.0 } else { 1.0 / self.xdelta }
    }

    pub fn has_keyword(&self, id: &str) -> bool {
        self.keywords.iter().any(|keyword| keyword.id == id)
    }

    pub fn get_keyword(&self, id: &str) -> Option<&Value> {
        self.keywords.iter().find(|keyword| keyword.id == id).map(|keyword| &keyword.value)
    }

    /// Replaces the value of an existing keyword or appends a new one.
    pub fn set_keyword(&mut self, id: impl Into<String>, value: impl Into<Value>) {
        let id = id.into();
        let value = value.into();
        match self.keywords.iter_mut().find(|keyword| keyword.id == id) {
            Some(keyword) => keyword.value = value,
            None => self.keywords.push(Keyword { id, value }),
        }
    }

    /// Removes a keyword, returning true if it was present.
    pub fn erase_keyword(&mut self, id: &str) -> bool {
        let before = self.keywords.len();
        self.keywords.retain(|keyword| keyword.id != id);
        self.keywords.len() != before
    }
}

/// Builds a scalar time-domain SRI with no keywords.
///
/// ```rust
/// let sri = bulkio::sri::create("tuner_1", 1000.0);
/// assert_eq!(sri.stream_id, "tuner_1");
/// assert_eq!(sri.xdelta, 0.001);
/// assert_eq!(sri.mode, 0);
/// ```
pub fn create(stream_id: impl Into<String>, sample_rate: f64) -> StreamSri {
    StreamSri {
        hversion: 1,
        xstart: 0.0,
        xdelta: 1.0 / sample_rate,
        xunits: UNITS_TIME_S,
        subsize: 0,
        ystart: 0.0,
        ydelta: 0.0,
        yunits: UNITS_NONE,
        mode: 0,
        stream_id: stream_id.into(),
        blocking: false,
        keywords: Vec::new(),
    }
}

/// Returns the set of fields that differ between `a` and `b`.
pub fn compare_fields(a: &StreamSri, b: &StreamSri) -> SriChangeFlags {
    let mut flags = SriChangeFlags::NONE;
    let mut mark = |differs: bool, flag: SriChangeFlags| {
        if differs {
            flags |= flag;
        }
    };
    mark(a.hversion != b.hversion, SriChangeFlags::HVERSION);
    mark(a.xstart != b.xstart, SriChangeFlags::XSTART);
    mark(a.xdelta != b.xdelta, SriChangeFlags::XDELTA);
    mark(a.xunits != b.xunits, SriChangeFlags::XUNITS);
    mark(a.subsize != b.subsize, SriChangeFlags::SUBSIZE);
    mark(a.ystart != b.ystart, SriChangeFlags::YSTART);
    mark(a.ydelta != b.ydelta, SriChangeFlags::YDELTA);
    mark(a.yunits != b.yunits, SriChangeFlags::YUNITS);
    mark(a.mode != b.mode, SriChangeFlags::MODE);
    mark(a.stream_id != b.stream_id, SriChangeFlags::STREAMID);
    mark(a.blocking != b.blocking, SriChangeFlags::BLOCKING);
    mark(a.keywords != b.keywords, SriChangeFlags::KEYWORDS);
    flags
}

/// Decides whether a pushed SRI counts as a change of the stored one.
pub trait SriComparator: Send + Sync {
    fn same(&self, stored: &StreamSri, pushed: &StreamSri) -> bool;
}

/// Field-wise equality of every field except `stream_id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultComparator;

impl SriComparator for DefaultComparator {
    fn same(&self, stored: &StreamSri, pushed: &StreamSri) -> bool {
        let differs = compare_fields(stored, pushed);
        (differs & !SriChangeFlags::STREAMID).is_empty()
    }
}

impl<F> SriComparator for F
where
    F: Fn(&StreamSri, &StreamSri) -> bool + Send + Sync,
{
    fn same(&self, stored: &StreamSri, pushed: &StreamSri) -> bool {
        self(stored, pushed)
    }
}
