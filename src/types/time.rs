//! Precision UTC timestamps.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Time code mode for timestamps derived from the system clock.
pub const TCM_CPU: i16 = 1;
/// Time code status for a valid timestamp.
pub const TCS_VALID: i16 = 1;
/// Time code status for an invalid timestamp.
pub const TCS_INVALID: i16 = 0;

/// Fixed-point UTC time: whole seconds in `twsec` plus a fraction in `tfsec`.
///
/// Every constructor and arithmetic operator returns a normalized value with
/// `0 <= tfsec < 1`.
///
/// ```rust
/// use bulkio::PrecisionUtcTime;
///
/// let start = PrecisionUtcTime::new(100.0, 0.75);
/// let later = start + 0.5;
/// assert_eq!(later.twsec, 101.0);
/// assert!((later.tfsec - 0.25).abs() < 1e-12);
/// assert!(((later - start) - 0.5).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrecisionUtcTime {
    pub tcmode: i16,
    pub tcstatus: i16,
    /// Offset in samples from the start of the packet.
    pub toff: f64,
    pub twsec: f64,
    pub tfsec: f64,
}

impl Default for PrecisionUtcTime {
    fn default() -> Self {
        Self { tcmode: TCM_CPU, tcstatus: TCS_VALID, toff: 0.0, twsec: 0.0, tfsec: 0.0 }
    }
}

impl PrecisionUtcTime {
    /// Creates a valid CPU timestamp and normalizes it.
    pub fn new(twsec: f64, tfsec: f64) -> Self {
        let mut time = Self { twsec, tfsec, ..Self::default() };
        time.normalize();
        time
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        let now = Utc::now();
        Self::new(now.timestamp() as f64, f64::from(now.timestamp_subsec_nanos()) * 1e-9)
    }

    /// A timestamp flagged invalid, used when a push carries no time.
    pub fn not_set() -> Self {
        Self { tcstatus: TCS_INVALID, ..Self::default() }
    }

    pub fn is_valid(&self) -> bool {
        self.tcstatus == TCS_VALID
    }

    /// Folds any fraction in `twsec` into `tfsec` and carries whole seconds so
    /// that `0 <= tfsec < 1`, in constant time.
    pub fn normalize(&mut self) {
        let whole = self.twsec.floor();
        self.tfsec += self.twsec - whole;
        self.twsec = whole;

        let carry = self.tfsec.floor();
        self.twsec += carry;
        self.tfsec -= carry;
        // a tiny negative fraction rounds up to exactly 1.0 above
        if self.tfsec >= 1.0 {
            self.twsec += 1.0;
            self.tfsec -= 1.0;
        }
        if self.tfsec < 0.0 {
            self.tfsec = 0.0;
        }
    }

    /// Whole and fractional seconds as one `f64`.
    pub fn as_secs_f64(&self) -> f64 {
        self.twsec + self.tfsec
    }
}

impl Add<f64> for PrecisionUtcTime {
    type Output = Self;

    fn add(mut self, seconds: f64) -> Self {
        self += seconds;
        self
    }
}

impl AddAssign<f64> for PrecisionUtcTime {
    fn add_assign(&mut self, seconds: f64) {
        let whole = seconds.trunc();
        self.twsec += whole;
        self.tfsec += seconds - whole;
        self.normalize();
    }
}

impl Sub<f64> for PrecisionUtcTime {
    type Output = Self;

    fn sub(mut self, seconds: f64) -> Self {
        self -= seconds;
        self
    }
}

impl SubAssign<f64> for PrecisionUtcTime {
    fn sub_assign(&mut self, seconds: f64) {
        *self += -seconds;
    }
}

impl Sub for PrecisionUtcTime {
    type Output = f64;

    /// Difference in seconds.
    fn sub(self, other: Self) -> f64 {
        (self.twsec - other.twsec) + (self.tfsec - other.tfsec)
    }
}

impl PartialOrd for PrecisionUtcTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.twsec.partial_cmp(&other.twsec)? {
            Ordering::Equal => self.tfsec.partial_cmp(&other.tfsec),
            ordering => Some(ordering),
        }
    }
}

/// Formats as `YYYY:MM:DD::HH:MM:SS.ffffff`.
impl fmt::Display for PrecisionUtcTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut micros = (self.tfsec * 1e6).round() as i64;
        let mut secs = self.twsec as i64;
        if micros >= 1_000_000 {
            secs += 1;
            micros -= 1_000_000;
        }
        let Some(datetime) = DateTime::<Utc>::from_timestamp(secs, 0) else {
            return write!(f, "{}+{:.6}", self.twsec, self.tfsec);
        };
        write!(f, "{}.{:06}", datetime.format("%Y:%m:%d::%H:%M:%S"), micros)
    }
}
