use serde::{Deserialize, Serialize};
use std::fmt;

/// Chain-reported time as unix nanoseconds.
///
/// Block timestamps are stored and compared in this form. Ordering of blocks
/// is defined by height; two blocks may share a timestamp.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Nano(pub i64);

impl Nano {
    pub const ZERO: Nano = Nano(0);

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `self - duration`, saturating at the bounds of `i64`.
    pub fn saturating_sub(self, duration: time::Duration) -> Self {
        let nanos = i64::try_from(duration.whole_nanoseconds()).unwrap_or(i64::MAX);
        Nano(self.0.saturating_sub(nanos))
    }
}

impl From<i64> for Nano {
    fn from(value: i64) -> Self {
        Nano(value)
    }
}

impl fmt::Display for Nano {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
