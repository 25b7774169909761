use core::fmt;
use core::time::Duration;

/// Height of a chain, a `(revision_number, revision_height)` pair.
///
/// Heights are ordered lexicographically: a higher revision number always
/// compares greater regardless of the revision height.  A zero height is used
/// to mean ‘no height’ (for example a packet with no height timeout).
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
pub struct Height {
    pub revision_number: u64,
    pub revision_height: u64,
}

impl Height {
    pub const ZERO: Self = Self::new(0, 0);

    pub const fn new(revision_number: u64, revision_height: u64) -> Self {
        Self { revision_number, revision_height }
    }

    pub fn is_zero(&self) -> bool { *self == Self::ZERO }

    /// Returns the height `delta` blocks later within the same revision.
    pub fn add(self, delta: u64) -> Self {
        Self::new(
            self.revision_number,
            self.revision_height.saturating_add(delta),
        )
    }

    /// Returns the next height within the same revision.
    pub fn increment(self) -> Self { self.add(1) }

    /// Returns whether a timeout at this height has been reached at given
    /// height.  Zero height never times out.
    pub fn has_expired(&self, at: Height) -> bool {
        !self.is_zero() && at >= *self
    }
}

impl fmt::Display for Height {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmtr, "{}-{}", self.revision_number, self.revision_height)
    }
}

impl fmt::Debug for Height {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, fmtr)
    }
}

impl From<(u64, u64)> for Height {
    fn from((number, height): (u64, u64)) -> Self { Self::new(number, height) }
}

/// Unix timestamp in nanoseconds.  Zero is used to mean ‘no timestamp’.
#[derive(
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::From,
    derive_more::Into,
)]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Self = Self(0);

    pub const fn from_nanos(nanos: u64) -> Self { Self(nanos) }

    pub const fn nanos(self) -> u64 { self.0 }

    pub fn is_zero(&self) -> bool { self.0 == 0 }

    /// Returns the timestamp `duration` later, saturating on overflow.
    pub fn add(self, duration: Duration) -> Self {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(nanos))
    }

    /// Returns whether a timeout at this timestamp has been reached at given
    /// time.  Zero timestamp never times out.
    pub fn has_expired(&self, at: Timestamp) -> bool {
        !self.is_zero() && at >= *self
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmtr, "{}ns", self.0)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, fmtr)
    }
}

#[test]
fn test_height_ordering() {
    let heights = [
        Height::ZERO,
        Height::new(0, 1),
        Height::new(0, 100),
        Height::new(1, 0),
        Height::new(1, 5),
    ];
    for pair in heights.windows(2) {
        assert!(pair[0] < pair[1], "{} < {}", pair[0], pair[1]);
    }
    assert_eq!(Height::new(1, 6), Height::new(1, 5).increment());
    assert_eq!("1-5", alloc::string::ToString::to_string(&heights[4]));
}

#[test]
fn test_expiry() {
    assert!(!Height::ZERO.has_expired(Height::new(9, 9)));
    assert!(!Height::new(0, 10).has_expired(Height::new(0, 9)));
    assert!(Height::new(0, 10).has_expired(Height::new(0, 10)));
    assert!(Height::new(0, 10).has_expired(Height::new(1, 1)));

    let ts = Timestamp::from_nanos(1_000);
    assert!(!Timestamp::ZERO.has_expired(Timestamp::from_nanos(u64::MAX)));
    assert!(!ts.has_expired(Timestamp::from_nanos(999)));
    assert!(ts.has_expired(Timestamp::from_nanos(1_000)));
    assert_eq!(
        Timestamp::from_nanos(u64::MAX),
        ts.add(Duration::from_secs(u64::MAX))
    );
}
