//! Key ranges over typed values and over encoded key bytes.

use std::{cmp::Ordering, fmt, ops::Bound};

use crate::{key::KeyValue, schema::ColumnType};

/// A key range with owned bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyRange<K> {
    /// Start bound (inclusive/exclusive/unbounded).
    pub start: Bound<K>,
    /// End bound (inclusive/exclusive/unbounded).
    pub end: Bound<K>,
}

impl<K> KeyRange<K> {
    /// Create an unbounded range (all keys).
    pub fn all() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
        }
    }

    /// Create a new range from explicit bounds.
    pub fn new(start: Bound<K>, end: Bound<K>) -> Self {
        Self { start, end }
    }

    /// Whether neither side is bounded.
    pub fn is_full(&self) -> bool {
        matches!(
            (&self.start, &self.end),
            (Bound::Unbounded, Bound::Unbounded)
        )
    }
}

impl<K: Clone> KeyRange<K> {
    /// Range holding exactly `key`.
    pub fn point(key: K) -> Self {
        Self {
            start: Bound::Included(key.clone()),
            end: Bound::Included(key),
        }
    }
}

impl<K: Ord> KeyRange<K> {
    /// Whether this range contains `key`.
    pub fn contains(&self, key: &K) -> bool {
        let start_ok = match &self.start {
            Bound::Unbounded => true,
            Bound::Included(bound) => key >= bound,
            Bound::Excluded(bound) => key > bound,
        };
        if !start_ok {
            return false;
        }
        match &self.end {
            Bound::Unbounded => true,
            Bound::Included(bound) => key <= bound,
            Bound::Excluded(bound) => key < bound,
        }
    }

    /// The single key of a point range `[k, k]`.
    pub fn as_point(&self) -> Option<&K> {
        match (&self.start, &self.end) {
            (Bound::Included(lo), Bound::Included(hi)) if lo == hi => Some(lo),
            _ => None,
        }
    }

    /// Whether the bounds admit no key.
    ///
    /// Exclusive bounds are treated as dense: `(a, b)` with `a < b` is never
    /// reported empty. Use [`KeyRange::canonicalize`] for discrete domains.
    pub fn is_empty(&self) -> bool {
        is_empty_range(&self.start, &self.end)
    }

    /// Every key strictly below the range.
    pub fn all_below(&self, key: &K) -> bool {
        match &self.end {
            Bound::Unbounded => false,
            Bound::Included(hi) => hi < key,
            Bound::Excluded(hi) => hi <= key,
        }
    }

    /// Every key in the range is strictly above `key`.
    pub fn all_above(&self, key: &K) -> bool {
        match &self.start {
            Bound::Unbounded => false,
            Bound::Included(lo) => lo > key,
            Bound::Excluded(lo) => lo >= key,
        }
    }

    /// Every key in the range is at most `key`.
    pub fn all_at_most(&self, key: &K) -> bool {
        match &self.end {
            Bound::Unbounded => false,
            Bound::Included(hi) | Bound::Excluded(hi) => hi <= key,
        }
    }

    /// Every key in the range is at least `key`.
    pub fn all_at_least(&self, key: &K) -> bool {
        match &self.start {
            Bound::Unbounded => false,
            Bound::Included(lo) | Bound::Excluded(lo) => lo >= key,
        }
    }
}

impl<K: Ord + Clone> KeyRange<K> {
    /// Intersection of two ranges, or `None` when it is empty.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let start = max_lower_owned(self.start.clone(), other.start.clone());
        let end = min_upper_owned(self.end.clone(), other.end.clone());
        if is_empty_range(&start, &end) {
            None
        } else {
            Some(KeyRange::new(start, end))
        }
    }
}

impl KeyRange<KeyValue> {
    /// Normalizes the range for a column type.
    ///
    /// Discrete types rewrite exclusive bounds into inclusive ones on the
    /// neighbouring value. Returns `None` when the range holds no value.
    pub fn canonicalize(self, ty: ColumnType) -> Option<Self> {
        let (start, end) = if ty.is_discrete() {
            let start = match self.start {
                Bound::Excluded(lo) => Bound::Included(ty.successor(&lo)?),
                other => other,
            };
            let end = match self.end {
                Bound::Excluded(hi) => Bound::Included(ty.predecessor(&hi)?),
                other => other,
            };
            (start, end)
        } else {
            (self.start, self.end)
        };
        if is_empty_range(&start, &end) {
            None
        } else {
            Some(KeyRange::new(start, end))
        }
    }

    /// Joins `self` with the range immediately following it, when the two
    /// touch with no value in between.
    pub fn merge_adjacent(&self, next: &Self, ty: ColumnType) -> Option<Self> {
        let touching = overlaps_or_adjacent(&self.end, &next.start)
            || match (&self.end, &next.start) {
                (Bound::Included(hi), Bound::Included(lo)) => {
                    ty.successor(hi).as_ref() == Some(lo)
                }
                _ => false,
            };
        touching.then(|| {
            KeyRange::new(
                self.start.clone(),
                max_upper_owned(self.end.clone(), next.end.clone()),
            )
        })
    }
}

impl<K: fmt::Display> fmt::Display for KeyRange<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.start {
            Bound::Unbounded => f.write_str("(-inf")?,
            Bound::Included(lo) => write!(f, "[{lo}")?,
            Bound::Excluded(lo) => write!(f, "({lo}")?,
        }
        match &self.end {
            Bound::Unbounded => f.write_str(", +inf)"),
            Bound::Included(hi) => write!(f, ", {hi}]"),
            Bound::Excluded(hi) => write!(f, ", {hi})"),
        }
    }
}

// Whether two ranges touch at the boundary (end meets start) or overlap.
fn overlaps_or_adjacent<K: Ord>(end: &Bound<K>, start: &Bound<K>) -> bool {
    use Bound as B;
    match (end, start) {
        (B::Unbounded, _) | (_, B::Unbounded) => true,
        (B::Included(x), B::Included(y)) => x >= y,
        (B::Included(x), B::Excluded(y)) => x >= y,
        (B::Excluded(x), B::Included(y)) => x >= y,
        (B::Excluded(x), B::Excluded(y)) => x > y,
    }
}

// Included(x) sorts before Excluded(x) as a lower bound and after it as an upper bound.
fn ord_bound<K: Ord>(a: &K, inc_a: bool, b: &K, inc_b: bool, upper: bool) -> Ordering {
    a.cmp(b).then_with(|| match (inc_a, inc_b) {
        (true, false) if upper => Ordering::Greater,
        (true, false) => Ordering::Less,
        (false, true) if upper => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => Ordering::Equal,
    })
}

fn split<K>(bound: &Bound<K>) -> Option<(&K, bool)> {
    match bound {
        Bound::Included(k) => Some((k, true)),
        Bound::Excluded(k) => Some((k, false)),
        Bound::Unbounded => None,
    }
}

fn max_lower_owned<K: Ord>(a: Bound<K>, b: Bound<K>) -> Bound<K> {
    match (split(&a), split(&b)) {
        (None, _) => b,
        (_, None) => a,
        (Some((x, ix)), Some((y, iy))) => {
            if ord_bound(x, ix, y, iy, false) == Ordering::Greater {
                a
            } else {
                b
            }
        }
    }
}

fn min_upper_owned<K: Ord>(a: Bound<K>, b: Bound<K>) -> Bound<K> {
    match (split(&a), split(&b)) {
        (None, _) => b,
        (_, None) => a,
        (Some((x, ix)), Some((y, iy))) => {
            if ord_bound(x, ix, y, iy, true) == Ordering::Less {
                a
            } else {
                b
            }
        }
    }
}

fn max_upper_owned<K: Ord>(a: Bound<K>, b: Bound<K>) -> Bound<K> {
    match (split(&a), split(&b)) {
        (None, _) | (_, None) => Bound::Unbounded,
        (Some((x, ix)), Some((y, iy))) => {
            if ord_bound(x, ix, y, iy, true) == Ordering::Greater {
                a
            } else {
                b
            }
        }
    }
}

fn is_empty_range<K: Ord>(start: &Bound<K>, end: &Bound<K>) -> bool {
    use Bound as B;
    match (start, end) {
        (B::Unbounded, _) | (_, B::Unbounded) => false,
        (B::Included(a), B::Included(b)) => a > b,
        (B::Included(a), B::Excluded(b))
        | (B::Excluded(a), B::Included(b))
        | (B::Excluded(a), B::Excluded(b)) => a >= b,
    }
}

/// Half-open interval of encoded keys: `start` inclusive, `end` exclusive.
///
/// `None` (or an empty byte string) on either side means unbounded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ByteRange {
    start: Option<Vec<u8>>,
    end: Option<Vec<u8>>,
}

impl ByteRange {
    /// Interval `[start, end)`; empty byte strings are read as unbounded.
    pub fn new(start: Option<Vec<u8>>, end: Option<Vec<u8>>) -> Self {
        Self {
            start: start.filter(|bytes| !bytes.is_empty()),
            end: end.filter(|bytes| !bytes.is_empty()),
        }
    }

    /// The whole keyspace.
    pub fn all() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    /// Inclusive start key.
    pub fn start(&self) -> Option<&[u8]> {
        self.start.as_deref()
    }

    /// Exclusive end key.
    pub fn end(&self) -> Option<&[u8]> {
        self.end.as_deref()
    }

    /// Splits the range into its bounds.
    pub fn into_parts(self) -> (Option<Vec<u8>>, Option<Vec<u8>>) {
        (self.start, self.end)
    }

    /// Whether the interval holds no key.
    pub fn is_empty(&self) -> bool {
        matches!((&self.start, &self.end), (Some(start), Some(end)) if start >= end)
    }

    /// Whether `key` falls inside the interval.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.start.as_deref().map_or(true, |start| key >= start)
            && self.end.as_deref().map_or(true, |end| key < end)
    }

    /// Intersection of two intervals, or `None` when it is empty.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let start = match (&self.start, &other.start) {
            (Some(a), Some(b)) => Some(a.max(b).clone()),
            (Some(a), None) | (None, Some(a)) => Some(a.clone()),
            (None, None) => None,
        };
        let end = match (&self.end, &other.end) {
            (Some(a), Some(b)) => Some(a.min(b).clone()),
            (Some(a), None) | (None, Some(a)) => Some(a.clone()),
            (None, None) => None,
        };
        let range = ByteRange { start, end };
        (!range.is_empty()).then_some(range)
    }

    /// Whether `next` begins exactly where `self` ends.
    pub fn abuts(&self, next: &Self) -> bool {
        matches!((&self.end, &next.start), (Some(end), Some(start)) if end == start)
    }

    /// Smallest interval covering both.
    pub fn hull(&self, other: &Self) -> Self {
        let start = match (&self.start, &other.start) {
            (Some(a), Some(b)) => Some(a.min(b).clone()),
            _ => None,
        };
        let end = match (&self.end, &other.end) {
            (Some(a), Some(b)) => Some(a.max(b).clone()),
            _ => None,
        };
        ByteRange { start, end }
    }
}
