//! Structured keys and their canonical, hashable normal form
//!
//! Callers build a [`RawKey`] out of the usual scalar and composite shapes.
//! [`normalize`] folds it into a [`CanonicalKey`]: a tagged, deeply-ordered
//! representation where value-equal keys — regardless of how their maps were
//! built or which fixed-width tuple arity was used — collapse to identical
//! forms. The backing store only ever sees `CanonicalKey`; it is the unit of
//! hashing and ordering for every row operation.

use std::cmp::Ordering;

/// Maximum arity at which a fixed-width composite keeps its own tagged shape.
/// Wider composites are normalized elementwise, same as a sequence.
const MAX_TUPLE_ARITY: usize = 4;

/// An arbitrary, immutable key tree as supplied by a caller.
#[derive(Debug, Clone, PartialEq)]
pub enum RawKey {
    /// The absence of a value.
    Null,
    /// A boolean scalar.
    Bool(bool),
    /// A signed integer scalar.
    Int(i64),
    /// A floating-point scalar.
    Float(f64),
    /// A UTF-8 string scalar.
    Str(String),
    /// An opaque byte string.
    Bytes(Vec<u8>),
    /// An ordered sequence of keys.
    Seq(Vec<RawKey>),
    /// A fixed-width composite (e.g. a tuple). Arity is preserved by
    /// normalization only when it does not exceed [`MAX_TUPLE_ARITY`].
    Tuple(Vec<RawKey>),
    /// An unordered mapping of key to value.
    Map(Vec<(RawKey, RawKey)>),
}

impl From<&str> for RawKey {
    fn from(s: &str) -> Self {
        RawKey::Str(s.to_string())
    }
}

impl From<String> for RawKey {
    fn from(s: String) -> Self {
        RawKey::Str(s)
    }
}

impl From<i64> for RawKey {
    fn from(v: i64) -> Self {
        RawKey::Int(v)
    }
}

impl From<bool> for RawKey {
    fn from(v: bool) -> Self {
        RawKey::Bool(v)
    }
}

impl From<Vec<u8>> for RawKey {
    fn from(v: Vec<u8>) -> Self {
        RawKey::Bytes(v)
    }
}

/// A total-ordering wrapper over `f64` so normalized keys can be hashed and
/// ordered. NaN payloads collapse to a single canonical bit pattern; two keys
/// that both carried NaN therefore normalize equal to each other, which is
/// the only sane choice for a cache key.
#[derive(Debug, Clone, Copy)]
pub struct OrderedFloat(pub f64);

impl OrderedFloat {
    fn bits(self) -> u64 {
        if self.0.is_nan() {
            f64::NAN.to_bits()
        } else {
            self.0.to_bits()
        }
    }
}

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}
impl Eq for OrderedFloat {}

impl std::hash::Hash for OrderedFloat {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

impl PartialOrd for OrderedFloat {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedFloat {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// The canonical, value-based form of a [`RawKey`].
///
/// Two `RawKey`s that are value-equal always normalize to the same
/// `CanonicalKey`. `Map` is kept as its own variant (rather than flattened
/// into `Seq`) precisely so a map and a sequence of pairs never collide —
/// the variant discriminant is the sentinel the design calls for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalKey {
    /// The absence of a value.
    Null,
    /// A boolean scalar.
    Bool(bool),
    /// A signed integer scalar.
    Int(i64),
    /// A floating-point scalar.
    Float(OrderedFloat),
    /// A UTF-8 string scalar.
    Str(String),
    /// An opaque byte string.
    Bytes(Vec<u8>),
    /// A normalized sequence.
    Seq(Vec<CanonicalKey>),
    /// A normalized fixed-width composite, arity preserved.
    Tuple(Vec<CanonicalKey>),
    /// A normalized mapping: pairs sorted by normalized key.
    Map(Vec<(CanonicalKey, CanonicalKey)>),
}

/// Fold a [`RawKey`] into its canonical form.
///
/// `normalize(normalize(k)) == normalize(k)`: re-running normalization over
/// the round trip of an already-canonical key ([`CanonicalKey`] converts
/// losslessly back into `RawKey` via `From`) reproduces the same value.
pub fn normalize(key: &RawKey) -> CanonicalKey {
    match key {
        RawKey::Null => CanonicalKey::Null,
        RawKey::Bool(b) => CanonicalKey::Bool(*b),
        RawKey::Int(i) => CanonicalKey::Int(*i),
        RawKey::Float(f) => CanonicalKey::Float(OrderedFloat(*f)),
        RawKey::Str(s) => CanonicalKey::Str(s.clone()),
        RawKey::Bytes(b) => CanonicalKey::Bytes(b.clone()),
        RawKey::Seq(items) => CanonicalKey::Seq(items.iter().map(normalize).collect()),
        RawKey::Tuple(items) => {
            if items.len() <= MAX_TUPLE_ARITY {
                CanonicalKey::Tuple(items.iter().map(normalize).collect())
            } else {
                CanonicalKey::Seq(items.iter().map(normalize).collect())
            }
        }
        RawKey::Map(pairs) => {
            let mut normalized: Vec<(CanonicalKey, CanonicalKey)> = pairs
                .iter()
                .map(|(k, v)| (normalize(k), normalize(v)))
                .collect();
            normalized.sort_by(|(ak, _), (bk, _)| ak.cmp(bk));
            CanonicalKey::Map(normalized)
        }
    }
}

impl From<CanonicalKey> for RawKey {
    fn from(key: CanonicalKey) -> Self {
        match key {
            CanonicalKey::Null => RawKey::Null,
            CanonicalKey::Bool(b) => RawKey::Bool(b),
            CanonicalKey::Int(i) => RawKey::Int(i),
            CanonicalKey::Float(f) => RawKey::Float(f.0),
            CanonicalKey::Str(s) => RawKey::Str(s),
            CanonicalKey::Bytes(b) => RawKey::Bytes(b),
            CanonicalKey::Seq(items) => RawKey::Seq(items.into_iter().map(RawKey::from).collect()),
            CanonicalKey::Tuple(items) => {
                RawKey::Tuple(items.into_iter().map(RawKey::from).collect())
            }
            CanonicalKey::Map(pairs) => RawKey::Map(
                pairs
                    .into_iter()
                    .map(|(k, v)| (RawKey::from(k), RawKey::from(v)))
                    .collect(),
            ),
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_raw_key() -> impl Strategy<Value = RawKey> {
        let leaf = prop_oneof![
            Just(RawKey::Null),
            any::<bool>().prop_map(RawKey::Bool),
            any::<i64>().prop_map(RawKey::Int),
            "[a-z]{0,8}".prop_map(RawKey::Str),
            prop::collection::vec(any::<u8>(), 0..6).prop_map(RawKey::Bytes),
        ];
        leaf.prop_recursive(4, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..5).prop_map(RawKey::Seq),
                prop::collection::vec(inner.clone(), 0..5).prop_map(RawKey::Tuple),
                prop::collection::vec((inner.clone(), inner), 0..5).prop_map(RawKey::Map),
            ]
        })
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent_under_round_trip(k in arb_raw_key()) {
            let once = normalize(&k);
            let round_tripped: RawKey = once.clone().into();
            let twice = normalize(&round_tripped);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn maps_always_normalize_sorted_by_key(k in arb_raw_key()) {
            if let CanonicalKey::Map(pairs) = normalize(&k) {
                for w in pairs.windows(2) {
                    prop_assert!(w[0].0 <= w[1].0);
                }
            }
        }
    }
}
