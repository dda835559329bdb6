//! # Seeds: which conversation owns an update.
//!
//! A seeder maps every update to one of three disjoint cases:
//! - [`Seed::Key`]: a hashable value; at most one live delegate exists per key
//! - [`Seed::Fanout`]: a non-hashable value (an ordered list); every update spawns a
//!   fresh delegate
//! - [`Seed::Absent`]: this seeder wants no delegate for the update
//!
//! ## Example
//! ```
//! use seedvisor::{Seed, SeedKey};
//!
//! let chat: Seed = 42i64.into();
//! assert_eq!(chat, Seed::Key(SeedKey::Int(42)));
//!
//! let origin: Seed = (7i64, "inline").into();
//! assert!(origin.is_key());
//! assert_eq!(origin.to_string(), "(7, \"inline\")");
//! ```

use std::fmt;
use std::sync::Arc;

/// Hashable seed value: numbers, strings and tuples of such.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SeedKey {
    /// Integer key (chat id, user id, ...).
    Int(i64),
    /// String key (inline message id, invoice payload, ...).
    Str(Arc<str>),
    /// Composite key.
    Tuple(Vec<SeedKey>),
}

/// Result of applying a seeder to an update.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Seed {
    /// Admissible as a registry key.
    Key(SeedKey),
    /// Not admissible as a key: fan-out, one delegate per update.
    Fanout(Vec<SeedKey>),
    /// No delegate desired.
    #[default]
    Absent,
}

impl Seed {
    /// Unconditional fan-out seed without payload.
    pub fn fanout() -> Self {
        Seed::Fanout(Vec::new())
    }

    /// True for the hashable case.
    pub fn is_key(&self) -> bool {
        matches!(self, Seed::Key(_))
    }

    /// True for the absent case.
    pub fn is_absent(&self) -> bool {
        matches!(self, Seed::Absent)
    }

    /// Returns the key for the hashable case.
    pub fn key(&self) -> Option<&SeedKey> {
        match self {
            Seed::Key(k) => Some(k),
            _ => None,
        }
    }
}

impl<K: Into<SeedKey>> From<Option<K>> for Seed {
    fn from(value: Option<K>) -> Self {
        value.map_or(Seed::Absent, |k| Seed::Key(k.into()))
    }
}

macro_rules! int_keys {
    ($($t:ty),*) => {$(
        impl From<$t> for SeedKey {
            fn from(v: $t) -> Self {
                SeedKey::Int(i64::from(v))
            }
        }
        impl From<$t> for Seed {
            fn from(v: $t) -> Self {
                Seed::Key(v.into())
            }
        }
    )*};
}

int_keys!(i8, i16, i32, i64, u8, u16, u32);

impl From<&str> for SeedKey {
    fn from(v: &str) -> Self {
        SeedKey::Str(v.into())
    }
}

impl From<String> for SeedKey {
    fn from(v: String) -> Self {
        SeedKey::Str(v.into())
    }
}

impl From<Arc<str>> for SeedKey {
    fn from(v: Arc<str>) -> Self {
        SeedKey::Str(v)
    }
}

impl From<&str> for Seed {
    fn from(v: &str) -> Self {
        Seed::Key(v.into())
    }
}

impl From<String> for Seed {
    fn from(v: String) -> Self {
        Seed::Key(v.into())
    }
}

impl From<SeedKey> for Seed {
    fn from(v: SeedKey) -> Self {
        Seed::Key(v)
    }
}

impl<A: Into<SeedKey>, B: Into<SeedKey>> From<(A, B)> for SeedKey {
    fn from((a, b): (A, B)) -> Self {
        SeedKey::Tuple(vec![a.into(), b.into()])
    }
}

impl<A: Into<SeedKey>, B: Into<SeedKey>> From<(A, B)> for Seed {
    fn from(v: (A, B)) -> Self {
        Seed::Key(v.into())
    }
}

impl<A: Into<SeedKey>, B: Into<SeedKey>, C: Into<SeedKey>> From<(A, B, C)> for SeedKey {
    fn from((a, b, c): (A, B, C)) -> Self {
        SeedKey::Tuple(vec![a.into(), b.into(), c.into()])
    }
}

impl<A: Into<SeedKey>, B: Into<SeedKey>, C: Into<SeedKey>> From<(A, B, C)> for Seed {
    fn from(v: (A, B, C)) -> Self {
        Seed::Key(v.into())
    }
}

impl fmt::Display for SeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedKey::Int(v) => write!(f, "{v}"),
            SeedKey::Str(v) => write!(f, "{v:?}"),
            SeedKey::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seed::Key(k) => write!(f, "{k}"),
            Seed::Fanout(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Seed::Absent => f.write_str("-"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_maps_none_to_absent() {
        assert_eq!(Seed::from(None::<i64>), Seed::Absent);
        assert_eq!(Seed::from(Some(5i64)), Seed::Key(SeedKey::Int(5)));
    }

    #[test]
    fn tuples_nest() {
        let key: SeedKey = ((1i64, 2i64), "x").into();
        assert_eq!(
            key,
            SeedKey::Tuple(vec![
                SeedKey::Tuple(vec![SeedKey::Int(1), SeedKey::Int(2)]),
                SeedKey::Str("x".into()),
            ])
        );
        assert_eq!(key.to_string(), "((1, 2), \"x\")");
    }

    #[test]
    fn fanout_is_not_a_key() {
        let seed = Seed::fanout();
        assert!(!seed.is_key());
        assert!(seed.key().is_none());
        assert_eq!(seed.to_string(), "[]");
    }
}
