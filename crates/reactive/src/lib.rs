//! Pull-based reactive primitives.
//!
//! An [`Input`] carries a version that moves forward on every write. A
//! [`Calc`] caches its last result together with the key it was computed
//! for, normally a tuple of input versions or upstream generations, and only
//! re-runs when asked for a different key. Evaluation is driven by whoever
//! owns the graph, so there is no scheduler and nothing runs concurrently.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version(pub u64);

impl Version {
    fn bump(&mut self) {
        self.0 += 1;
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A value written by the outside world and observed by calcs.
#[derive(Debug, Clone)]
pub struct Input<T> {
    value: T,
    version: Version,
}

impl<T> Input<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            version: Version::default(),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Replaces the value and invalidates dependents even if it compares equal.
    pub fn set(&mut self, value: T) -> Version {
        self.value = value;
        self.version.bump();
        self.version
    }

    /// Replaces the value, returning the old one.
    pub fn replace(&mut self, value: T) -> T {
        self.version.bump();
        std::mem::replace(&mut self.value, value)
    }
}

impl<T: PartialEq> Input<T> {
    /// Only invalidates dependents when the value actually changes.
    pub fn set_if_changed(&mut self, value: T) -> bool {
        if self.value == value {
            return false;
        }
        self.set(value);
        true
    }
}

impl<T: Default> Default for Input<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Why a calc produced no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Halt<E> {
    /// A required input is absent. Not an error; dependents stay empty.
    Suspended,
    Failed(E),
}

impl<E> From<E> for Halt<E> {
    fn from(err: E) -> Self {
        Self::Failed(err)
    }
}

pub type Eval<T, E> = Result<T, Halt<E>>;

/// Suspends the surrounding computation until `value` is present.
pub fn req<T, E>(value: Option<T>) -> Eval<T, E> {
    value.ok_or(Halt::Suspended)
}

/// Memoized computation keyed on the versions it depends on.
#[derive(Debug)]
pub struct Calc<K, T> {
    label: &'static str,
    cached: Option<(K, T)>,
    generation: Version,
}

impl<K: PartialEq + fmt::Debug, T> Calc<K, T> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            cached: None,
            generation: Version::default(),
        }
    }

    /// Number of times the computation has run. Downstream calcs key on this.
    pub fn generation(&self) -> Version {
        self.generation
    }

    pub fn is_current(&self, key: &K) -> bool {
        matches!(&self.cached, Some((cached_key, _)) if cached_key == key)
    }

    pub fn peek(&self) -> Option<&T> {
        self.cached.as_ref().map(|(_, value)| value)
    }

    /// Returns the cached value for `key`, running `compute` first when the
    /// key changed since the last run.
    pub fn get(&mut self, key: K, compute: impl FnOnce() -> T) -> &T {
        if !self.is_current(&key) {
            self.cached = None;
        }
        let label = self.label;
        let generation = &mut self.generation;
        let (_, value) = self.cached.get_or_insert_with(|| {
            tracing::debug!(calc = label, ?key, "recomputing");
            generation.bump();
            let value = compute();
            (key, value)
        });
        value
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
