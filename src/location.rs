//! Type-safe identifiers for executed code.
//!
//! A [`Location`] names one executable statement: the function it belongs to
//! and its line. Two consecutive locations of a trace form an [`Arc`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_FUNCTION_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of an instrumented function.
///
/// Every call to [`FunctionId::fresh`] yields a distinct identity, even for equal
/// names. Equality and hashing only look at the identity, never at the name,
/// so two functions that happen to share a name are still told apart.
#[derive(Clone)]
pub struct FunctionId {
    id: u32,
    name: std::sync::Arc<str>,
}

impl FunctionId {
    /// Allocates a new, process-unique function identity.
    pub fn fresh(name: impl Into<String>) -> Self {
        let id = NEXT_FUNCTION_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id,
            name: name.into().into(),
        }
    }

    /// Returns the raw identity.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the human-readable name. Not used for identity.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Location of the given line inside this function.
    pub fn at(&self, line: u32) -> Location {
        Location::new(self.clone(), line)
    }
}

impl PartialEq for FunctionId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FunctionId {}

impl Hash for FunctionId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for FunctionId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FunctionId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// One executable statement: `(function, line)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    pub function: FunctionId,
    pub line: u32,
}

impl Location {
    pub fn new(function: FunctionId, line: u32) -> Self {
        Self { function, line }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.function, self.line)
    }
}

/// Ordered pair of consecutively executed locations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Arc {
    pub from: Location,
    pub to: Location,
}

impl Arc {
    pub fn new(from: Location, to: Location) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for Arc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_function_identity_ignores_name() {
        let f = FunctionId::fresh("f");
        let g = FunctionId::fresh("f");
        assert_eq!(f.name(), g.name());
        assert_ne!(f, g);
        assert_eq!(f, f.clone());
    }

    #[test]
    fn test_location_as_key() {
        let f = FunctionId::fresh("f");
        let mut seen = HashSet::new();
        seen.insert(f.at(3));
        seen.insert(f.at(3));
        seen.insert(f.at(4));
        assert_eq!(seen.len(), 2);
        assert_eq!(f.at(3).to_string(), "f:3");
    }

    #[test]
    fn test_arc_is_ordered() {
        let f = FunctionId::fresh("f");
        let forward = Arc::new(f.at(1), f.at(2));
        let backward = Arc::new(f.at(2), f.at(1));
        assert_ne!(forward, backward);
        assert_eq!(forward.to_string(), "f:1 -> f:2");
    }
}
