use std::collections::HashSet;

/// Set of folder names compared without regard to case.
///
/// Windows servers see `@CF` and `@cf` as the same folder, so membership is
/// checked on a lowercased key regardless of the host file system.
#[derive(Debug, Clone, Default)]
pub struct CaseInsensitiveSet {
    inner: HashSet<String>,
}

impl CaseInsensitiveSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    fn key(value: &str) -> String {
        value.to_lowercase()
    }

    /// Returns `true` if the value was not present yet.
    pub fn insert(&mut self, value: &str) -> bool {
        self.inner.insert(Self::key(value))
    }

    /// Membership check, ignoring case.
    pub fn contains(&self, value: &str) -> bool {
        self.inner.contains(&Self::key(value))
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if no names were recorded.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for CaseInsensitiveSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for value in iter {
            set.insert(value.as_ref());
        }
        set
    }
}
