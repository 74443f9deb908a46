//! Allowed origin hosts contributed by the application.

/// Ordered list of origin hosts, appended to the built-in allow-list when the
/// origin check is enabled.
///
/// Entries are stored exactly as given: no deduplication, no normalisation.
#[derive(Debug, Clone, Default)]
pub struct OriginRegistry {
    origins: Vec<String>,
}

impl OriginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an origin host.
    pub fn add_origin(&mut self, origin: impl Into<String>) {
        self.origins.push(origin.into());
    }

    /// Registered origins in insertion order.
    pub fn origins(&self) -> &[String] {
        &self.origins
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for OriginRegistry {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            origins: iter.into_iter().map(Into::into).collect(),
        }
    }
}
