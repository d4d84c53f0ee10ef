//! Parser configuration.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default limit on multipart nesting.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Source of unique ids for attachments that declare no filename.
pub trait IdSource: Send + Sync + fmt::Debug {
    /// Returns an id not returned before by this source.
    fn next_id(&self) -> u64;
}

/// Wall-clock ids: nanoseconds since the Unix epoch.
///
/// Ids are strictly increasing per instance, even when the clock stalls or
/// steps backwards.
#[derive(Debug, Default)]
pub struct ClockIds {
    last: AtomicU64,
}

impl IdSource for ClockIds {
    fn next_id(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| {
                u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
            });

        let bump = |prev: u64| now.max(prev.saturating_add(1));
        let prev = self
            .last
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |prev| Some(bump(prev)))
            .unwrap_or_else(|prev| prev);
        bump(prev)
    }
}

/// Counter ids, for reproducible output.
#[derive(Debug)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    /// Creates a counter whose first id is `first`.
    #[must_use]
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdSource for SequentialIds {
    fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Parser configuration.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Maximum multipart nesting depth. The top-level multipart body is
    /// depth 1.
    pub max_depth: usize,
    /// Ids for fallback attachment names (`attachment-<id>`).
    pub ids: Arc<dyn IdSource>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            ids: Arc::new(ClockIds::default()),
        }
    }
}

impl ParserConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> ParserConfigBuilder {
        ParserConfigBuilder::default()
    }

    /// Name used for an attachment without a filename.
    #[must_use]
    pub fn fallback_filename(&self) -> String {
        format!("attachment-{}", self.ids.next_id())
    }
}

/// Builder for [`ParserConfig`].
#[derive(Debug, Clone, Default)]
pub struct ParserConfigBuilder {
    config: ParserConfig,
}

impl ParserConfigBuilder {
    /// Sets the maximum multipart nesting depth.
    #[must_use]
    pub const fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    /// Sets the id source for fallback attachment names.
    #[must_use]
    pub fn ids(mut self, ids: impl IdSource + 'static) -> Self {
        self.config.ids = Arc::new(ids);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ParserConfig {
        self.config
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ParserConfig::new();
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
        assert!(config.fallback_filename().starts_with("attachment-"));
    }

    #[test]
    fn test_config_builder() {
        let config = ParserConfig::builder()
            .max_depth(3)
            .ids(SequentialIds::starting_at(7))
            .build();

        assert_eq!(config.max_depth, 3);
        assert_eq!(config.fallback_filename(), "attachment-7");
        assert_eq!(config.fallback_filename(), "attachment-8");
    }

    #[test]
    fn test_clones_share_ids() {
        let config = ParserConfig::builder().ids(SequentialIds::default()).build();
        let copy = config.clone();
        assert_eq!(config.ids.next_id(), 1);
        assert_eq!(copy.ids.next_id(), 2);
    }

    #[test]
    fn test_clock_ids_strictly_increase() {
        let ids = ClockIds::default();
        let mut prev = ids.next_id();
        for _ in 0..1000 {
            let next = ids.next_id();
            assert!(next > prev);
            prev = next;
        }
    }
}
