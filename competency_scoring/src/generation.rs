//! Tagging of asynchronous fetches, so that only the result of the latest one is shown.

use log::debug;

/// The tag of a fetch. Tags increase with every fetch started.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Ord, PartialOrd, Hash)]
pub struct Generation(u64);

/// The value produced by the most recent fetch.
#[derive(Debug, Clone)]
pub struct Latest<T> {
    issued: u64,
    applied: Option<(Generation, T)>,
}

impl<T> Default for Latest<T> {
    fn default() -> Self {
        Latest::new()
    }
}

impl<T> Latest<T> {
    pub fn new() -> Latest<T> {
        Latest {
            issued: 0,
            applied: None,
        }
    }

    /// Starts a new fetch. Any fetch started before becomes stale.
    pub fn begin(&mut self) -> Generation {
        self.issued += 1;
        Generation(self.issued)
    }

    /// Applies the result of a fetch, unless a newer fetch was started in the meantime.
    pub fn complete(&mut self, generation: Generation, value: T) -> bool {
        if generation.0 != self.issued {
            debug!(
                "Latest: dropping result of fetch {} (latest is {})",
                generation.0, self.issued
            );
            return false;
        }
        self.applied = Some((generation, value));
        true
    }

    pub fn current(&self) -> Option<&T> {
        self.applied.as_ref().map(|(_, v)| v)
    }

    pub fn current_generation(&self) -> Option<Generation> {
        self.applied.as_ref().map(|(g, _)| *g)
    }

    pub fn is_pending(&self) -> bool {
        self.current_generation().map(|g| g.0) != Some(self.issued) && self.issued > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_results_are_dropped() {
        let mut latest: Latest<&str> = Latest::new();
        let first = latest.begin();
        let second = latest.begin();
        assert!(latest.is_pending());
        assert!(latest.complete(second, "6m"));
        assert!(!latest.complete(first, "3m"));
        assert_eq!(latest.current(), Some(&"6m"));
        assert_eq!(latest.current_generation(), Some(second));
        assert!(!latest.is_pending());
    }

    #[test]
    fn a_new_fetch_keeps_the_previous_value() {
        let mut latest: Latest<u32> = Latest::default();
        assert_eq!(latest.current(), None);
        assert!(!latest.is_pending());
        let g = latest.begin();
        assert!(latest.complete(g, 1));
        let h = latest.begin();
        assert!(h > g);
        assert_eq!(latest.current(), Some(&1));
        assert!(latest.is_pending());
    }
}
