//! Session configuration and default pool sizes.
//!
//! # Usage
//!
//! ```rust
//! use tiledma::config::SessionConfig;
//!
//! let config = SessionConfig::new(8).with_engines(2, 4).with_threads(2);
//! assert_eq!(config.engines_per_context(), 2);
//! assert_eq!(config.fold_capacity(), 4);
//! ```

use crate::error::{Error, Result};

// =============================================================================
// Defaults
// =============================================================================

/// Default number of frames a session can track at once.
pub const DEFAULT_FRAME_CAPACITY: usize = 4;

/// Default number of hardware execution contexts.
pub const DEFAULT_HW_CONTEXTS: usize = 4;

/// Default number of transfer engines shared by all contexts.
pub const DEFAULT_TOTAL_ENGINES: usize = 8;

/// Default software thread hint.
pub const DEFAULT_THREADS: usize = 1;

// =============================================================================
// SessionConfig
// =============================================================================

/// Sizes of the pools owned by a session.
///
/// All pools are sized once at creation and never grow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum number of simultaneously registered frames (default: 4).
    pub frame_capacity: usize,
    /// Number of hardware contexts (default: 4).
    pub hw_contexts: usize,
    /// Engine budget shared equally between contexts (default: 8).
    /// Any remainder after the equal split is left unused.
    pub total_engines: usize,
    /// Software thread hint (default: 1).
    pub threads: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame_capacity: DEFAULT_FRAME_CAPACITY,
            hw_contexts: DEFAULT_HW_CONTEXTS,
            total_engines: DEFAULT_TOTAL_ENGINES,
            threads: DEFAULT_THREADS,
        }
    }
}

impl SessionConfig {
    /// Default pools with the given frame capacity.
    pub fn new(frame_capacity: usize) -> Self {
        Self {
            frame_capacity,
            ..Default::default()
        }
    }

    /// Set the hardware context count and engine budget.
    pub fn with_engines(mut self, hw_contexts: usize, total_engines: usize) -> Self {
        self.hw_contexts = hw_contexts;
        self.total_engines = total_engines;
        self
    }

    /// Set the software thread hint.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Engines given to each hardware context.
    pub fn engines_per_context(&self) -> usize {
        self.total_engines.checked_div(self.hw_contexts).unwrap_or(0)
    }

    /// Read engines per context: half the context's engines, rounded down.
    pub fn read_engines(&self) -> usize {
        self.engines_per_context() / 2
    }

    /// Write engines per context: whatever the read share leaves.
    pub fn write_engines(&self) -> usize {
        self.engines_per_context() - self.read_engines()
    }

    /// Number of fold-storage slots: one per distributed engine.
    pub fn fold_capacity(&self) -> usize {
        self.engines_per_context() * self.hw_contexts
    }

    /// Reject configurations that cannot back a session.
    pub fn validate(&self) -> Result<()> {
        if self.frame_capacity == 0 {
            return Err(Error::AllocationFailed(
                "frame capacity must be > 0".into(),
            ));
        }
        if self.hw_contexts == 0 {
            return Err(Error::AllocationFailed(
                "at least one hardware context is required".into(),
            ));
        }
        if self.engines_per_context() == 0 {
            return Err(Error::AllocationFailed(format!(
                "engine budget {} too small for {} hardware contexts",
                self.total_engines, self.hw_contexts
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_split() {
        let config = SessionConfig::default();
        assert_eq!(config.engines_per_context(), 2);
        assert_eq!(config.read_engines(), 1);
        assert_eq!(config.write_engines(), 1);
        assert_eq!(config.fold_capacity(), 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_odd_budget_favours_write() {
        let config = SessionConfig::new(4).with_engines(2, 6);
        assert_eq!(config.engines_per_context(), 3);
        assert_eq!(config.read_engines(), 1);
        assert_eq!(config.write_engines(), 2);
    }

    #[test]
    fn test_uneven_budget_drops_remainder() {
        let config = SessionConfig::new(4).with_engines(3, 8);
        assert_eq!(config.engines_per_context(), 2);
        assert_eq!(config.fold_capacity(), 6);
    }

    #[test]
    fn test_validate_rejects_empty_pools() {
        assert!(SessionConfig::new(0).validate().is_err());
        assert!(SessionConfig::new(4).with_engines(0, 8).validate().is_err());
        let err = SessionConfig::new(4).with_engines(4, 3).validate().unwrap_err();
        assert!(err.is_fatal());
    }
}
