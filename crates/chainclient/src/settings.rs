//! # Client Settings
//!
//! Per-client configuration, built up with `with_*` calls.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::id::IdGenerator;
use crate::id::RandomIds;

/// How long a request waits for its response unless told otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct ClientSettings {
    timeout: Option<Duration>,
    ids: Arc<dyn IdGenerator>,
}

impl ClientSettings {
    pub fn new() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            ids: Arc::new(RandomIds),
        }
    }

    /// Requests that outlive `timeout` resolve with `channel_timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Requests wait for their response indefinitely.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Replaces the random id source, e.g. with [`SequenceIds`](crate::SequenceIds) in tests.
    pub fn with_ids(mut self, ids: impl IdGenerator) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn ids(&self) -> &dyn IdGenerator {
        self.ids.as_ref()
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSettings")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
