use std::time::{Duration, Instant};

use tracing::info;

/// Wall-clock timer for one pipeline stage.
#[derive(Debug, Clone)]
pub struct OpTimer {
    label: String,
    started: Instant,
}

impl OpTimer {
    pub fn start(label: impl Into<String>) -> Self {
        Self { label: label.into(), started: Instant::now() }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Log the elapsed time and return it.
    pub fn finish(self) -> Duration {
        let elapsed = self.elapsed();
        info!("{} took {:.3}s", self.label, elapsed.as_secs_f64());
        elapsed
    }
}
