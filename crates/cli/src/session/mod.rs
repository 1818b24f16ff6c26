//! Bridge session orchestration module.

mod orchestrator;

use std::time::Duration;

use observability::TickSummary;

pub use orchestrator::BridgeSession;

/// Result of a finished session
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub summary: TickSummary,

    /// Set when a fatal step ended the session
    pub fatal: Option<String>,

    pub duration: Duration,

    /// Traffic-light groups written to the landmark file
    pub landmark_groups: usize,
}

impl SessionOutcome {
    /// Steps per second of wall time
    pub fn steps_per_second(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.summary.total_ticks as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn print_summary(&self) {
        println!();
        print!("{}", self.summary);
        println!("Duration: {:.2}s", self.duration.as_secs_f64());
        println!("Steps per second: {:.2}", self.steps_per_second());
        println!("Landmark groups: {}", self.landmark_groups);
        if let Some(ref reason) = self.fatal {
            println!("Stopped by fatal error: {}", reason);
        }
    }
}
