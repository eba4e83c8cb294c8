//! Command-line interface definitions

use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use crate::deadlock::ScenarioConfig;
use crate::demo::{PoolDemoConfig, RwLockDemoConfig};

/// Semaphore, resource pool, reader-writer lock and deadlock demonstrations
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Which demonstration to run
    ///
    /// `all` runs the resolved deadlock scenario, the pool and the
    /// reader-writer lock. `deadlock` runs the opposed lock order, which
    /// hangs until the watchdog gives up; it is never part of `all`.
    #[arg(long, value_enum, default_value = "all")]
    pub scenario: Scenario,

    /// Resource pool capacity (maximum concurrent accessors)
    #[arg(long, default_value = "3")]
    pub capacity: usize,

    /// Workers competing for the resource pool
    #[arg(long, default_value = "10")]
    pub workers: usize,

    /// Concurrent readers in the reader-writer demonstration
    #[arg(long, default_value = "5")]
    pub readers: usize,

    /// Delay before the writer asks for the lock, in milliseconds
    #[arg(long, default_value = "50")]
    pub writer_delay_ms: u64,

    /// How long the writer holds the lock, in milliseconds
    #[arg(long, default_value = "300")]
    pub write_hold_ms: u64,

    /// Shortest simulated work duration, in milliseconds
    #[arg(long, default_value = "100")]
    pub hold_min_ms: u64,

    /// Longest simulated work duration, in milliseconds
    #[arg(long, default_value = "300")]
    pub hold_max_ms: u64,

    /// Wall-clock limit for the deadlock scenarios, in seconds
    #[arg(long, default_value = "2")]
    pub watchdog_secs: u64,

    /// Run the deadlock scenarios on OS threads instead of compio tasks
    #[arg(long)]
    pub threads: bool,

    /// Seed for the simulated work durations (random if omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Show progress information
    #[arg(long)]
    pub progress: bool,

    /// Verbose output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress all output except errors)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Demonstration selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Scenario {
    /// Resolved deadlock scenario, resource pool, and reader-writer lock
    All,
    /// Resource pool only
    Pool,
    /// Reader-writer lock only
    Rwlock,
    /// Dual-lock scenario with a consistent lock order
    DeadlockResolved,
    /// Dual-lock scenario with opposed lock orders (hangs until the watchdog fires)
    Deadlock,
}

impl Scenario {
    /// Whether the resolved dual-lock scenario is part of this selection
    #[must_use]
    pub const fn runs_resolved_deadlock(self) -> bool {
        matches!(self, Self::All | Self::DeadlockResolved)
    }

    /// Whether the resource pool demonstration is part of this selection
    #[must_use]
    pub const fn runs_pool(self) -> bool {
        matches!(self, Self::All | Self::Pool)
    }

    /// Whether the reader-writer demonstration is part of this selection
    #[must_use]
    pub const fn runs_rwlock(self) -> bool {
        matches!(self, Self::All | Self::Rwlock)
    }
}

impl Args {
    /// Validate command-line arguments
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - Capacity is 0
    /// - Workers or readers is 0
    /// - The minimum work duration exceeds the maximum
    /// - The watchdog limit is 0
    /// - Both --quiet and --verbose options are used
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            anyhow::bail!("Capacity must be at least 1, got: {}", self.capacity);
        }

        if self.workers == 0 {
            anyhow::bail!("Workers must be at least 1, got: {}", self.workers);
        }

        if self.readers == 0 {
            anyhow::bail!("Readers must be at least 1, got: {}", self.readers);
        }

        if self.hold_min_ms > self.hold_max_ms {
            anyhow::bail!(
                "Minimum hold ({} ms) exceeds maximum hold ({} ms)",
                self.hold_min_ms,
                self.hold_max_ms
            );
        }

        if self.watchdog_secs == 0 {
            anyhow::bail!("Watchdog limit must be at least 1 second");
        }

        if self.quiet && self.verbose > 0 {
            anyhow::bail!("Cannot use both --quiet and --verbose options");
        }

        Ok(())
    }

    /// Watchdog limit as a duration
    #[must_use]
    pub const fn watchdog(&self) -> Duration {
        Duration::from_secs(self.watchdog_secs)
    }

    /// Settings for the resource pool demonstration
    #[must_use]
    pub const fn pool_config(&self) -> PoolDemoConfig {
        PoolDemoConfig {
            capacity: self.capacity,
            workers: self.workers,
            hold_min: Duration::from_millis(self.hold_min_ms),
            hold_max: Duration::from_millis(self.hold_max_ms),
            seed: self.seed,
            progress: self.progress && !self.quiet,
        }
    }

    /// Settings for the reader-writer demonstration
    #[must_use]
    pub const fn rwlock_config(&self) -> RwLockDemoConfig {
        RwLockDemoConfig {
            readers: self.readers,
            writer_delay: Duration::from_millis(self.writer_delay_ms),
            read_min: Duration::from_millis(self.hold_min_ms),
            read_max: Duration::from_millis(self.hold_max_ms),
            write_hold: Duration::from_millis(self.write_hold_ms),
            seed: self.seed,
        }
    }

    /// Settings for the dual-lock scenarios
    #[must_use]
    pub fn scenario_config(&self) -> ScenarioConfig {
        ScenarioConfig {
            seed: self.seed,
            ..ScenarioConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("synckit").chain(extra.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_validate() {
        let args = parse(&[]);
        assert_eq!(args.scenario, Scenario::All);
        assert_eq!(args.capacity, 3);
        assert_eq!(args.workers, 10);
        assert_eq!(args.readers, 5);
        args.validate().unwrap();
    }

    #[test]
    fn test_scenario_selection() {
        assert!(Scenario::All.runs_pool());
        assert!(Scenario::All.runs_rwlock());
        assert!(Scenario::All.runs_resolved_deadlock());
        assert!(!Scenario::Deadlock.runs_resolved_deadlock());
        assert!(!Scenario::Deadlock.runs_pool());

        let args = parse(&["--scenario", "deadlock-resolved"]);
        assert_eq!(args.scenario, Scenario::DeadlockResolved);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let args = parse(&["--capacity", "0"]);
        let err = args.validate().unwrap_err();
        assert!(err.to_string().contains("Capacity"));
    }

    #[test]
    fn test_inverted_hold_range_rejected() {
        let args = parse(&["--hold-min-ms", "500", "--hold-max-ms", "100"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_quiet_and_verbose_conflict() {
        let args = parse(&["-q", "-v"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_config_conversion() {
        let args = parse(&["--capacity", "4", "--seed", "9", "--writer-delay-ms", "10"]);
        let pool = args.pool_config();
        assert_eq!(pool.capacity, 4);
        assert_eq!(pool.seed, Some(9));

        let rwlock = args.rwlock_config();
        assert_eq!(rwlock.writer_delay, Duration::from_millis(10));

        let scenario = args.scenario_config();
        assert_eq!(scenario.workers, 2);
        assert_eq!(scenario.seed, Some(9));
    }
}
