//! HTTP load testing.
//!
//! A fixed pool of simulated users, each looping request → record → delay
//! against one URL through a shared `reqwest::Client`. Users are added on a
//! linear ramp; the run ends when the duration elapses or a [`StopHandle`]
//! fires. Every HTTP response counts as a success and is tallied by status
//! code; transport failures are tallied by kind.
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), scriptkit::KitError> {
//! use scriptkit::stress::{StressConfig, StressTest};
//!
//! let config = StressConfig::builder("https://staging.example.com/health")
//!     .users(50)
//!     .duration_secs(30)
//!     .ramp_up_secs(10)
//!     .build()?;
//! let report = StressTest::new(config).run(None).await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod report;
pub mod runner;

pub use config::{StressConfig, StressConfigBuilder};
pub use report::{Failure, Metrics, Outcome, StressReport, Tally, TestConfig};
pub use runner::{user_target, StopHandle, StressTest};
