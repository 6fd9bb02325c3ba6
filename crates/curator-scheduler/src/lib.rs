//! `curator-scheduler`: recurrence engine and tick loop.
//!
//! # Overview
//!
//! Job configurations are registered into an in-memory entry registry keyed by
//! job id. The [`engine::SchedulerEngine`] ticks at a fixed interval, fires
//! every entry whose trigger instant has elapsed, hands the fired job to the
//! worker channel, and recomputes the entry's next occurrence from its fixed
//! anchor, or drops the entry once the rule is exhausted. The registry is
//! rebuilt from the configuration store at startup, so nothing here persists.
//!
//! # Recurrence rules
//!
//! | Rule                     | Behaviour                                            |
//! |--------------------------|------------------------------------------------------|
//! | `at`                     | Single fire at an absolute UTC instant               |
//! | `repeat` second/min/hour | Fixed-length stepping from the registration anchor   |
//! | `repeat` day/week        | Fixed-length, or calendar-based when a wall-clock    |
//! |                          | time or weekday target is set                        |
//! | `repeat` month           | Calendar stepping with day-of-month clamping         |
//!
//! Wall-clock targets are evaluated in the configured timezone at computation
//! time, so occurrences track DST instead of drifting.

pub mod engine;
pub mod error;
pub mod recurrence;
pub mod types;

pub use engine::{SchedulerEngine, SchedulerHandle, FIRED_CHANNEL_CAPACITY};
pub use error::{Result, SchedulerError};
pub use recurrence::{first_occurrence, next_occurrence, validate};
pub use types::{FiredJob, SchedulePlan, ScheduledEntry};
