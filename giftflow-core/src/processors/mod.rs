//! Background processors.
//!
//! - `PendingSweeper`: polls and expires long-pending donations

pub mod pending_sweeper;

pub use pending_sweeper::{PendingSweeper, SweepError, SweepReport, SweepTick, SweeperConfig};
