pub mod clock;
pub mod config;
pub mod error;
pub mod liveness;
pub mod schedule;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::*;
pub use liveness::ServiceState;
pub use schedule::ScheduleMode;
