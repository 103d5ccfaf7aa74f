use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum BugwatchError {
    #[error("invalid schedule mode '{0}': must be 'manual' or 'automatic'")]
    InvalidScheduleMode(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
