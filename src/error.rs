use thiserror::Error;

pub type TimelineResult<T> = Result<T, TimelineError>;

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
