//! Controller Error Types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Topic already exists: {0}")]
    TopicAlreadyExists(String),

    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
