use thiserror::Error;

/// Queue errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Queue is full ({capacity} items)")]
    QueueFull { capacity: usize },
}
