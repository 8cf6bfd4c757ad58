use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Bus closed")]
    Closed,

    #[error("Subscribe to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
}
