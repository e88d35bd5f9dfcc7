use derive_more::{Display, Error};

#[derive(Debug, Error, Display)]
pub enum StreamError {
    #[display("Invalid device configuration: {reason}")]
    Configuration { reason: String },

    #[display("Authentication failed: {reason}")]
    Authentication { reason: String },

    #[display("Camera is not conformant: {reason}")]
    NonConformant { reason: String },

    #[display("HTTP error: {_0}")]
    Http(reqwest_middleware::Error),

    #[display("I/O error: {_0}")]
    Io(std::io::Error),

    #[display("Protocol error: {reason}")]
    Protocol { reason: String },

    #[display("Event queue closed")]
    QueueClosed,
}

impl StreamError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        StreamError::Configuration { reason: reason.into() }
    }

    pub fn authentication(reason: impl Into<String>) -> Self {
        StreamError::Authentication { reason: reason.into() }
    }

    pub fn non_conformant(reason: impl Into<String>) -> Self {
        StreamError::NonConformant { reason: reason.into() }
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        StreamError::Protocol { reason: reason.into() }
    }

    /// A permanent error ends the device's supervision loop, anything else triggers a reconnect.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            StreamError::Configuration { .. }
                | StreamError::Authentication { .. }
                | StreamError::NonConformant { .. }
                | StreamError::QueueClosed
        )
    }
}

impl From<reqwest_middleware::Error> for StreamError {
    fn from(value: reqwest_middleware::Error) -> Self {
        StreamError::Http(value)
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(value: reqwest::Error) -> Self {
        StreamError::Http(reqwest_middleware::Error::Reqwest(value))
    }
}

impl From<std::io::Error> for StreamError {
    fn from(value: std::io::Error) -> Self {
        StreamError::Io(value)
    }
}
