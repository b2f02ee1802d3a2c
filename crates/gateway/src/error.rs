use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("bind address {addr} is not loopback and no TLS certificate is configured")]
    NonLoopbackRequiresTls { addr: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Tls(#[from] rustls::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
