//! File transfer building blocks: multipart encoding, body staging, per-file
//! task state and the runtime seam that performs the actual upload.

mod multipart;
mod progress;
mod runtime;
mod staging;
mod task;

use coursework_protocol::{ErrorKind, RecordedError};

pub use multipart::{MULTIPART_BOUNDARY, encode_multipart_body, multipart_content_type};
pub use progress::{RateMeter, combine_progress};
pub use runtime::{
    TransferEvent, TransferEventReceiver, TransferEventSender, TransferRequest, TransferRuntime,
    transfer_channel,
};
pub use staging::{StagedBody, calculate_file_checksum, checksum_bytes};
pub use task::{TaskId, TransferTask};

/// Errors produced while preparing or performing a file transfer.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("request encoding error: {0}")]
    RequestEncoding(String),

    #[error("multipart encoding error: {0}")]
    Encoding(String),

    #[error("remote error {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decoding error: {0}")]
    Decoding(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RequestEncoding(_) | Self::Encoding(_) => ErrorKind::RequestEncoding,
            Self::Remote { .. } => ErrorKind::Remote,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Decoding(_) => ErrorKind::Decoding,
            Self::Io(_) => ErrorKind::Storage,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// The persistable form of this error.
    pub fn to_recorded(&self) -> RecordedError {
        RecordedError::new(self.kind(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            TransferError::Encoding("x".into()).kind(),
            ErrorKind::RequestEncoding
        );
        assert_eq!(
            TransferError::Remote {
                status: 500,
                body: String::new()
            }
            .kind(),
            ErrorKind::Remote
        );
        assert_eq!(
            TransferError::Io(std::io::Error::other("disk")).kind(),
            ErrorKind::Storage
        );
    }

    #[test]
    fn recorded_keeps_message() {
        let recorded = TransferError::Transport("connection reset".into()).to_recorded();
        assert_eq!(recorded.kind, ErrorKind::Transport);
        assert_eq!(recorded.message, "transport error: connection reset");
    }
}
