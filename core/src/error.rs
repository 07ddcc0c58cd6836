use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrTransError {
    #[error("symbol {0:?} has no timing table entry")]
    InvalidSymbol(char),

    #[error("frame header does not match the protocol header")]
    HeaderMismatch,

    #[error("frame payload contains unclassified symbols")]
    PayloadError,

    #[error("frame checksum mismatch")]
    ChecksumError,

    #[error("too many pairs matched only in large tolerance")]
    DegradedSignal,

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("hardware driver failure: {0}")]
    Hardware(String),

    #[error("emitter did not confirm reception in time")]
    AckTimeout,

    #[error("acknowledgment edge with no pending operation")]
    AckUnsolicited,

    #[error("no encoder registered under {0:?}")]
    NoEncoderRegistered(String),

    #[error("no registered encoder matched the captured frame")]
    NoEncoderMatched,
}

pub type Result<T> = std::result::Result<T, IrTransError>;
