//! Infrared remote-control transceiver library
//!
//! Converts raw pulse/pause timing captured from (or emitted on) a modulated
//! IR line to and from symbolic protocol codes, and correlates every
//! emission/reception with the out-of-band hardware acknowledgment line.

pub mod ack;
pub mod checksum;
pub mod codec;
pub mod error;
pub mod protocol;
pub mod store;
pub mod timing;
pub mod transceiver;

pub use ack::{AckCorrelator, AckKind, AckOutcome, AckResolution, AckWindows};
pub use codec::{DecodedFrame, FrameCodec, IdentifiedFrame};
pub use error::{IrTransError, Result};
pub use protocol::ProtocolSpec;
pub use store::{LastKnownCode, MemStore};
pub use timing::{ClassifiedSymbol, PulsePair, SymbolMatch, TimingTable, ToleranceConfig};
pub use transceiver::{
    Broadcast, DataType, DriverEvent, PulseDriver, SendReport, StateReport, Transceiver,
};

/// Character substituted for pulse pairs that classify as unrecognized or
/// ambiguous while assembling a symbol string.
pub const SENTINEL_SYMBOL: char = 'E';

/// Width of one checksum group in payload symbols.
pub const CHECKSUM_GROUP_BITS: usize = 8;
