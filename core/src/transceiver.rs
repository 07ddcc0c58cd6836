//! Transmit/receive orchestration over a pulse-line driver.
//!
//! The driver delivers captures and ack edges asynchronously; they are fed
//! into [`Transceiver::handle_event`] on one logical processing sequence.
//! A transmit blocks its caller until the acknowledgment correlator
//! resolves it, bounded by the absolute timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::ack::{AckCorrelator, AckKind, AckOutcome, AckResolution, AckWindows};
use crate::codec::{DecodedFrame, FrameCodec, IdentifiedFrame};
use crate::error::{IrTransError, Result};
use crate::store::{LastKnownCode, MemStore};
use crate::timing::{PulsePair, ToleranceConfig};

/// The hardware pulse-line boundary.
///
/// `emit` drives the modulated output line and returns the echoed pulse
/// sequence it observed; failures are fatal to that operation only.
pub trait PulseDriver: Send + Sync {
    fn emit(&self, pairs: &[PulsePair]) -> Result<Vec<PulsePair>>;

    /// Raw acknowledgment line level; `None` when the hardware has no
    /// state capability.
    fn ack_level(&self) -> Option<bool>;
}

/// Asynchronous input from the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// A captured raw pulse sequence.
    Capture(Vec<PulsePair>),
    /// An edge on the acknowledgment line, stamped where it was observed.
    AckEdge(Instant),
}

/// Message for connected clients, produced by event handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Broadcast {
    /// A confirmed reception.
    CodeReceived(LastKnownCode),
    /// An unrecognized reception, reported as the raw hardware state.
    HardState { level: bool },
}

/// Encoding of the `code` field of a send request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Raw,
    BinTimings,
    Hex,
}

impl DataType {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "RAW" => Some(Self::Raw),
            "BinTimings" => Some(Self::BinTimings),
            "HEX" => Some(Self::Hex),
            _ => None,
        }
    }
}

/// Outcome of a send operation, best-effort: `code` reports what was seen
/// on the line even when the operation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub encoder: String,
    pub code: String,
    pub error: Option<IrTransError>,
}

impl SendReport {
    fn failed(code: String, error: IrTransError) -> Self {
        Self {
            encoder: String::new(),
            code,
            error: Some(error),
        }
    }
}

/// Raw acknowledgment line report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateReport {
    /// `None` when the driver has no state capability.
    pub level: Option<bool>,
}

/// Registry of protocol codecs plus the shared correlator state.
pub struct Transceiver<D: PulseDriver> {
    driver: D,
    encoders: HashMap<String, FrameCodec>,
    correlator: AckCorrelator,
    /// Set while a transmit is emitting; captures arriving then are the
    /// echo of our own transmission and must not be processed as inbound.
    emitting: AtomicBool,
    mem: Mutex<Option<LastKnownCode>>,
    store: Option<MemStore>,
}

impl<D: PulseDriver> Transceiver<D> {
    pub fn new(driver: D) -> Self {
        Self::with_windows(driver, AckWindows::default())
    }

    pub fn with_windows(driver: D, windows: AckWindows) -> Self {
        Self {
            driver,
            encoders: HashMap::new(),
            correlator: AckCorrelator::new(windows),
            emitting: AtomicBool::new(false),
            mem: Mutex::new(None),
            store: None,
        }
    }

    /// Register a codec under its encoder name. Registration happens before
    /// the transceiver starts serving.
    pub fn register_encoder(&mut self, name: impl Into<String>, codec: FrameCodec) {
        self.encoders.insert(name.into(), codec);
    }

    /// Attach persistent storage and load any previously confirmed code.
    pub fn set_store(&mut self, store: MemStore) {
        let record = store.load();
        if !record.is_empty() {
            info!("restored last known code for {}", record.encoder);
            *self.mem.lock() = Some(record);
        }
        self.store = Some(store);
    }

    /// Send one IR code and block until the acknowledgment resolves.
    pub fn send_ir_code(&self, encoder: &str, datatype: DataType, code: &str) -> SendReport {
        match datatype {
            DataType::BinTimings => {
                let Some(codec) = self.encoders.get(encoder) else {
                    warn!("send with unregistered encoder {encoder:?}");
                    return SendReport::failed(
                        code.to_string(),
                        IrTransError::NoEncoderRegistered(encoder.to_string()),
                    );
                };
                match codec.encode(code) {
                    Ok(pairs) => self.transmit(&pairs),
                    Err(err) => SendReport::failed(code.to_string(), err),
                }
            }
            DataType::Raw => match PulsePair::parse_sequence(code) {
                Ok(pairs) => self.transmit(&pairs),
                Err(err) => SendReport::failed(code.to_string(), err),
            },
            DataType::Hex => SendReport::failed(
                code.to_string(),
                IrTransError::InvalidParameters("HEX codes are not supported".into()),
            ),
        }
    }

    fn transmit(&self, pairs: &[PulsePair]) -> SendReport {
        let generation = self.correlator.begin_transmit(Instant::now());

        // Receive capture is suspended for the emission's duration: the
        // echoed pulses come back through emit() and must not also be
        // processed as an inbound capture.
        self.emitting.store(true, Ordering::SeqCst);
        let echoed = self.driver.emit(pairs);
        self.emitting.store(false, Ordering::SeqCst);

        let echoed = match echoed {
            Ok(echoed) => echoed,
            Err(err) => {
                warn!("hardware emit failed: {err}");
                return SendReport::failed(String::new(), err);
            }
        };
        info!("emitted {} pairs, decoding echo", pairs.len());

        let identified = self.identify(&echoed);
        let outcome = self.correlator.wait(generation);
        match outcome {
            AckOutcome::Confirmed => match identified {
                Ok(identified) => {
                    self.record_confirmed(LastKnownCode::confirmed(
                        identified.frame.symbols.clone(),
                        identified.encoder.clone(),
                    ));
                    SendReport {
                        encoder: identified.encoder,
                        code: identified.frame.symbols,
                        error: identified.frame.error,
                    }
                }
                Err(frame) => SendReport::failed(
                    frame.symbols,
                    frame.error.unwrap_or(IrTransError::NoEncoderMatched),
                ),
            },
            AckOutcome::Late | AckOutcome::TimedOut | AckOutcome::Superseded => {
                let code = match identified {
                    Ok(identified) => identified.frame.symbols,
                    Err(frame) => frame.symbols,
                };
                SendReport::failed(code, IrTransError::AckTimeout)
            }
        }
    }

    /// Decode a raw sequence against every registered encoder. The first
    /// clean decode wins; otherwise the best-effort frame of the last
    /// attempt is returned.
    fn identify(&self, pairs: &[PulsePair]) -> std::result::Result<IdentifiedFrame, DecodedFrame> {
        if self.encoders.is_empty() {
            return Err(DecodedFrame::failed(
                String::new(),
                IrTransError::NoEncoderRegistered(String::new()),
            ));
        }
        let mut last: Option<DecodedFrame> = None;
        for (name, codec) in &self.encoders {
            let frame = codec.decode(pairs);
            if frame.is_clean() {
                info!("code identified as {name}");
                return Ok(IdentifiedFrame {
                    encoder: name.clone(),
                    frame,
                });
            }
            debug!("{name} rejected capture: {:?}", frame.error);
            last = Some(frame);
        }
        let mut frame = last.unwrap_or_else(|| {
            DecodedFrame::failed(String::new(), IrTransError::NoEncoderMatched)
        });
        frame.error = Some(IrTransError::NoEncoderMatched);
        Err(frame)
    }

    /// Process one asynchronous driver event.
    pub fn handle_event(&self, event: DriverEvent) -> Option<Broadcast> {
        match event {
            DriverEvent::Capture(pairs) => self.handle_capture(&pairs),
            DriverEvent::AckEdge(now) => self.handle_ack_edge(now),
        }
    }

    fn handle_capture(&self, pairs: &[PulsePair]) -> Option<Broadcast> {
        if self.emitting.load(Ordering::SeqCst) {
            debug!("capture during emission dropped (own transmission echo)");
            return None;
        }
        info!("decoding captured frame of {} pairs", pairs.len());
        match self.identify(pairs) {
            Ok(identified) => {
                // Confirmation decides later whether this becomes the last
                // known code; the decoded frame rides in the pending slot.
                self.correlator.begin_receive(Instant::now(), identified);
                None
            }
            Err(frame) => {
                warn!("capture not recognized: {:?}", frame.error);
                self.driver
                    .ack_level()
                    .map(|level| Broadcast::HardState { level })
            }
        }
    }

    fn handle_ack_edge(&self, now: Instant) -> Option<Broadcast> {
        let resolution = self.correlator.on_ack_edge(now)?;
        match resolution {
            AckResolution {
                kind: AckKind::Receive,
                outcome: AckOutcome::Confirmed,
                frame: Some(identified),
            } => {
                let record = LastKnownCode::confirmed(
                    identified.frame.symbols,
                    identified.encoder,
                );
                self.record_confirmed(record.clone());
                Some(Broadcast::CodeReceived(record))
            }
            // Transmit confirmations are applied by the blocked sender;
            // late or timed-out outcomes never touch persisted state.
            _ => None,
        }
    }

    /// Abandon a pending operation older than the absolute timeout.
    pub fn poll_timeout(&self, now: Instant) -> Option<AckResolution> {
        self.correlator.poll_timeout(now)
    }

    fn record_confirmed(&self, record: LastKnownCode) {
        info!("confirmed code recorded for {}", record.encoder);
        if let Some(store) = &self.store {
            store.save(&record);
        }
        *self.mem.lock() = Some(record);
    }

    /// The last confirmed code, or the "unknown status" placeholder when
    /// nothing has been confirmed yet.
    pub fn mem_ir_code(&self) -> LastKnownCode {
        self.mem.lock().clone().unwrap_or(LastKnownCode {
            code: String::new(),
            encoder: String::new(),
            error: "Unknown status".to_string(),
        })
    }

    pub fn set_tolerances(&self, encoder: &str, config: ToleranceConfig) -> Result<()> {
        let codec = self
            .encoders
            .get(encoder)
            .ok_or_else(|| IrTransError::NoEncoderRegistered(encoder.to_string()))?;
        codec.set_tolerances(config)
    }

    pub fn get_tolerances(&self, encoder: &str) -> Result<ToleranceConfig> {
        let codec = self
            .encoders
            .get(encoder)
            .ok_or_else(|| IrTransError::NoEncoderRegistered(encoder.to_string()))?;
        Ok(codec.tolerances())
    }

    pub fn state(&self) -> StateReport {
        StateReport {
            level: self.driver.ack_level(),
        }
    }
}
