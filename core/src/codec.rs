use log::{debug, warn};
use parking_lot::RwLock;

use crate::checksum;
use crate::error::{IrTransError, Result};
use crate::protocol::ProtocolSpec;
use crate::timing::{PulsePair, SymbolMatch, ToleranceConfig};
use crate::SENTINEL_SYMBOL;

/// Result of one decode attempt.
///
/// Decoding is best-effort: `symbols` always carries what was seen, and the
/// header/payload/checksum slices are filled as far as the captured length
/// allows, so operators can inspect a frame even when validation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// The classified symbol string. On a structurally valid frame this is
    /// the reconstructed `header + payload + checksum` with trailing noise
    /// symbols trimmed.
    pub symbols: String,
    pub header: String,
    pub payload: String,
    pub checksum: String,
    pub error: Option<IrTransError>,
}

impl DecodedFrame {
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }

    pub(crate) fn failed(symbols: String, error: IrTransError) -> Self {
        Self {
            symbols,
            header: String::new(),
            payload: String::new(),
            checksum: String::new(),
            error: Some(error),
        }
    }
}

/// A decoded frame attributed to the encoder that recognized it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifiedFrame {
    pub encoder: String,
    pub frame: DecodedFrame,
}

/// Codec for one protocol: symbol string to raw timing and back.
///
/// Owns the protocol's timing table and its mutable tolerance configuration.
/// Tolerances are swapped as a whole; a decode snapshots the configuration
/// once at entry and never observes a partial update.
pub struct FrameCodec {
    spec: ProtocolSpec,
    tolerances: RwLock<ToleranceConfig>,
}

impl FrameCodec {
    pub fn new(spec: ProtocolSpec) -> Result<Self> {
        spec.tolerances.validate()?;
        let tolerances = RwLock::new(spec.tolerances);
        Ok(Self { spec, tolerances })
    }

    pub fn tolerances(&self) -> ToleranceConfig {
        *self.tolerances.read()
    }

    /// Replace the active tolerance configuration. The prior configuration
    /// stays in effect when validation fails.
    pub fn set_tolerances(&self, config: ToleranceConfig) -> Result<()> {
        config.validate()?;
        *self.tolerances.write() = config;
        Ok(())
    }

    /// Expand a symbol string into its raw pulse sequence, with the start
    /// and end sentinels the protocol configures.
    pub fn encode(&self, code: &str) -> Result<Vec<PulsePair>> {
        let mut pairs = Vec::with_capacity(code.len() + 2);
        for symbol in code.chars() {
            let id = symbol
                .to_digit(10)
                .ok_or(IrTransError::InvalidSymbol(symbol))?;
            let nominal = self
                .spec
                .timings
                .nominal(id as u8)
                .ok_or(IrTransError::InvalidSymbol(symbol))?;
            pairs.push(nominal);
        }
        if let Some(start) = self.spec.start_pulse {
            pairs.insert(0, start);
        }
        if let Some(end) = self.spec.end_pulse {
            pairs.push(end);
        }
        Ok(pairs)
    }

    /// Classify a raw pulse sequence and validate it as one frame.
    pub fn decode(&self, pairs: &[PulsePair]) -> DecodedFrame {
        let tolerances = self.tolerances();
        let mut pairs = pairs;

        if let (Some(start), Some(first)) = (self.spec.start_pulse, pairs.first()) {
            // The start sentinel is a short spike followed by a long quiet
            // gap, so only the pulse is bounded above and the pause below.
            if first.pulse_us <= start.pulse_us + tolerances.tolerance_us
                && first.pause_us >= start.pause_us.saturating_sub(tolerances.tolerance_us)
            {
                debug!("start sentinel detected, dropping leading pair");
                pairs = &pairs[1..];
            }
        }

        let mut symbols = String::with_capacity(pairs.len());
        let mut large_hits: u32 = 0;
        let mut allow_large = true;
        let mut degraded = false;
        for pair in pairs {
            let classified = self.spec.timings.classify(*pair, &tolerances, allow_large);
            match classified.matched {
                SymbolMatch::Symbol(id) => symbols.push(symbol_char(id)),
                SymbolMatch::Unrecognized | SymbolMatch::Ambiguous => {
                    symbols.push(SENTINEL_SYMBOL)
                }
            }
            if classified.used_large_tolerance {
                large_hits += 1;
                debug!(
                    "pair {}us/{}us matched only in large tolerance ({large_hits} so far)",
                    pair.pulse_us, pair.pause_us
                );
                if large_hits > tolerances.max_large_hits {
                    warn!(
                        "large tolerance budget of {} exhausted, signal degraded",
                        tolerances.max_large_hits
                    );
                    degraded = true;
                    allow_large = false;
                }
            }
        }

        self.validate_frame(symbols, degraded)
    }

    fn validate_frame(&self, symbols: String, degraded: bool) -> DecodedFrame {
        let header_len = self.spec.header.len();
        let header: String = symbols.chars().take(header_len).collect();
        let payload: String = symbols
            .chars()
            .skip(header_len)
            .take(self.spec.payload_len)
            .collect();
        let checksum: String = symbols
            .chars()
            .skip(header_len + self.spec.payload_len)
            .take(self.spec.checksum_len)
            .collect();

        let error = if header != self.spec.header {
            Some(IrTransError::HeaderMismatch)
        } else if payload.contains(SENTINEL_SYMBOL) {
            Some(IrTransError::PayloadError)
        } else if !checksum::validate(&payload, &checksum, self.spec.checksum_skip) {
            Some(IrTransError::ChecksumError)
        } else if degraded {
            Some(IrTransError::DegradedSignal)
        } else {
            None
        };

        // A structurally valid frame is reported in its canonical trimmed
        // form even when the large-tolerance budget was exceeded.
        let symbols = match error {
            None | Some(IrTransError::DegradedSignal) => {
                format!("{header}{payload}{checksum}")
            }
            Some(_) => symbols,
        };

        DecodedFrame {
            symbols,
            header,
            payload,
            checksum,
            error,
        }
    }
}

fn symbol_char(id: u8) -> char {
    char::from_digit(id as u32, 10).unwrap_or(SENTINEL_SYMBOL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum;
    use crate::protocol::ProtocolSpec;

    fn codec() -> FrameCodec {
        FrameCodec::new(ProtocolSpec::daikin()).unwrap()
    }

    /// A structurally valid Daikin code with the given payload.
    fn daikin_code(payload: &str) -> String {
        assert_eq!(payload.len(), 145);
        let checksum = checksum::derive(payload, 1).unwrap();
        format!("{}{payload}{checksum}", ProtocolSpec::daikin().header)
    }

    #[test]
    fn test_encode_prepends_start_sentinel() {
        let codec = codec();
        let pairs = codec.encode("012").unwrap();
        assert_eq!(pairs.len(), 4);
        assert_eq!(pairs[0], PulsePair::new(2, 10_000));
        assert_eq!(pairs[1], PulsePair::new(440, 448));
        assert_eq!(pairs[2], PulsePair::new(440, 1288));
        assert_eq!(pairs[3], PulsePair::new(3448, 1720));
    }

    #[test]
    fn test_encode_appends_end_sentinel_when_configured() {
        let mut spec = ProtocolSpec::daikin();
        spec.end_pulse = Some(crate::protocol::DAIKIN_END_PULSE);
        let codec = FrameCodec::new(spec).unwrap();
        let pairs = codec.encode("01").unwrap();
        assert_eq!(pairs.len(), 4);
        assert_eq!(*pairs.last().unwrap(), PulsePair::new(416, 40_000));
    }

    #[test]
    fn test_encode_rejects_unknown_symbol() {
        let codec = codec();
        assert_eq!(
            codec.encode("01A2"),
            Err(IrTransError::InvalidSymbol('A'))
        );
        assert_eq!(codec.encode("0192"), Err(IrTransError::InvalidSymbol('9')));
    }

    #[test]
    fn test_round_trip_all_zero_payload() {
        let codec = codec();
        let code = daikin_code(&"0".repeat(145));
        let pairs = codec.encode(&code).unwrap();
        let decoded = codec.decode(&pairs);
        assert!(decoded.is_clean(), "error: {:?}", decoded.error);
        assert_eq!(decoded.symbols, code);
    }

    #[test]
    fn test_round_trip_patterned_payload() {
        let codec = codec();
        let payload = format!("1{}", "01100100".repeat(18));
        let code = daikin_code(&payload);
        let pairs = codec.encode(&code).unwrap();
        let decoded = codec.decode(&pairs);
        assert!(decoded.is_clean(), "error: {:?}", decoded.error);
        assert_eq!(decoded.symbols, code);
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn test_decode_without_start_sentinel() {
        let codec = codec();
        let code = daikin_code(&"0".repeat(145));
        let mut pairs = codec.encode(&code).unwrap();
        pairs.remove(0);
        let decoded = codec.decode(&pairs);
        assert!(decoded.is_clean());
        assert_eq!(decoded.symbols, code);
    }

    #[test]
    fn test_decode_trims_trailing_noise() {
        let codec = codec();
        let code = daikin_code(&"0".repeat(145));
        let mut pairs = codec.encode(&code).unwrap();
        pairs.push(PulsePair::new(440, 448));
        pairs.push(PulsePair::new(440, 1288));
        let decoded = codec.decode(&pairs);
        assert!(decoded.is_clean());
        assert_eq!(decoded.symbols.len(), 219);
    }

    #[test]
    fn test_header_mismatch() {
        let codec = codec();
        let code = daikin_code(&"0".repeat(145));
        // flip one header symbol from 1 to 0
        let mut tampered: Vec<char> = code.chars().collect();
        tampered[1] = '0';
        let tampered: String = tampered.into_iter().collect();
        let pairs = codec.encode(&tampered).unwrap();
        let decoded = codec.decode(&pairs);
        assert_eq!(decoded.error, Some(IrTransError::HeaderMismatch));
        // the attempted symbol string is still reported
        assert_eq!(decoded.symbols.len(), 219);
    }

    #[test]
    fn test_short_capture_is_header_mismatch() {
        let codec = codec();
        let decoded = codec.decode(&[PulsePair::new(440, 448); 10]);
        assert_eq!(decoded.error, Some(IrTransError::HeaderMismatch));
        let empty = codec.decode(&[]);
        assert_eq!(empty.error, Some(IrTransError::HeaderMismatch));
    }

    #[test]
    fn test_payload_error_on_unclassifiable_pair() {
        let codec = codec();
        let code = daikin_code(&"0".repeat(145));
        let mut pairs = codec.encode(&code).unwrap();
        // corrupt one payload pair beyond even the large window
        pairs[70] = PulsePair::new(5000, 5000);
        let decoded = codec.decode(&pairs);
        assert_eq!(decoded.error, Some(IrTransError::PayloadError));
        assert!(decoded.payload.contains(SENTINEL_SYMBOL));
    }

    #[test]
    fn test_checksum_error() {
        let codec = codec();
        let payload = "0".repeat(145);
        let code = format!("{}{payload}{}", ProtocolSpec::daikin().header, "10000000");
        let pairs = codec.encode(&code).unwrap();
        let decoded = codec.decode(&pairs);
        assert_eq!(decoded.error, Some(IrTransError::ChecksumError));
    }

    #[test]
    fn test_degraded_signal_after_large_budget() {
        let codec = codec();
        let code = daikin_code(&"0".repeat(145));
        let mut pairs = codec.encode(&code).unwrap();
        // push 11 payload pairs outside tight tolerance but within large
        for pair in pairs.iter_mut().skip(67).take(11) {
            pair.pause_us += 250;
        }
        let decoded = codec.decode(&pairs);
        assert_eq!(decoded.error, Some(IrTransError::DegradedSignal));
        // frame is otherwise structurally valid and reported trimmed
        assert_eq!(decoded.symbols.len(), 219);
    }

    #[test]
    fn test_large_tolerance_disabled_after_budget() {
        let codec = codec();
        let code = daikin_code(&"0".repeat(145));
        let mut pairs = codec.encode(&code).unwrap();
        // 11 large-tolerance pairs exhaust the budget of 10, then one more
        // pair that would only match in the large window must become a
        // sentinel and fail the payload
        for pair in pairs.iter_mut().skip(67).take(11) {
            pair.pause_us += 250;
        }
        pairs[90].pause_us += 250;
        let decoded = codec.decode(&pairs);
        assert_eq!(decoded.error, Some(IrTransError::PayloadError));
    }

    #[test]
    fn test_within_tolerance_jitter_round_trip() {
        use rand::Rng;

        let codec = codec();
        let payload = format!("0{}", "10101010".repeat(18));
        let code = daikin_code(&payload);
        let mut rng = rand::thread_rng();
        let mut pairs = codec.encode(&code).unwrap();
        for pair in pairs.iter_mut().skip(1) {
            let delta = rng.gen_range(-140i64..=140);
            pair.pulse_us = (pair.pulse_us as i64 + delta).max(0) as u32;
            let delta = rng.gen_range(-140i64..=140);
            pair.pause_us = (pair.pause_us as i64 + delta).max(0) as u32;
        }
        let decoded = codec.decode(&pairs);
        assert!(decoded.is_clean(), "error: {:?}", decoded.error);
        assert_eq!(decoded.symbols, code);
    }

    #[test]
    fn test_set_tolerances_rejects_invalid_and_keeps_prior() {
        let codec = codec();
        let before = codec.tolerances();
        let result = codec.set_tolerances(ToleranceConfig {
            tolerance_us: 0,
            large_multiplier: 2,
            max_large_hits: 10,
        });
        assert!(matches!(result, Err(IrTransError::InvalidParameters(_))));
        assert_eq!(codec.tolerances(), before);
    }

    #[test]
    fn test_set_tolerances_applies() {
        let codec = codec();
        let config = ToleranceConfig {
            tolerance_us: 200,
            large_multiplier: 3,
            max_large_hits: 5,
        };
        codec.set_tolerances(config).unwrap();
        assert_eq!(codec.tolerances(), config);
    }
}
