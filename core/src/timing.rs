use crate::error::{IrTransError, Result};

/// One on-duration followed by one off-duration of the modulated IR line,
/// both in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulsePair {
    pub pulse_us: u32,
    pub pause_us: u32,
}

impl PulsePair {
    pub const fn new(pulse_us: u32, pause_us: u32) -> Self {
        Self { pulse_us, pause_us }
    }

    /// Parse a whitespace-separated sequence of microsecond durations into
    /// pulse/pause pairs. The sequence must contain an even number of values.
    pub fn parse_sequence(text: &str) -> Result<Vec<PulsePair>> {
        let mut values = Vec::new();
        for token in text.split_whitespace() {
            let value: u32 = token.parse().map_err(|_| {
                IrTransError::InvalidParameters(format!("invalid duration {token:?}"))
            })?;
            values.push(value);
        }
        if values.len() % 2 != 0 {
            return Err(IrTransError::InvalidParameters(
                "raw timing sequence must contain complete pulse/pause pairs".into(),
            ));
        }
        Ok(values
            .chunks(2)
            .map(|pair| PulsePair::new(pair[0], pair[1]))
            .collect())
    }
}

/// Per-protocol matching windows for the classifier.
///
/// `large_multiplier` widens the window for a bounded number of pairs per
/// frame; `max_large_hits` is that bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToleranceConfig {
    pub tolerance_us: u32,
    pub large_multiplier: u32,
    pub max_large_hits: u32,
}

impl ToleranceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tolerance_us == 0 {
            return Err(IrTransError::InvalidParameters(
                "tolerance must be greater than zero".into(),
            ));
        }
        if self.large_multiplier < 1 {
            return Err(IrTransError::InvalidParameters(
                "large tolerance multiplier must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn large_tolerance_us(&self) -> u32 {
        self.tolerance_us * self.large_multiplier
    }
}

/// Classification result for one pulse pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolMatch {
    /// Exactly one timing table entry matched.
    Symbol(u8),
    /// No entry matched at any allowed tier.
    Unrecognized,
    /// More than one entry matched: overlapping timing windows, a
    /// protocol misconfiguration.
    Ambiguous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedSymbol {
    pub matched: SymbolMatch,
    pub used_large_tolerance: bool,
}

/// Mapping from symbol id to its nominal pulse/pause pair.
///
/// Ids must be unique decimal digits (0-9) so that every symbol has a single
/// character representation in a code string.
#[derive(Debug, Clone)]
pub struct TimingTable {
    entries: Vec<(u8, PulsePair)>,
}

impl TimingTable {
    pub fn new(entries: Vec<(u8, PulsePair)>) -> Result<Self> {
        if entries.is_empty() {
            return Err(IrTransError::InvalidParameters(
                "timing table must contain at least one entry".into(),
            ));
        }
        for (i, (id, _)) in entries.iter().enumerate() {
            if *id > 9 {
                return Err(IrTransError::InvalidParameters(format!(
                    "symbol id {id} is not a decimal digit"
                )));
            }
            if entries[..i].iter().any(|(other, _)| other == id) {
                return Err(IrTransError::InvalidParameters(format!(
                    "duplicate symbol id {id}"
                )));
            }
        }
        Ok(Self { entries })
    }

    pub fn nominal(&self, id: u8) -> Option<PulsePair> {
        self.entries
            .iter()
            .find(|(entry_id, _)| *entry_id == id)
            .map(|(_, pair)| *pair)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Map one pulse pair to a protocol symbol.
    ///
    /// The tight window is `nominal ± tolerance` on both durations. When
    /// nothing matches tightly and `allow_large` is set, the test is repeated
    /// with the window widened by the large-tolerance multiplier.
    pub fn classify(
        &self,
        pair: PulsePair,
        tolerances: &ToleranceConfig,
        allow_large: bool,
    ) -> ClassifiedSymbol {
        let tight: Vec<u8> = self.matches_within(pair, tolerances.tolerance_us);
        match tight.len() {
            1 => {
                return ClassifiedSymbol {
                    matched: SymbolMatch::Symbol(tight[0]),
                    used_large_tolerance: false,
                }
            }
            0 => {}
            _ => {
                return ClassifiedSymbol {
                    matched: SymbolMatch::Ambiguous,
                    used_large_tolerance: false,
                }
            }
        }

        if !allow_large {
            return ClassifiedSymbol {
                matched: SymbolMatch::Unrecognized,
                used_large_tolerance: false,
            };
        }

        let wide = self.matches_within(pair, tolerances.large_tolerance_us());
        match wide.len() {
            0 => ClassifiedSymbol {
                matched: SymbolMatch::Unrecognized,
                used_large_tolerance: false,
            },
            1 => ClassifiedSymbol {
                matched: SymbolMatch::Symbol(wide[0]),
                used_large_tolerance: true,
            },
            _ => ClassifiedSymbol {
                matched: SymbolMatch::Ambiguous,
                used_large_tolerance: true,
            },
        }
    }

    fn matches_within(&self, pair: PulsePair, window_us: u32) -> Vec<u8> {
        self.entries
            .iter()
            .filter(|(_, nominal)| {
                in_window(pair.pulse_us, nominal.pulse_us, window_us)
                    && in_window(pair.pause_us, nominal.pause_us, window_us)
            })
            .map(|(id, _)| *id)
            .collect()
    }
}

fn in_window(value: u32, nominal: u32, window_us: u32) -> bool {
    value >= nominal.saturating_sub(window_us) && value <= nominal + window_us
}
