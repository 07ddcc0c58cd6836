use crate::timing::{PulsePair, TimingTable, ToleranceConfig};

/// Frame layout constants and timing table for one remote-control protocol.
///
/// A codec is generic over this structure: new protocols are added as
/// configuration, not as new code paths.
#[derive(Debug, Clone)]
pub struct ProtocolSpec {
    pub name: String,
    pub timings: TimingTable,
    /// Expected header symbol string, compared verbatim.
    pub header: String,
    pub payload_len: usize,
    pub checksum_len: usize,
    /// Index of the first payload symbol that enters the checksum grouping.
    pub checksum_skip: usize,
    /// Sentinel pulse prepended on encode and stripped on decode.
    pub start_pulse: Option<PulsePair>,
    /// Sentinel pulse appended on encode.
    pub end_pulse: Option<PulsePair>,
    pub tolerances: ToleranceConfig,
}

impl ProtocolSpec {
    /// Total symbol count of a complete frame.
    pub fn frame_len(&self) -> usize {
        self.header.len() + self.payload_len + self.checksum_len
    }
}

pub const DAIKIN_HEADER: &str =
    "210001000010110111110010000001111000000000000000000000000010000003";
pub const DAIKIN_PAYLOAD_LEN: usize = 145;
pub const DAIKIN_CHECKSUM_LEN: usize = 8;
pub const DAIKIN_START_PULSE: PulsePair = PulsePair::new(2, 10_000);
pub const DAIKIN_END_PULSE: PulsePair = PulsePair::new(416, 40_000);

pub const DAIKIN_TOLERANCE_US: u32 = 150;
pub const DAIKIN_LARGE_MULTIPLIER: u32 = 2;
pub const DAIKIN_MAX_LARGE_HITS: u32 = 10;

impl ProtocolSpec {
    /// The Daikin PAC protocol: four symbols, a 66-symbol header, a
    /// 145-symbol payload whose checksum grouping skips the leading framing
    /// bit (145 = 1 + 18 groups of 8), and an 8-symbol checksum.
    pub fn daikin() -> Self {
        let timings = TimingTable::new(vec![
            (0, PulsePair::new(440, 448)),
            (1, PulsePair::new(440, 1288)),
            (2, PulsePair::new(3448, 1720)),
            (3, PulsePair::new(408, 29_616)),
        ])
        .expect("static Daikin timing table is well formed");
        Self {
            name: "DAIKIN".to_string(),
            timings,
            header: DAIKIN_HEADER.to_string(),
            payload_len: DAIKIN_PAYLOAD_LEN,
            checksum_len: DAIKIN_CHECKSUM_LEN,
            checksum_skip: 1,
            start_pulse: Some(DAIKIN_START_PULSE),
            end_pulse: None,
            tolerances: ToleranceConfig {
                tolerance_us: DAIKIN_TOLERANCE_US,
                large_multiplier: DAIKIN_LARGE_MULTIPLIER,
                max_large_hits: DAIKIN_MAX_LARGE_HITS,
            },
        }
    }
}
