// Quality bitmask decoding
//
// The status mask travels as a decimal string because the upper bits do not
// survive a round trip through a double. All arithmetic here stays in u64.
use super::error::DecodeError;
use serde::Serialize;

pub const OUT_OF_SERVICE: u64 = 1 << 0;
pub const IN_ALARM: u64 = 1 << 1;
pub const IN_FAILURE: u64 = 1 << 2;
pub const IN_OVERRIDDEN: u64 = 1 << 3;
pub const REDUCED: u64 = 1 << 8;
pub const START_LOGGING: u64 = 1 << 9;
pub const LOG_STATE: u64 = 1 << 10;
pub const BUFFER_PURGED: u64 = 1 << 11;
pub const OVERFLOW: u64 = 1 << 12;
pub const ERROR_IN_LOG: u64 = 1 << 13;
pub const BUFFER_FULL: u64 = 1 << 14;
pub const TIME_SHIFTED: u64 = 1 << 16;
pub const LOG_INTERRUPTED: u64 = 1 << 17;
pub const DRIVER_FAILED: u64 = 1 << 18;

pub const NO_VALUE_TIME_SHIFTED: u64 = 1 << 54;
pub const NO_VALUE_LOG_INTERRUPTED: u64 = 1 << 55;
pub const NO_VALUE_DRIVER_FAILED: u64 = 1 << 56;
pub const NO_VALUE_BUFFER_PURGED: u64 = 1 << 57;
pub const NO_VALUE_OVERFLOW: u64 = 1 << 58;
pub const NO_VALUE_OTHER: u64 = 1 << 59;
/// Any of these bits means the sample carries no displayable value.
pub const NO_VALUE_MASK: u64 = 0x3F << 54;

/// Three-bit field holding the manual correction kind.
pub const MANUAL_CORRECTION_FIELD: u64 = 0b111 << 60;
pub const MANUAL_CORRECTION_ADD: u64 = 1 << 60;
pub const MANUAL_CORRECTION_MODIFY: u64 = 2 << 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QualityFlag {
    OutOfService,
    InAlarm,
    InFailure,
    InOverridden,
    Reduced,
    StartLogging,
    LogEnabled,
    LogDisabled,
    BufferPurged,
    Overflow,
    ErrorInLog,
    BufferFull,
    TimeShifted,
    LogInterrupted,
    DriverFailed,
    NoValueTimeShifted,
    NoValueLogInterrupted,
    NoValueDriverFailed,
    NoValueBufferPurged,
    NoValueOverflow,
    NoValueOther,
    ManualCorrectionAdd,
    ManualCorrectionModify,
    Unknown,
}

/// Display bands, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SeverityBand {
    HighSeverity,
    TimeShift,
    MediumSeverity,
    AlwaysShow,
    NoShow,
}

impl QualityFlag {
    pub fn band(self) -> SeverityBand {
        use QualityFlag::*;
        match self {
            DriverFailed | LogInterrupted | BufferFull | ErrorInLog | Overflow | BufferPurged => {
                SeverityBand::HighSeverity
            }
            TimeShifted => SeverityBand::TimeShift,
            OutOfService | InAlarm | InFailure | InOverridden => SeverityBand::MediumSeverity,
            ManualCorrectionAdd | ManualCorrectionModify | LogDisabled => SeverityBand::AlwaysShow,
            Reduced | StartLogging | LogEnabled | NoValueTimeShifted | NoValueLogInterrupted
            | NoValueDriverFailed | NoValueBufferPurged | NoValueOverflow | NoValueOther
            | Unknown => SeverityBand::NoShow,
        }
    }

    /// Bit contributed to the aggregate quality code.
    pub fn code(self) -> u64 {
        use QualityFlag::*;
        match self {
            OutOfService => OUT_OF_SERVICE,
            InAlarm => IN_ALARM,
            InFailure => IN_FAILURE,
            InOverridden => IN_OVERRIDDEN,
            Reduced => REDUCED,
            StartLogging => START_LOGGING,
            LogEnabled | LogDisabled => LOG_STATE,
            BufferPurged => BUFFER_PURGED,
            Overflow => OVERFLOW,
            ErrorInLog => ERROR_IN_LOG,
            BufferFull => BUFFER_FULL,
            TimeShifted => TIME_SHIFTED,
            LogInterrupted => LOG_INTERRUPTED,
            DriverFailed => DRIVER_FAILED,
            NoValueTimeShifted => NO_VALUE_TIME_SHIFTED,
            NoValueLogInterrupted => NO_VALUE_LOG_INTERRUPTED,
            NoValueDriverFailed => NO_VALUE_DRIVER_FAILED,
            NoValueBufferPurged => NO_VALUE_BUFFER_PURGED,
            NoValueOverflow => NO_VALUE_OVERFLOW,
            NoValueOther | Unknown => NO_VALUE_OTHER,
            ManualCorrectionAdd => MANUAL_CORRECTION_ADD,
            ManualCorrectionModify => MANUAL_CORRECTION_MODIFY,
        }
    }

    /// Flags that always get a missing-data region on the chart.
    pub fn always_annotate(self) -> bool {
        use QualityFlag::*;
        matches!(
            self,
            LogInterrupted | BufferFull | InOverridden | InFailure | OutOfService | InAlarm | DriverFailed
        )
    }
}

enum Test {
    AnyBit(u64),
    FieldEquals { field: u64, expected: u64 },
    LogState,
}

const DECODE_TABLE: &[(Test, QualityFlag)] = &[
    (Test::AnyBit(OUT_OF_SERVICE), QualityFlag::OutOfService),
    (Test::AnyBit(IN_ALARM), QualityFlag::InAlarm),
    (Test::AnyBit(IN_FAILURE), QualityFlag::InFailure),
    (Test::AnyBit(IN_OVERRIDDEN), QualityFlag::InOverridden),
    (Test::AnyBit(REDUCED), QualityFlag::Reduced),
    (Test::AnyBit(START_LOGGING), QualityFlag::StartLogging),
    (Test::LogState, QualityFlag::LogEnabled),
    (Test::AnyBit(BUFFER_PURGED), QualityFlag::BufferPurged),
    (Test::AnyBit(OVERFLOW), QualityFlag::Overflow),
    (Test::AnyBit(ERROR_IN_LOG), QualityFlag::ErrorInLog),
    (Test::AnyBit(BUFFER_FULL), QualityFlag::BufferFull),
    (Test::AnyBit(TIME_SHIFTED), QualityFlag::TimeShifted),
    (Test::AnyBit(LOG_INTERRUPTED), QualityFlag::LogInterrupted),
    (Test::AnyBit(DRIVER_FAILED), QualityFlag::DriverFailed),
    (Test::AnyBit(NO_VALUE_TIME_SHIFTED), QualityFlag::NoValueTimeShifted),
    (Test::AnyBit(NO_VALUE_LOG_INTERRUPTED), QualityFlag::NoValueLogInterrupted),
    (Test::AnyBit(NO_VALUE_DRIVER_FAILED), QualityFlag::NoValueDriverFailed),
    (Test::AnyBit(NO_VALUE_BUFFER_PURGED), QualityFlag::NoValueBufferPurged),
    (Test::AnyBit(NO_VALUE_OVERFLOW), QualityFlag::NoValueOverflow),
    (Test::AnyBit(NO_VALUE_OTHER), QualityFlag::NoValueOther),
    (
        Test::FieldEquals { field: MANUAL_CORRECTION_FIELD, expected: MANUAL_CORRECTION_ADD },
        QualityFlag::ManualCorrectionAdd,
    ),
    (
        Test::FieldEquals { field: MANUAL_CORRECTION_FIELD, expected: MANUAL_CORRECTION_MODIFY },
        QualityFlag::ManualCorrectionModify,
    ),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedQuality {
    /// Every matched flag, ordered by band and then by decode-table order.
    pub flags: Vec<QualityFlag>,
    pub code: u64,
}

impl DecodedQuality {
    pub fn good() -> Self {
        Self { flags: Vec::new(), code: 0 }
    }

    /// Stand-in for a sample whose mask could not be parsed: no value, no visible flags.
    pub fn unknown() -> Self {
        Self {
            flags: vec![QualityFlag::Unknown],
            code: QualityFlag::Unknown.code(),
        }
    }

    pub fn has(&self, flag: QualityFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn has_no_value(&self) -> bool {
        self.code & NO_VALUE_MASK != 0
    }

    pub fn is_unknown(&self) -> bool {
        self.has(QualityFlag::Unknown)
    }

    pub fn manual_correction(&self) -> Option<QualityFlag> {
        self.flags
            .iter()
            .copied()
            .find(|f| matches!(f, QualityFlag::ManualCorrectionAdd | QualityFlag::ManualCorrectionModify))
    }

    /// Flags shown to the user: the most severe populated band among
    /// HighSeverity, TimeShift and MediumSeverity, followed by AlwaysShow.
    pub fn surfaced(&self) -> Vec<QualityFlag> {
        let leading = [
            SeverityBand::HighSeverity,
            SeverityBand::TimeShift,
            SeverityBand::MediumSeverity,
        ]
        .into_iter()
        .find(|band| self.flags.iter().any(|f| f.band() == *band));

        self.flags
            .iter()
            .copied()
            .filter(|f| Some(f.band()) == leading || f.band() == SeverityBand::AlwaysShow)
            .collect()
    }
}

/// Decode a decimal quality mask. `value` only decides LogEnabled vs LogDisabled.
pub fn decode(raw: &str, value: f64) -> Result<DecodedQuality, DecodeError> {
    let mask = parse_mask(raw)?;
    Ok(decode_mask(mask, value))
}

pub fn parse_mask(raw: &str) -> Result<u64, DecodeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::MalformedMask(raw.to_string()));
    }
    trimmed
        .parse::<u64>()
        .map_err(|_| DecodeError::MalformedMask(raw.to_string()))
}

pub fn decode_mask(mask: u64, value: f64) -> DecodedQuality {
    let mut flags = Vec::new();
    let mut code = 0u64;

    for (test, flag) in DECODE_TABLE {
        let matched = match test {
            Test::AnyBit(bits) => mask & bits != 0,
            Test::FieldEquals { field, expected } => mask & field == *expected,
            Test::LogState => mask & LOG_STATE != 0,
        };
        if !matched {
            continue;
        }
        let flag = match flag {
            QualityFlag::LogEnabled if value == 0.0 => QualityFlag::LogDisabled,
            other => *other,
        };
        flags.push(flag);
        code |= flag.code();
    }

    // stable: table order is kept inside each band
    flags.sort_by_key(|f| f.band());
    DecodedQuality { flags, code }
}
