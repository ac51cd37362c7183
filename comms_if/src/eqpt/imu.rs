//! # IMU Equipment Interface
//!
//! The IMU board streams its readings as text over a serial line. Each reading is sent as two
//! lines, a header naming the channel and a line holding the value:
//!
//! ```text
//! data:AcX
//! -312
//! data:AcY
//! 48
//! ```
//!
//! The six channels are `AcX`, `AcY`, `AcZ` (acceleration) and `GyX`, `GyY`, `GyZ` (angular rate),
//! all in raw sensor units. The [`SampleAssembler`] collects these lines into complete
//! [`RawSample`]s.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Marker which starts a channel header line.
pub const HEADER_MARKER: &str = "data:";

/// Number of channels making up one sample.
pub const NUM_CHANNELS: usize = 6;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One 6-axis inertial sample in raw sensor units.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct RawSample {
    /// Time at which the sample was completed, in seconds since the start of the session.
    pub timestamp_s: f64,

    /// Acceleration along X, Y and Z.
    ///
    /// Units: raw sensor units
    pub acc_raw: [f64; 3],

    /// Angular rate about X, Y and Z.
    ///
    /// Units: raw sensor units
    pub gyro_raw: [f64; 3],
}

/// Assembles [`RawSample`]s from the IMU's line protocol.
#[derive(Debug, Default, Clone)]
pub struct SampleAssembler {
    /// Channel named by the last header, waiting for its value line.
    pending: Option<Channel>,

    /// Values received since the last complete sample.
    values: [Option<f64>; NUM_CHANNELS],
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A channel of the IMU stream.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    AcX,
    AcY,
    AcZ,
    GyX,
    GyY,
    GyZ,
}

/// Errors which can occur while parsing the IMU stream.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("Malformed header line: {0:?}")]
    MalformedHeader(String),

    #[error("Unknown channel name: {0:?}")]
    UnknownChannel(String),

    #[error("Expected a value for {0} but got another header")]
    MissingValue(Channel),

    #[error("Could not parse value {value:?} for channel {channel}")]
    InvalidValue { channel: Channel, value: String },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Channel {
    /// Index of the channel within a sample's value array.
    pub fn index(&self) -> usize {
        match self {
            Channel::AcX => 0,
            Channel::AcY => 1,
            Channel::AcZ => 2,
            Channel::GyX => 3,
            Channel::GyY => 4,
            Channel::GyZ => 5,
        }
    }
}

impl FromStr for Channel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AcX" => Ok(Channel::AcX),
            "AcY" => Ok(Channel::AcY),
            "AcZ" => Ok(Channel::AcZ),
            "GyX" => Ok(Channel::GyX),
            "GyY" => Ok(Channel::GyY),
            "GyZ" => Ok(Channel::GyZ),
            _ => Err(ParseError::UnknownChannel(s.into())),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl SampleAssembler {
    /// Create a new, empty, assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line of the stream into the assembler.
    ///
    /// Returns `Ok(Some(sample))` when the line completes a sample, i.e. all six channels have
    /// been received since the previous sample. Lines which are neither a header nor an expected
    /// value (e.g. board debug output) are ignored.
    ///
    /// On error the offending line is dropped. A header that arrives while a value is still
    /// expected replaces the pending header, and the error reports the channel whose value was
    /// lost. Values already collected are kept.
    pub fn push_line(
        &mut self,
        line: &str,
        timestamp_s: f64,
    ) -> Result<Option<RawSample>, ParseError> {
        let line = line.trim();

        if line.contains(HEADER_MARKER) {
            let channel = parse_header(line);

            // A header replaces any pending one, even if it is itself invalid
            let lost = self.pending.take();
            self.pending = Some(channel?);

            return match lost {
                Some(c) => Err(ParseError::MissingValue(c)),
                None => Ok(None),
            };
        }

        let channel = match self.pending.take() {
            Some(c) => c,
            None => return Ok(None),
        };

        let value = line
            .parse::<f64>()
            .map_err(|_| ParseError::InvalidValue {
                channel,
                value: line.into(),
            })?;

        self.values[channel.index()] = Some(value);

        Ok(self.take_sample(timestamp_s))
    }

    /// Number of channels received towards the next sample.
    pub fn num_received(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// If all channels have been received build the sample and reset.
    fn take_sample(&mut self, timestamp_s: f64) -> Option<RawSample> {
        let mut values = [0f64; NUM_CHANNELS];
        for (i, v) in self.values.iter().enumerate() {
            values[i] = (*v)?;
        }

        self.values = [None; NUM_CHANNELS];

        Some(RawSample {
            timestamp_s,
            acc_raw: [values[0], values[1], values[2]],
            gyro_raw: [values[3], values[4], values[5]],
        })
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Extract the channel from a header line of the form `data:<name>`.
fn parse_header(line: &str) -> Result<Channel, ParseError> {
    let mut parts = line.split(':');

    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(name), None) if !name.trim().is_empty() => name.trim().parse(),
        _ => Err(ParseError::MalformedHeader(line.into())),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn feed(asm: &mut SampleAssembler, lines: &[&str]) -> Vec<Result<Option<RawSample>, ParseError>> {
        lines.iter().map(|l| asm.push_line(l, 1.25)).collect()
    }

    #[test]
    fn test_assemble_full_sample() {
        let mut asm = SampleAssembler::new();

        let results = feed(
            &mut asm,
            &[
                "data:AcX", "-312", "data:AcY", "48", "data:AcZ", "16384",
                "data:GyX", "-5", "data:GyY", "3.5", "data:GyZ\r\n", "12\r\n",
            ],
        );

        // Only the last value completes the sample
        for r in &results[..results.len() - 1] {
            assert_eq!(*r, Ok(None));
        }
        assert_eq!(
            results[results.len() - 1],
            Ok(Some(RawSample {
                timestamp_s: 1.25,
                acc_raw: [-312.0, 48.0, 16384.0],
                gyro_raw: [-5.0, 3.5, 12.0],
            }))
        );
        assert_eq!(asm.num_received(), 0);
    }

    #[test]
    fn test_ignores_noise_lines() {
        let mut asm = SampleAssembler::new();

        assert_eq!(asm.push_line("MPU6050 ready", 0.0), Ok(None));
        assert_eq!(asm.push_line("", 0.0), Ok(None));
        assert_eq!(asm.num_received(), 0);
    }

    #[test]
    fn test_malformed_lines_are_dropped() {
        let mut asm = SampleAssembler::new();

        assert_eq!(
            asm.push_line("data:AcX:extra", 0.0),
            Err(ParseError::MalformedHeader("data:AcX:extra".into()))
        );
        assert_eq!(
            asm.push_line("data:Temp", 0.0),
            Err(ParseError::UnknownChannel("Temp".into()))
        );

        // Unparsable value loses only that reading
        asm.push_line("data:AcX", 0.0).unwrap();
        assert_eq!(
            asm.push_line("12a", 0.0),
            Err(ParseError::InvalidValue {
                channel: Channel::AcX,
                value: "12a".into()
            })
        );
        assert_eq!(asm.num_received(), 0);

        // Header without value
        asm.push_line("data:AcY", 0.0).unwrap();
        assert_eq!(
            asm.push_line("data:AcZ", 0.0),
            Err(ParseError::MissingValue(Channel::AcY))
        );
        assert_eq!(asm.push_line("1", 0.0), Ok(None));
        assert_eq!(asm.num_received(), 1);
    }
}
