//! # IMU Source
//!
//! Reads the IMU line stream on a background thread and hands complete samples to the drive loop
//! over a bounded channel.
//!
//! A live IMU hands samples over best effort. If the drive loop falls behind and the channel is
//! full new samples are dropped rather than blocking the reader, so the loop always works on data
//! that is at most `capacity` samples old. A recording is replayed losslessly instead, the reader
//! waits for the loop so every recorded sample is processed.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, warn};
use std::io::BufRead;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};

use comms_if::eqpt::imu::{RawSample, SampleAssembler};
use util::session;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Handle to the acquisition thread.
pub struct ImuSource {
    handle: JoinHandle<SourceReport>,
}

/// Counters gathered by the acquisition thread over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceReport {
    /// Lines read from the stream
    pub num_lines: usize,

    /// Samples handed to the drive loop
    pub num_samples: usize,

    /// Lines rejected by the assembler
    pub num_parse_errors: usize,

    /// Complete samples dropped because the channel was full
    pub num_dropped: usize,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// How samples are handed to the drive loop when the channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Drop the new sample, for live streams
    BestEffort,

    /// Wait for space, for recordings
    Lossless,
}

#[derive(Debug, thiserror::Error)]
pub enum ImuSourceError {
    #[error("The sample queue capacity must be at least 1")]
    ZeroCapacity,
}

/// Outcome of handing one sample over.
enum Handover {
    Sent,
    Dropped,
    Disconnected,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ImuSource {
    /// Start reading samples from `reader`.
    ///
    /// Returns the handle to the thread and the receiving end of a channel holding at most
    /// `capacity` samples. The channel is closed when the stream ends or can no longer be read.
    pub fn spawn<R>(
        reader: R,
        capacity: usize,
        delivery: Delivery,
    ) -> Result<(Self, Receiver<RawSample>), ImuSourceError>
    where
        R: BufRead + Send + 'static,
    {
        if capacity == 0 {
            return Err(ImuSourceError::ZeroCapacity);
        }

        let (tx, rx) = sync_channel(capacity);

        let handle = thread::spawn(move || {
            let mut reader = reader;
            let mut asm = SampleAssembler::new();
            let mut report = SourceReport::default();
            let mut buf = Vec::new();

            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => {
                        info!("IMU stream ended");
                        break;
                    }
                    Ok(_) => (),
                    Err(e) => {
                        warn!("Could not read the IMU stream: {}", e);
                        break;
                    }
                }
                report.num_lines += 1;

                // Serial lines are sometimes cut mid-character, treat those as noise
                let line = match std::str::from_utf8(&buf) {
                    Ok(l) => l,
                    Err(_) => {
                        debug!("Non UTF-8 line in IMU stream dropped");
                        report.num_parse_errors += 1;
                        continue;
                    }
                };

                let sample = match asm.push_line(line, session::get_elapsed_seconds()) {
                    Ok(Some(s)) => s,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("Dropped IMU line: {}", e);
                        report.num_parse_errors += 1;
                        continue;
                    }
                };

                match hand_over(&tx, sample, delivery) {
                    Handover::Sent => report.num_samples += 1,
                    Handover::Dropped => {
                        warn!("Sample queue full, dropping sample");
                        report.num_dropped += 1;
                    }
                    Handover::Disconnected => {
                        info!("Drive loop stopped, IMU source exiting");
                        break;
                    }
                }
            }

            report
        });

        Ok((Self { handle }, rx))
    }

    /// Wait for the acquisition thread to finish, returning its report.
    ///
    /// Returns `None` if the thread panicked.
    pub fn join(self) -> Option<SourceReport> {
        self.handle.join().ok()
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn hand_over(tx: &SyncSender<RawSample>, sample: RawSample, delivery: Delivery) -> Handover {
    match delivery {
        Delivery::BestEffort => match tx.try_send(sample) {
            Ok(()) => Handover::Sent,
            Err(TrySendError::Full(_)) => Handover::Dropped,
            Err(TrySendError::Disconnected(_)) => Handover::Disconnected,
        },
        Delivery::Lossless => match tx.send(sample) {
            Ok(()) => Handover::Sent,
            Err(_) => Handover::Disconnected,
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn stream(num_samples: usize) -> String {
        let mut s = String::from("MPU6050 ready\n");
        for i in 0..num_samples {
            for (name, v) in ["AcX", "AcY", "AcZ", "GyX", "GyY", "GyZ"].iter().zip(0..) {
                s.push_str(&format!("data:{}\n{}\n", name, i * 10 + v));
            }
        }
        s
    }

    #[test]
    fn test_samples_in_order() {
        let (source, rx) =
            ImuSource::spawn(Cursor::new(stream(3)), 8, Delivery::BestEffort).unwrap();

        let samples: Vec<RawSample> = rx.iter().collect();
        let report = source.join().unwrap();

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].acc_raw, [0.0, 1.0, 2.0]);
        assert_eq!(samples[2].gyro_raw, [23.0, 24.0, 25.0]);
        assert_eq!(
            report,
            SourceReport {
                num_lines: 37,
                num_samples: 3,
                num_parse_errors: 0,
                num_dropped: 0,
            }
        );
    }

    #[test]
    fn test_full_queue_drops_samples() {
        let (source, rx) =
            ImuSource::spawn(Cursor::new(stream(5)), 2, Delivery::BestEffort).unwrap();

        // Nothing is received until the stream is exhausted
        let report = source.join().unwrap();
        let samples: Vec<RawSample> = rx.iter().collect();

        assert_eq!(report.num_samples, 2);
        assert_eq!(report.num_dropped, 3);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].acc_raw[0], 0.0);
        assert_eq!(samples[1].acc_raw[0], 10.0);
    }

    #[test]
    fn test_bad_lines_counted() {
        let mut data = b"data:AcX\nnot a number\n\xff\xfe\n".to_vec();
        data.extend_from_slice(stream(1).as_bytes());

        let (source, rx) = ImuSource::spawn(Cursor::new(data), 4, Delivery::BestEffort).unwrap();
        let samples: Vec<RawSample> = rx.iter().collect();
        let report = source.join().unwrap();

        assert_eq!(samples.len(), 1);
        assert_eq!(report.num_parse_errors, 2);
    }

    #[test]
    fn test_lossless_replay_keeps_every_sample() {
        let (source, rx) =
            ImuSource::spawn(Cursor::new(stream(20)), 1, Delivery::Lossless).unwrap();

        // Consume slowly so the reader is always ahead
        let mut samples = Vec::new();
        for s in rx.iter() {
            std::thread::sleep(std::time::Duration::from_millis(1));
            samples.push(s);
        }
        let report = source.join().unwrap();

        assert_eq!(samples.len(), 20);
        assert_eq!(report.num_dropped, 0);
        for (i, s) in samples.iter().enumerate() {
            assert_eq!(s.acc_raw[0], (i * 10) as f64);
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            ImuSource::spawn(Cursor::new(stream(1)), 0, Delivery::Lossless),
            Err(ImuSourceError::ZeroCapacity)
        ));
    }
}
