//! # Drive loop
//!
//! The drive loop owns the estimator, heading controller and mixer and runs them once per IMU
//! sample, in that order. Nothing outside the loop holds any of their state.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, trace, warn};
use serde::Serialize;
use std::io::Write;
use std::sync::mpsc::Receiver;
use std::time::Instant;

// Internal
use crate::{
    att_est::{AttEst, AttEstError, AttitudeEstimate},
    diff_drive::{self, DiffDrive, WheelCommand},
    head_ctrl::{self, DriveState, HeadCtrl},
    platform_client::{CommandSink, SinkError},
};
use comms_if::eqpt::{imu::RawSample, platform::PlatformCmd};
use util::{
    archive::{self, ArchiveError, Archived, Archiver},
    module::State,
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The drive loop
pub struct DriveLoop {
    att_est: AttEst,
    head_ctrl: HeadCtrl,
    diff_drive: DiffDrive,

    last_estimate: Option<AttitudeEstimate>,
    last_record: Option<DriveRecord>,

    archives: Option<Archives>,
}

/// Archive record of one attitude estimate, with the orientations as quaternions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AttEstRecord {
    pub timestamp_s: f64,
    pub roll_rad: f64,
    pub pitch_rad: f64,
    pub yaw_rad: f64,
    pub acc_roll_rad: f64,
    pub acc_pitch_rad: f64,
    pub gyro_roll_rad: f64,
    pub gyro_pitch_rad: f64,
    pub force_magnitude_g: f64,
    pub filtered_qx: f64,
    pub filtered_qy: f64,
    pub filtered_qz: f64,
    pub filtered_qw: f64,
    pub raw_qx: f64,
    pub raw_qy: f64,
    pub raw_qz: f64,
    pub raw_qw: f64,
}

/// Archive record of one control tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DriveRecord {
    pub timestamp_s: f64,
    pub yaw_rad: f64,
    pub state: DriveState,
    pub heading_goal_deg: f64,
    pub head_err_rad: f64,
    pub spot_turn_law: bool,
    pub left_demand: f64,
    pub right_demand: f64,
    pub speed_limited: bool,
    pub left: i32,
    pub right: i32,
}

/// Counters from a complete run of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Samples received
    pub num_samples: usize,

    /// Commands sent to the platform
    pub num_commands: usize,

    /// Ticks on which the speed limit stopped the platform
    pub num_limited: usize,

    /// Ticks which failed, or commands which could not be sent
    pub num_errors: usize,
}

struct Archives {
    att_est: Archiver<Box<dyn Write>>,
    drive: Archiver<Box<dyn Write>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur during a tick of the loop.
#[derive(Debug, thiserror::Error)]
pub enum DriveLoopError {
    #[error("Attitude estimation failed: {0}")]
    AttEstError(AttEstError),

    #[error("Could not archive the tick: {0}")]
    ArchiveError(ArchiveError),

    #[error("Could not send the command: {0}")]
    SinkError(SinkError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DriveLoop {
    /// Create a new loop from its modules.
    pub fn new(att_est: AttEst, head_ctrl: HeadCtrl, diff_drive: DiffDrive) -> Self {
        Self {
            att_est,
            head_ctrl,
            diff_drive,
            last_estimate: None,
            last_record: None,
            archives: None,
        }
    }

    /// Archive every tick into `att_est.csv` and `drive.csv` in the session's archive directory.
    pub fn with_archives(self, session: &Session) -> Result<Self, ArchiveError> {
        let att_est = archive::create_file(session, "att_est.csv")?;
        let drive = archive::create_file(session, "drive.csv")?;

        Ok(self.with_archive_writers(Box::new(att_est), Box::new(drive)))
    }

    /// Archive every tick into the given writers, attitude estimates first then drive records.
    pub fn with_archive_writers(mut self, att_est: Box<dyn Write>, drive: Box<dyn Write>) -> Self {
        self.archives = Some(Archives {
            att_est: Archiver::from_writer(att_est),
            drive: Archiver::from_writer(drive),
        });

        self
    }

    /// The current drive state.
    pub fn drive_state(&self) -> DriveState {
        self.head_ctrl.state()
    }

    /// The record of the most recent control tick.
    pub fn last_record(&self) -> Option<&DriveRecord> {
        self.last_record.as_ref()
    }

    /// Run one tick on a sample.
    ///
    /// Returns `None` while the IMU is calibrating and the command to send afterwards.
    pub fn step(
        &mut self,
        sample: &RawSample,
        now: Instant,
    ) -> Result<Option<WheelCommand>, DriveLoopError> {
        // ---- ATTITUDE ESTIMATION ----

        let (estimate, att_report) = self
            .att_est
            .proc(sample)
            .map_err(DriveLoopError::AttEstError)?;

        if att_report.calibrated_this_tick {
            info!("Calibration complete, heading control starting from the next sample");
        }

        let estimate = match estimate {
            Some(e) => e,
            None => return Ok(None),
        };

        // ---- HEADING CONTROL ----

        let (ctrl_output, ctrl_report) = match self.head_ctrl.proc(&head_ctrl::InputData {
            yaw_rad: estimate.yaw_rad,
            now,
        }) {
            Ok(o) => o,
            Err(e) => match e {},
        };

        // ---- DIFFERENTIAL DRIVE ----

        let (cmd, dd_report): (WheelCommand, diff_drive::StatusReport) =
            match self.diff_drive.proc(&ctrl_output) {
                Ok(o) => o,
                Err(e) => match e {},
            };

        trace!(
            "Tick {:.3}: yaw {:.2} deg, {:?}, cmd ({}, {})",
            estimate.timestamp_s,
            estimate.yaw_deg(),
            ctrl_report.state,
            cmd.left,
            cmd.right
        );

        self.last_estimate = Some(estimate);
        self.last_record = Some(DriveRecord {
            timestamp_s: estimate.timestamp_s,
            yaw_rad: estimate.yaw_rad,
            state: ctrl_report.state,
            heading_goal_deg: ctrl_report.heading_goal_deg,
            head_err_rad: ctrl_report.head_err_rad,
            spot_turn_law: ctrl_report.spot_turn_law,
            left_demand: dd_report.left_demand,
            right_demand: dd_report.right_demand,
            speed_limited: dd_report.speed_limited,
            left: cmd.left,
            right: cmd.right,
        });

        if self.archives.is_some() {
            self.write().map_err(DriveLoopError::ArchiveError)?;
        }

        Ok(Some(cmd))
    }

    /// Process samples from `receiver` until the sending side closes, forwarding every command
    /// to `sink`.
    ///
    /// Errors in a tick or in sending are logged and the loop carries on with the next sample.
    pub fn run<S: CommandSink>(&mut self, receiver: Receiver<RawSample>, sink: &mut S) -> RunSummary {
        let mut summary = RunSummary::default();

        for sample in receiver.iter() {
            summary.num_samples += 1;

            let cmd = match self.step(&sample, Instant::now()) {
                Ok(Some(c)) => c,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Tick failed: {}", e);
                    summary.num_errors += 1;
                    // A failed archive write still produced a command
                    match (e, self.last_record) {
                        (DriveLoopError::ArchiveError(_), Some(r)) => WheelCommand {
                            left: r.left,
                            right: r.right,
                        },
                        _ => continue,
                    }
                }
            };

            if self.last_record.map(|r| r.speed_limited).unwrap_or(false) {
                summary.num_limited += 1;
            }

            match sink.send(&PlatformCmd::from(cmd)) {
                Ok(()) => summary.num_commands += 1,
                Err(e) => {
                    warn!("{}", DriveLoopError::SinkError(e));
                    summary.num_errors += 1;
                }
            }
        }

        info!("Sample channel closed, drive loop stopping");

        summary
    }
}

impl From<&AttitudeEstimate> for AttEstRecord {
    fn from(e: &AttitudeEstimate) -> Self {
        // Quaternion coordinates are stored as [i, j, k, w]
        let filtered = e.filtered_orientation().coords;
        let raw = e.raw_orientation().coords;

        Self {
            timestamp_s: e.timestamp_s,
            roll_rad: e.roll_rad,
            pitch_rad: e.pitch_rad,
            yaw_rad: e.yaw_rad,
            acc_roll_rad: e.acc_roll_rad,
            acc_pitch_rad: e.acc_pitch_rad,
            gyro_roll_rad: e.gyro_roll_rad,
            gyro_pitch_rad: e.gyro_pitch_rad,
            force_magnitude_g: e.force_magnitude_g,
            filtered_qx: filtered[0],
            filtered_qy: filtered[1],
            filtered_qz: filtered[2],
            filtered_qw: filtered[3],
            raw_qx: raw[0],
            raw_qy: raw[1],
            raw_qz: raw[2],
            raw_qw: raw[3],
        }
    }
}

impl Archived for DriveLoop {
    fn write(&mut self) -> Result<(), ArchiveError> {
        let archives = match self.archives.as_mut() {
            Some(a) => a,
            None => return Ok(()),
        };

        if let Some(ref e) = self.last_estimate {
            archives.att_est.serialise(AttEstRecord::from(e))?;
        }
        if let Some(r) = self.last_record {
            archives.drive.serialise(r)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{att_est, diff_drive};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::mpsc::sync_channel;
    use std::time::Duration;

    /// Writer whose contents can be read back after it has been handed to the loop.
    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.borrow().clone())
                .unwrap()
                .lines()
                .map(String::from)
                .collect()
        }
    }

    fn new_loop() -> DriveLoop {
        DriveLoop::new(
            AttEst::new(att_est::Params::default()).unwrap(),
            HeadCtrl::new(head_ctrl::Params::default()).unwrap(),
            DiffDrive::new(diff_drive::Params::default()).unwrap(),
        )
    }

    fn still(timestamp_s: f64) -> RawSample {
        RawSample {
            timestamp_s,
            acc_raw: [0.0, 0.0, 1.0],
            gyro_raw: [0.0; 3],
        }
    }

    #[test]
    fn test_no_commands_while_calibrating() {
        let mut dl = new_loop();
        let t0 = Instant::now();

        for i in 0..10 {
            assert_eq!(dl.step(&still(i as f64 * 0.02), t0).unwrap(), None);
        }

        // First calibrated sample drives straight ahead
        let cmd = dl.step(&still(0.2), t0).unwrap().unwrap();
        assert_eq!(cmd, WheelCommand { left: 190, right: 190 });
        assert_eq!(dl.drive_state(), DriveState::Straight);
    }

    #[test]
    fn test_short_stream_sends_nothing() {
        let mut dl = new_loop();
        let (tx, rx) = sync_channel(16);

        for i in 0..9 {
            tx.send(still(i as f64)).unwrap();
        }
        drop(tx);

        let mut sink: Vec<PlatformCmd> = Vec::new();
        let summary = dl.run(rx, &mut sink);

        assert!(sink.is_empty());
        assert_eq!(summary.num_samples, 9);
        assert_eq!(summary.num_commands, 0);
    }

    #[test]
    fn test_run_forwards_commands() {
        let mut dl = new_loop();
        let (tx, rx) = sync_channel(32);

        for i in 0..15 {
            tx.send(still(i as f64)).unwrap();
        }
        // Bad sample in the middle of the stream is skipped
        tx.send(RawSample {
            acc_raw: [f64::NAN, 0.0, 1.0],
            ..still(15.0)
        })
        .unwrap();
        tx.send(still(16.0)).unwrap();
        drop(tx);

        let mut sink: Vec<PlatformCmd> = Vec::new();
        let summary = dl.run(rx, &mut sink);

        assert_eq!(summary.num_samples, 17);
        assert_eq!(summary.num_errors, 1);
        assert_eq!(summary.num_commands, 6);
        assert_eq!(sink.len(), 6);
        for c in sink.iter() {
            assert_eq!(*c, PlatformCmd::diff_drive(190, 190));
        }
    }

    #[test]
    fn test_turning_platform() {
        let mut dl = new_loop();
        let t0 = Instant::now();

        for i in 0..10 {
            dl.step(&still(0.0), at(t0, i)).unwrap();
        }

        // Rotating at a constant rate, 131 raw units is 1 deg/s, so 10 deg per sample
        let spin = RawSample {
            gyro_raw: [0.0, 0.0, 131.0 * 500.0],
            ..still(0.0)
        };

        // Yaw of 10 deg gives a steering correction that trips the limit
        let cmd = dl.step(&spin, at(t0, 10)).unwrap().unwrap();
        let record = *dl.last_record().unwrap();
        assert!((record.yaw_rad.to_degrees() - 10.0).abs() < 1e-9);
        assert_eq!(record.state, DriveState::Straight);
        assert!(!record.spot_turn_law);

        let expected_left =
            20.0 / 0.105 * (1.0 + 0.26 * 5.0 * record.yaw_rad.sin());
        assert!((record.left_demand - expected_left).abs() < 1e-9);
        assert!(record.speed_limited);
        assert_eq!(cmd, WheelCommand::stop());

        // Past the band the fixed spot turn takes over
        dl.step(&spin, at(t0, 11)).unwrap();
        let cmd = dl.step(&spin, at(t0, 12)).unwrap().unwrap();
        assert!(dl.last_record().unwrap().spot_turn_law);
        assert_eq!(cmd, WheelCommand { left: 80, right: -80 });
    }

    #[test]
    fn test_archives_carry_orientation() {
        let att_buf = SharedBuf::default();
        let drive_buf = SharedBuf::default();
        let mut dl =
            new_loop().with_archive_writers(Box::new(att_buf.clone()), Box::new(drive_buf.clone()));
        let t0 = Instant::now();

        for i in 0..10 {
            dl.step(&still(0.0), at(t0, i)).unwrap();
        }
        assert!(att_buf.lines().is_empty());

        // Rolled by 0.3 rad, still
        let tilt = RawSample {
            acc_raw: [0.0, 0.3f64.sin(), 0.3f64.cos()],
            ..still(0.2)
        };
        dl.step(&tilt, at(t0, 10)).unwrap();
        dl.step(&tilt, at(t0, 11)).unwrap();

        let lines = att_buf.lines();
        assert_eq!(lines.len(), 3);
        let header: Vec<&str> = lines[0].split(',').collect();
        for col in [
            "filtered_qx", "filtered_qy", "filtered_qz", "filtered_qw",
            "raw_qx", "raw_qy", "raw_qz", "raw_qw",
        ]
        .iter()
        {
            assert!(header.contains(col), "missing column {}", col);
        }

        // The raw orientation is a rotation of -0.3 rad about X
        let row: Vec<f64> = lines[2].split(',').map(|v| v.parse().unwrap()).collect();
        let col = |name: &str| row[header.iter().position(|h| *h == name).unwrap()];
        assert!((col("raw_qx") + (0.15f64).sin()).abs() < 1e-9);
        assert!((col("raw_qw") - (0.15f64).cos()).abs() < 1e-9);
        assert!(col("raw_qy").abs() < 1e-9);
        let norm: f64 = ["filtered_qx", "filtered_qy", "filtered_qz", "filtered_qw"]
            .iter()
            .map(|n| col(n).powi(2))
            .sum();
        assert!((norm - 1.0).abs() < 1e-9);

        assert_eq!(drive_buf.lines().len(), 3);
    }

    #[test]
    fn test_overflowing_calibration_recovers() {
        let mut dl = new_loop();
        let (tx, rx) = sync_channel(32);

        // The bias sum overflows, so this window is thrown away
        for i in 0..10 {
            tx.send(RawSample {
                gyro_raw: [0.0, 0.0, 1e308],
                ..still(i as f64)
            })
            .unwrap();
        }
        for i in 10..22 {
            tx.send(still(i as f64)).unwrap();
        }
        drop(tx);

        let mut sink: Vec<PlatformCmd> = Vec::new();
        let summary = dl.run(rx, &mut sink);

        assert_eq!(summary.num_errors, 1);
        assert_eq!(sink, vec![PlatformCmd::diff_drive(190, 190); 2]);
    }

    #[test]
    fn test_diverged_yaw_stops() {
        // Any gyro rate becomes an infinite yaw rate at this scale
        let mut dl = DriveLoop::new(
            AttEst::new(att_est::Params {
                gyro_scale: 1e-307,
                ..att_est::Params::default()
            })
            .unwrap(),
            HeadCtrl::new(head_ctrl::Params::default()).unwrap(),
            DiffDrive::new(diff_drive::Params::default()).unwrap(),
        );
        let t0 = Instant::now();

        for i in 0..10 {
            dl.step(&still(0.0), at(t0, i)).unwrap();
        }

        let spin = RawSample {
            gyro_raw: [0.0, 0.0, 1e10],
            ..still(0.0)
        };
        for i in 10..15 {
            let cmd = dl.step(&spin, at(t0, i)).unwrap().unwrap();
            let record = dl.last_record().unwrap();
            assert!(!record.yaw_rad.is_finite());
            assert!(record.speed_limited);
            assert_eq!(cmd, WheelCommand::stop());
        }
    }

    fn at(t0: Instant, tick: u64) -> Instant {
        t0 + Duration::from_millis(20 * tick)
    }
}
