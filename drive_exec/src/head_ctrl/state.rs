//! Heading control module state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, trace, warn};
use serde::Serialize;
use std::convert::Infallible;
use std::time::Instant;

// Internal
use super::Params;
use util::{
    maths::{normalize_angle_deg, normalize_angle_rad, sign},
    module::State,
    params,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Heading controller.
pub struct HeadCtrl {
    params: Params,

    /// Current drive state
    state: DriveState,

    /// Heading to hold or turn towards
    goal: HeadingGoal,

    /// Start of the current straight segment, set on the first tick.
    last_straight_start: Option<Instant>,

    /// When the heading first reached the goal during the last turn.
    turn_completed_at: Option<Instant>,
}

/// Input data to heading control.
#[derive(Debug, Clone, Copy)]
pub struct InputData {
    /// Estimated yaw, not necessarily wrapped.
    ///
    /// Units: radians
    pub yaw_rad: f64,

    /// Monotonic time at which the tick is processed.
    pub now: Instant,
}

/// Status report for heading control.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatusReport {
    /// The drive state after this tick's transitions
    pub state: DriveState,

    /// The heading goal after this tick's transitions
    pub heading_goal_deg: f64,

    /// Heading error to the goal, wrapped into (-pi, pi]
    pub head_err_rad: f64,

    /// True if the state changed on this tick
    pub transitioned: bool,

    /// True if the fixed speed spot turn law was used on this tick
    pub spot_turn_law: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The drive states of the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriveState {
    /// Driving forwards, holding the heading goal
    Straight,

    /// Rotating on the spot towards a new heading goal
    SpotTurn,

    /// Heading goal reached, holding it without moving forwards before driving again
    EndSpotTurn,
}

/// The two headings the platform travels along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HeadingGoal {
    /// 0 degrees
    Outbound,

    /// 180 degrees
    Return,
}

/// Output of heading control.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum HeadCtrlOutput {
    /// Body rates to be mixed into wheel speeds.
    Rates {
        /// Forward rate
        u1: f64,

        /// Steering rate
        u2: f64,
    },

    /// Fixed speed spot turn, given directly as wheel speeds.
    SpotTurn { left: i32, right: i32 },

    /// The heading error could not be computed, both wheels must stop.
    Stop,
}

/// Potential errors that can occur when creating the heading controller.
#[derive(Debug, thiserror::Error)]
pub enum HeadCtrlError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(params::LoadError),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl HeadingGoal {
    /// The goal heading in degrees.
    pub fn deg(&self) -> f64 {
        match self {
            HeadingGoal::Outbound => 0.0,
            HeadingGoal::Return => 180.0,
        }
    }

    /// The opposite heading.
    pub fn reversed(&self) -> Self {
        match self {
            HeadingGoal::Outbound => HeadingGoal::Return,
            HeadingGoal::Return => HeadingGoal::Outbound,
        }
    }
}

impl HeadCtrl {
    /// Initialise the controller from a parameter file.
    pub fn init(params_path: &str) -> Result<Self, HeadCtrlError> {
        let params = params::load(params_path).map_err(HeadCtrlError::ParamLoadError)?;

        Self::new(params)
    }

    /// Create a new controller, starting in `Straight` towards 0 degrees.
    ///
    /// The straight segment timer starts on the first call to `proc`.
    pub fn new(params: Params) -> Result<Self, HeadCtrlError> {
        let non_negative = [
            ("wait_straight_s", params.wait_straight_s),
            ("turn_settle_s", params.turn_settle_s),
            ("heading_tolerance_deg", params.heading_tolerance_deg),
            ("spot_turn_band_deg", params.spot_turn_band_deg),
            ("k1", params.k1),
        ];
        for (name, value) in non_negative.iter() {
            if !(value.is_finite() && *value >= 0.0) {
                return Err(HeadCtrlError::InvalidParams(format!(
                    "{} must be a non-negative number, found {}",
                    name, value
                )));
            }
        }
        if params.spot_turn_speed < 0 {
            return Err(HeadCtrlError::InvalidParams(format!(
                "spot_turn_speed must be non-negative, found {}",
                params.spot_turn_speed
            )));
        }

        Ok(Self {
            params,
            state: DriveState::Straight,
            goal: HeadingGoal::Outbound,
            last_straight_start: None,
            turn_completed_at: None,
        })
    }

    /// The current drive state.
    pub fn state(&self) -> DriveState {
        self.state
    }

    /// The current heading goal in degrees.
    pub fn heading_goal_deg(&self) -> f64 {
        self.goal.deg()
    }

    /// Perform this tick's state transition, if any. Returns true if the state changed.
    ///
    /// At most one transition happens per tick.
    fn update_state(&mut self, yaw_rad: f64, now: Instant) -> bool {
        let prev_state = self.state;

        match self.state {
            DriveState::Straight => self.mode_straight(now),
            DriveState::SpotTurn => self.mode_spot_turn(yaw_rad, now),
            DriveState::EndSpotTurn => self.mode_end_spot_turn(yaw_rad, now),
        }

        if self.state != prev_state {
            info!(
                "HeadCtrl: {:?} -> {:?} (goal {} deg, yaw {:.2} deg)",
                prev_state,
                self.state,
                self.goal.deg(),
                yaw_rad.to_degrees()
            );
            true
        } else {
            false
        }
    }

    /// Straight: once the wait has elapsed reverse the goal and start turning.
    fn mode_straight(&mut self, now: Instant) {
        let start = *self.last_straight_start.get_or_insert(now);

        if secs_between(start, now) > self.params.wait_straight_s {
            self.goal = self.goal.reversed();
            self.state = DriveState::SpotTurn;
        }
    }

    /// SpotTurn: finished as soon as the heading is within tolerance of the goal.
    fn mode_spot_turn(&mut self, yaw_rad: f64, now: Instant) {
        if self.heading_reached(yaw_rad) {
            self.turn_completed_at = Some(now);
            self.state = DriveState::EndSpotTurn;
        }
    }

    /// EndSpotTurn: resume straight once the heading is still held after the settle time.
    fn mode_end_spot_turn(&mut self, yaw_rad: f64, now: Instant) {
        let completed_at = *self.turn_completed_at.get_or_insert(now);

        if self.heading_reached(yaw_rad)
            && secs_between(completed_at, now) > self.params.turn_settle_s
        {
            self.last_straight_start = Some(now);
            self.turn_completed_at = None;
            self.state = DriveState::Straight;
        }
    }

    fn heading_reached(&self, yaw_rad: f64) -> bool {
        normalize_angle_deg(yaw_rad.to_degrees() - self.goal.deg()).abs()
            < self.params.heading_tolerance_deg
    }

    /// Compute the control output for the heading error.
    ///
    /// A non-finite error, from a diverged yaw estimate, stops the platform.
    fn control(&self, head_err_rad: f64) -> HeadCtrlOutput {
        if !head_err_rad.is_finite() {
            warn!("Heading error is {}, stopping the platform", head_err_rad);
            return HeadCtrlOutput::Stop;
        }

        if head_err_rad.to_degrees().abs() < self.params.spot_turn_band_deg {
            // Only move forwards when going straight, otherwise just hold heading
            let u1 = match self.state {
                DriveState::Straight => 1.0,
                DriveState::SpotTurn | DriveState::EndSpotTurn => 0.0,
            };
            let u2 = -self.params.k1 * head_err_rad.sin();

            HeadCtrlOutput::Rates { u1, u2 }
        } else {
            let dir = sign(head_err_rad) as i32;

            HeadCtrlOutput::SpotTurn {
                left: dir * self.params.spot_turn_speed,
                right: -dir * self.params.spot_turn_speed,
            }
        }
    }
}

impl State for HeadCtrl {
    type InputData = InputData;
    type OutputData = HeadCtrlOutput;
    type StatusReport = StatusReport;
    type ProcError = Infallible;

    /// Process one control tick.
    ///
    /// State transitions are evaluated first, then the control law runs for the resulting state
    /// and goal.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let transitioned = self.update_state(input_data.yaw_rad, input_data.now);

        let head_err_rad = normalize_angle_rad(input_data.yaw_rad - self.goal.deg().to_radians());
        let output = self.control(head_err_rad);

        trace!(
            "HeadCtrl: {:?}, head err {:.2} deg, output {:?}",
            self.state,
            head_err_rad.to_degrees(),
            output
        );

        let report = StatusReport {
            state: self.state,
            heading_goal_deg: self.goal.deg(),
            head_err_rad,
            transitioned,
            spot_turn_law: matches!(output, HeadCtrlOutput::SpotTurn { .. }),
        };

        Ok((output, report))
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Seconds from `earlier` to `later`, zero if `later` is before `earlier`.
fn secs_between(earlier: Instant, later: Instant) -> f64 {
    later.saturating_duration_since(earlier).as_secs_f64()
}
