//! Main drive executable entry point.
//!
//! # Architecture
//!
//! The executable runs two threads:
//!
//!     - The IMU source reads the sample stream (a serial device, a recording or stdin) and
//!       assembles complete samples.
//!     - The drive loop, on the main thread, processes each sample in turn:
//!         - Attitude estimation, after calibrating on the first samples
//!         - Heading control
//!         - Differential drive mixing and limiting
//!         - Sending the command to the platform
//!
//! The executable stops when the sample stream ends.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::info;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use structopt::StructOpt;

// Internal
use drive_lib::{
    att_est::AttEst,
    diff_drive::{self, DiffDrive, DriveProfile},
    drive_loop::{DriveLoop, RunSummary},
    head_ctrl::HeadCtrl,
    imu_source::{Delivery, ImuSource},
    params::DriveExecParams,
    platform_client::{CommandSink, LogSink, PlatformClient},
};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Drive a differential drive platform along a line, reversing its heading periodically.
#[derive(Debug, StructOpt)]
#[structopt(name = "drive_exec")]
struct Opts {
    /// File to read the IMU stream from, such as a serial device or a recording. Reads stdin if
    /// not given.
    #[structopt(short, long, parse(from_os_str))]
    input: Option<PathBuf>,

    /// Minimum log level, one of "info", "debug" or "trace".
    #[structopt(short, long, default_value = "info")]
    log_level: LevelFilter,

    /// Motor tuning, "heading-hold" or "forward-only". Overrides the tuning in diff_drive.toml.
    #[structopt(short, long)]
    profile: Option<DriveProfile>,

    /// Log commands instead of sending them to the platform.
    #[structopt(long)]
    dry_run: bool,

    /// Treat the input as a live stream and drop samples when the drive loop falls behind.
    /// Implied when the input is a serial device, otherwise every sample is processed.
    #[structopt(long)]
    live: bool,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opts = Opts::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("drive_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(opts.log_level, &session).wrap_err("Failed to initialise logging")?;

    info!("Drive Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let exec_params: DriveExecParams =
        util::params::load("drive_exec.toml").wrap_err("Could not load exec params")?;

    let mut diff_drive_params: diff_drive::Params =
        util::params::load("diff_drive.toml").wrap_err("Could not load DiffDrive params")?;

    if let Some(profile) = opts.profile {
        info!("Using the {:?} drive profile", profile);
        diff_drive_params.apply_profile(profile);
    }

    info!("Parameters loaded");

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let att_est = AttEst::init("att_est.toml").wrap_err("Failed to initialise AttEst")?;
    info!("AttEst init complete");
    let head_ctrl = HeadCtrl::init("head_ctrl.toml").wrap_err("Failed to initialise HeadCtrl")?;
    info!("HeadCtrl init complete");
    let diff_drive =
        DiffDrive::new(diff_drive_params).wrap_err("Failed to initialise DiffDrive")?;
    info!("DiffDrive init complete");

    let mut drive_loop = DriveLoop::new(att_est, head_ctrl, diff_drive);
    if exec_params.archive {
        drive_loop = drive_loop
            .with_archives(&session)
            .wrap_err("Failed to create the archives")?;
    }

    info!("Module initialisation complete\n");

    // ---- INITIALISE SINK ----

    let zmq_ctx = comms_if::net::zmq::Context::new();

    let mut sink: Box<dyn CommandSink> = if opts.dry_run {
        info!("Dry run, commands will only be logged");
        Box::new(LogSink::default())
    } else {
        Box::new(
            PlatformClient::new(&zmq_ctx, &exec_params)
                .wrap_err("Failed to initialise the PlatformClient")?,
        )
    };

    // ---- START SOURCE ----

    let capacity = exec_params.sample_queue_capacity;

    let (source, receiver) = match opts.input {
        Some(ref path) => {
            let file = File::open(path)
                .wrap_err_with(|| format!("Could not open the IMU stream {:?}", path))?;
            let delivery = delivery_for(opts.live || is_device(&file));
            info!("Reading IMU stream from {:?} ({:?})", path, delivery);
            ImuSource::spawn(BufReader::new(file), capacity, delivery)
        }
        None => {
            let delivery = delivery_for(opts.live);
            info!("Reading IMU stream from stdin ({:?})", delivery);
            ImuSource::spawn(BufReader::new(io::stdin()), capacity, delivery)
        }
    }
    .wrap_err("Failed to start the IMU source")?;

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let summary: RunSummary = drive_loop.run(receiver, &mut sink);

    // ---- SHUTDOWN ----

    match source.join() {
        Some(r) => info!(
            "IMU source read {} lines, {} samples ({} dropped, {} parse errors)",
            r.num_lines, r.num_samples, r.num_dropped, r.num_parse_errors
        ),
        None => info!("IMU source thread panicked"),
    }

    info!(
        "Drive loop processed {} samples, sent {} commands ({} speed limited, {} errors)",
        summary.num_samples, summary.num_commands, summary.num_limited, summary.num_errors
    );

    info!("End of execution");

    Ok(())
}

/// Sample delivery for a live or recorded stream.
fn delivery_for(live: bool) -> Delivery {
    match live {
        true => Delivery::BestEffort,
        false => Delivery::Lossless,
    }
}

/// True if the file is a character device, such as a serial port.
#[cfg(unix)]
fn is_device(file: &File) -> bool {
    use std::os::unix::fs::FileTypeExt;

    file.metadata()
        .map(|m| m.file_type().is_char_device())
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_device(_file: &File) -> bool {
    false
}
