//! # Platform Client
//!
//! Sends wheel commands to the drive platform.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, trace};

use comms_if::{
    eqpt::platform::PlatformCmd,
    net::{zmq, MonitoredSocket, MonitoredSocketError},
};

use crate::params::DriveExecParams;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Anything that can accept platform commands.
pub trait CommandSink {
    /// Send a single command.
    fn send(&mut self, cmd: &PlatformCmd) -> Result<(), SinkError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Publishes platform commands as JSON over a zmq PUB socket.
pub struct PlatformClient {
    socket: MonitoredSocket,
}

/// Logs commands instead of sending them, for dry runs.
#[derive(Debug, Default)]
pub struct LogSink {
    num_sent: usize,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not send the command: {0}")]
    SendError(zmq::Error),

    #[error("Could not serialize the command: {0}")]
    SerializationError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PlatformClient {
    /// Create a new instance of the platform client.
    ///
    /// This function will not block until a peer connects, commands published before then are
    /// lost.
    pub fn new(ctx: &zmq::Context, params: &DriveExecParams) -> Result<Self, SinkError> {
        let socket = MonitoredSocket::new(
            ctx,
            zmq::PUB,
            &params.platform_socket,
            &params.platform_cmd_endpoint,
        )
        .map_err(SinkError::SocketError)?;

        info!(
            "Publishing platform commands on {}",
            params.platform_cmd_endpoint
        );

        Ok(Self { socket })
    }
}

impl CommandSink for PlatformClient {
    fn send(&mut self, cmd: &PlatformCmd) -> Result<(), SinkError> {
        let cmd_string = serde_json::to_string(cmd).map_err(SinkError::SerializationError)?;

        // PUB drops messages with no subscriber
        if !self.socket.connected() {
            debug!("No platform connected, command {:?} will be lost", cmd);
        }

        self.socket
            .send(&cmd_string, 0)
            .map_err(SinkError::SendError)
    }
}

impl LogSink {
    /// Number of commands received so far.
    pub fn num_sent(&self) -> usize {
        self.num_sent
    }
}

impl CommandSink for LogSink {
    fn send(&mut self, cmd: &PlatformCmd) -> Result<(), SinkError> {
        self.num_sent += 1;
        trace!("Dry run command {}: {:?}", self.num_sent, cmd);
        Ok(())
    }
}

impl<S: CommandSink + ?Sized> CommandSink for Box<S> {
    fn send(&mut self, cmd: &PlatformCmd) -> Result<(), SinkError> {
        (**self).send(cmd)
    }
}

impl CommandSink for Vec<PlatformCmd> {
    fn send(&mut self, cmd: &PlatformCmd) -> Result<(), SinkError> {
        self.push(*cmd);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_vec_and_log_sinks() {
        let mut sink: Vec<PlatformCmd> = Vec::new();
        sink.send(&PlatformCmd::diff_drive(1, 2)).unwrap();
        sink.send(&PlatformCmd::diff_drive(-3, 4)).unwrap();
        assert_eq!(
            sink,
            vec![PlatformCmd::diff_drive(1, 2), PlatformCmd::diff_drive(-3, 4)]
        );

        let mut log_sink = LogSink::default();
        log_sink.send(&PlatformCmd::diff_drive(0, 0)).unwrap();
        assert_eq!(log_sink.num_sent(), 1);
    }
}
