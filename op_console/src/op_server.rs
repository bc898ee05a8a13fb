//! # Operator Server
//!
//! The console side of the operator channel. The robot's REQ socket connects to the server's REP
//! socket, and every telemetry record the robot sends is answered with whatever the operator last
//! commanded.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{atomic::{AtomicBool, Ordering}, Arc, Mutex, MutexGuard},
    thread::{self, JoinHandle}
};
use log::{info, warn};
use serde::Serialize;

use comms_if::{
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
    op::{PeerMsg, RobotMsg, TelemetryRecord}
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Receive timeout of the server socket, which bounds how long shutdown takes.
const RECV_TIMEOUT_MS: i32 = 200;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Serves operator commands to the robot from a background thread.
pub struct OpServer {
    state: Arc<Mutex<ConsoleState>>,
    run: Arc<AtomicBool>,
    jh: Option<JoinHandle<()>>
}

/// What the console knows about the robot, and what it will say to it next.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ConsoleState {
    /// ID the robot introduced itself with
    pub robot_id: Option<String>,

    /// Number of telemetry records received
    pub num_records: u64,

    pub last_telemetry: Option<TelemetryRecord>,

    /// Set once the robot has acknowledged a terminate
    pub terminated: bool,

    /// Reply to the next telemetry record, `None` to just acknowledge it
    #[serde(skip)]
    pending: Option<PeerMsg>
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum OpServerError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not start the server thread: {0}")]
    ThreadError(std::io::Error)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl OpServer {
    /// Bind the server and start serving in the background.
    ///
    /// This function will not wait for the robot to connect before returning.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, OpServerError> {
        let socket_options = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            heartbeat_ivl: params.heartbeat_ivl_ms,
            heartbeat_ttl: 2 * params.heartbeat_ivl_ms,
            heartbeat_timeout: 2 * params.heartbeat_ivl_ms,
            linger: 0,
            recv_timeout: RECV_TIMEOUT_MS,
            send_timeout: params.send_timeout_ms,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(
            ctx,
            zmq::REP,
            socket_options,
            &params.op_bind_endpoint
        ).map_err(OpServerError::SocketError)?;

        info!("Operator server bound to {}", params.op_bind_endpoint);

        let state = Arc::new(Mutex::new(ConsoleState::default()));
        let run = Arc::new(AtomicBool::new(true));

        let jh = thread::Builder::new()
            .name("op_server".into())
            .spawn({
                let state = state.clone();
                let run = run.clone();
                move || serve(socket, state, run)
            })
            .map_err(OpServerError::ThreadError)?;

        Ok(Self {
            state,
            run,
            jh: Some(jh)
        })
    }

    /// Queue a message for the robot's next request.
    pub fn command(&self, msg: PeerMsg) {
        lock(&self.state).command(msg);
    }

    /// Copy of the console state.
    pub fn status(&self) -> ConsoleState {
        lock(&self.state).clone()
    }
}

impl Drop for OpServer {
    fn drop(&mut self) {
        self.run.store(false, Ordering::Release);
        if let Some(jh) = self.jh.take() {
            jh.join().ok();
        }
    }
}

impl ConsoleState {
    pub fn command(&mut self, msg: PeerMsg) {
        // A queued terminate is never replaced by a goal
        if self.pending != Some(PeerMsg::Terminate) {
            self.pending = Some(msg);
        }
    }

    /// Build the reply to a message from the robot.
    pub fn reply_to(&mut self, msg: RobotMsg) -> PeerMsg {
        match msg {
            RobotMsg::Hello { robot_id } => {
                info!("Robot \"{}\" connected", robot_id);
                self.robot_id = Some(robot_id);
                PeerMsg::Ack
            },
            RobotMsg::Telemetry(record) => {
                self.num_records += 1;
                self.last_telemetry = Some(record);
                self.pending.take().unwrap_or(PeerMsg::Ack)
            },
            RobotMsg::TerminateAck => {
                info!("Robot acknowledged the terminate");
                self.terminated = true;
                PeerMsg::Ack
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn serve(socket: MonitoredSocket, state: Arc<Mutex<ConsoleState>>, run: Arc<AtomicBool>) {
    while run.load(Ordering::Acquire) {
        let bytes = match socket.recv_bytes(0) {
            Ok(b) => b,
            Err(zmq::Error::EAGAIN) => continue,
            Err(e) => {
                warn!("Could not recieve from the robot: {}", e);
                continue
            }
        };

        // A REP socket must always reply, so invalid messages are acknowledged
        let reply = match RobotMsg::from_bytes(&bytes) {
            Ok(msg) => lock(&state).reply_to(msg),
            Err(e) => {
                warn!("Invalid message from the robot: {}", e);
                PeerMsg::Ack
            }
        };

        match reply.to_json() {
            Ok(s) => if let Err(e) = socket.send(&s, 0) {
                warn!("Could not send the reply to the robot: {}", e);
            },
            Err(e) => warn!("Could not serialise the reply: {}", e)
        }
    }
}

fn lock(state: &Mutex<ConsoleState>) -> MutexGuard<ConsoleState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;
    use comms_if::op::{ControllerState, Pose, VelocityEstimate};

    fn telemetry(cycle: u64) -> RobotMsg {
        RobotMsg::Telemetry(TelemetryRecord {
            cycle,
            timestamp: Utc::now(),
            pose: Pose::default(),
            velocity: VelocityEstimate::default(),
            aux: vec![1.0],
            ctrl_state: ControllerState::Stopped,
            safe: false
        })
    }

    #[test]
    fn test_replies() {
        let mut state = ConsoleState::default();

        assert_eq!(state.reply_to(RobotMsg::Hello { robot_id: "ugv".into() }), PeerMsg::Ack);
        assert_eq!(state.robot_id.as_deref(), Some("ugv"));

        assert_eq!(state.reply_to(telemetry(0)), PeerMsg::Ack);

        // Commands are sent once
        let goal = PeerMsg::Goal { vx_ms: 1.0, vy_ms: 0.0 };
        state.command(goal);
        assert_eq!(state.reply_to(telemetry(1)), goal);
        assert_eq!(state.reply_to(telemetry(2)), PeerMsg::Ack);

        state.command(PeerMsg::Terminate);
        state.command(goal);
        assert_eq!(state.reply_to(telemetry(3)), PeerMsg::Terminate);
        assert_eq!(state.reply_to(RobotMsg::TerminateAck), PeerMsg::Ack);

        assert!(state.terminated);
        assert_eq!(state.num_records, 4);
        assert_eq!(state.last_telemetry.unwrap().cycle, 3);
    }
}
