//! # Operator Client
//!
//! The robot side of the operator channel. Every exchange sends one [`RobotMsg`] and waits for
//! one [`PeerMsg`] in reply over a zmq REQ socket.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, warn};

use comms_if::{
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
    op::{MsgError, PeerMsg, RobotMsg, TelemetryRecord}
};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A source of operator commands which is sent telemetry in exchange.
pub trait Channel: Send {
    /// Send the telemetry record and return the operator's reply.
    fn exchange(&mut self, record: &TelemetryRecord) -> Result<PeerMsg, OpClientError>;

    /// Re-establish the connection after a failure.
    fn reconnect(&mut self) -> Result<(), OpClientError>;

    /// Close the channel, acknowledging a terminate first if `ack` is set.
    fn close(&mut self, ack: bool);
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Operator client
pub struct OpClient {
    ctx: zmq::Context,
    endpoint: String,
    robot_id: String,
    socket_options: SocketOptions,

    /// `None` after a failure, until the next successful reconnection
    socket: Option<MonitoredSocket>
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum OpClientError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("The client is not connected to the operator")]
    NotConnected,

    #[error("Could not send the message to the operator: {0}")]
    SendError(zmq::Error),

    #[error("Could not recieve a message from the operator: {0}")]
    RecvError(zmq::Error),

    #[error("Message error: {0}")]
    MsgError(MsgError),

    #[error("The operator replied to the hello with {0:?} rather than an ack")]
    UnexpectedHelloReply(PeerMsg)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl OpClient {

    /// Create a new instance of the operator client.
    ///
    /// This function blocks until the operator is connected and has acknowledged the robot's
    /// hello, or the connection times out.
    pub fn new(
        ctx: &zmq::Context,
        params: &NetParams,
        robot_id: &str
    ) -> Result<Self, OpClientError> {
        let socket_options = SocketOptions {
            connect_timeout: params.connect_timeout_ms,
            heartbeat_ivl: params.heartbeat_ivl_ms,
            heartbeat_ttl: 2 * params.heartbeat_ivl_ms,
            heartbeat_timeout: 2 * params.heartbeat_ivl_ms,
            linger: 0,
            recv_timeout: params.recv_timeout_ms,
            send_timeout: params.send_timeout_ms,
            req_correlate: true,
            req_relaxed: true,
            ..Default::default()
        };

        let mut client = Self {
            ctx: ctx.clone(),
            endpoint: params.op_endpoint.clone(),
            robot_id: robot_id.into(),
            socket_options,
            socket: None
        };

        client.connect()?;

        Ok(client)
    }

    /// Check if the client is connected to the operator
    pub fn is_connected(&self) -> bool {
        match self.socket {
            Some(ref s) => s.connected(),
            None => false
        }
    }

    /// Create a fresh socket and introduce the robot.
    fn connect(&mut self) -> Result<(), OpClientError> {
        // Drop any old socket first so its pending request is discarded
        self.socket = None;

        let socket = MonitoredSocket::new(
            &self.ctx,
            zmq::REQ,
            self.socket_options.clone(),
            &self.endpoint
        ).map_err(OpClientError::SocketError)?;

        self.socket = Some(socket);

        let hello = RobotMsg::Hello { robot_id: self.robot_id.clone() };
        match self.request(&hello)? {
            PeerMsg::Ack => {
                info!("Connected to the operator at {}", self.endpoint);
                Ok(())
            },
            r => {
                self.socket = None;
                Err(OpClientError::UnexpectedHelloReply(r))
            }
        }
    }

    /// Send a message and wait for the reply.
    ///
    /// Any failure drops the socket, so the client must be reconnected afterwards.
    fn request(&mut self, msg: &RobotMsg) -> Result<PeerMsg, OpClientError> {
        let result = match self.socket {
            Some(ref socket) => send_recv(socket, msg),
            None => Err(OpClientError::NotConnected)
        };

        if result.is_err() {
            self.socket = None;
        }

        result
    }
}

impl Channel for OpClient {
    fn exchange(&mut self, record: &TelemetryRecord) -> Result<PeerMsg, OpClientError> {
        self.request(&RobotMsg::Telemetry(record.clone()))
    }

    fn reconnect(&mut self) -> Result<(), OpClientError> {
        debug!("Reconnecting to the operator at {}", self.endpoint);
        self.connect()
    }

    fn close(&mut self, ack: bool) {
        if ack && self.socket.is_some() {
            if let Err(e) = self.request(&RobotMsg::TerminateAck) {
                warn!("Could not acknowledge the terminate: {}", e);
            }
        }

        self.socket = None;
        info!("Operator connection closed");
    }
}

impl Channel for Box<dyn Channel> {
    fn exchange(&mut self, record: &TelemetryRecord) -> Result<PeerMsg, OpClientError> {
        (**self).exchange(record)
    }

    fn reconnect(&mut self) -> Result<(), OpClientError> {
        (**self).reconnect()
    }

    fn close(&mut self, ack: bool) {
        (**self).close(ack)
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn send_recv(socket: &MonitoredSocket, msg: &RobotMsg) -> Result<PeerMsg, OpClientError> {
    let msg_str = msg.to_json().map_err(OpClientError::MsgError)?;

    socket.send(&msg_str, 0)
        .map_err(OpClientError::SendError)?;

    let reply = socket.recv_bytes(0)
        .map_err(OpClientError::RecvError)?;

    PeerMsg::from_bytes(&reply).map_err(OpClientError::MsgError)
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;
    use comms_if::op::{ControllerState, Pose, VelocityEstimate};
    use std::thread;

    /// Serve one operator session: ack hellos, answer telemetry with a goal, and stop after the
    /// terminate acknowledgement. Returns everything the robot sent.
    fn serve(socket: zmq::Socket) -> Vec<RobotMsg> {
        let mut received = vec![];

        loop {
            let bytes = socket.recv_bytes(0).unwrap();
            let msg = RobotMsg::from_bytes(&bytes).unwrap();

            let reply = match msg {
                RobotMsg::Telemetry(_) => PeerMsg::Goal { vx_ms: 1.0, vy_ms: 0.5 },
                _ => PeerMsg::Ack
            };
            socket.send(&reply.to_json().unwrap(), 0).unwrap();

            let done = msg == RobotMsg::TerminateAck;
            received.push(msg);
            if done {
                break received
            }
        }
    }

    #[test]
    fn test_session() {
        let params = NetParams {
            op_endpoint: "tcp://127.0.0.1:57391".into(),
            op_bind_endpoint: "tcp://127.0.0.1:57391".into(),
            connect_timeout_ms: 2000,
            recv_timeout_ms: 2000,
            send_timeout_ms: 2000,
            heartbeat_ivl_ms: 0
        };

        let ctx = zmq::Context::new();
        let rep = ctx.socket(zmq::REP).unwrap();
        rep.set_rcvtimeo(5000).unwrap();
        rep.bind(&params.op_bind_endpoint).unwrap();
        let server = thread::spawn(move || serve(rep));

        let mut client = OpClient::new(&ctx, &params, "ugv").unwrap();
        assert!(client.is_connected());

        let record = TelemetryRecord {
            cycle: 7,
            timestamp: Utc::now(),
            pose: Pose { x_m: 1.0, y_m: 2.0, theta_rad: 0.5 },
            velocity: VelocityEstimate::default(),
            aux: vec![3.3],
            ctrl_state: ControllerState::Driving,
            safe: false
        };
        assert_eq!(
            client.exchange(&record).unwrap(),
            PeerMsg::Goal { vx_ms: 1.0, vy_ms: 0.5 }
        );

        // A reconnection introduces the robot again
        client.reconnect().unwrap();
        assert!(client.is_connected());

        client.close(true);
        assert!(!client.is_connected());
        assert!(matches!(client.exchange(&record), Err(OpClientError::NotConnected)));

        let hello = RobotMsg::Hello { robot_id: "ugv".into() };
        assert_eq!(server.join().unwrap(), vec![
            hello.clone(),
            RobotMsg::Telemetry(record),
            hello,
            RobotMsg::TerminateAck
        ]);
    }
}
