//! # Script channel
//!
//! Drives the robot from a goal script instead of a live operator. Telemetry is discarded and
//! the reply to each exchange is whatever the script says is due.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Instant;
use log::{debug, info};

use crate::op_client::{Channel, OpClientError};
use comms_if::op::{PeerMsg, TelemetryRecord};
use util::script_interpreter::{PendingMsgs, ScriptInterpreter};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct ScriptChannel {
    interp: ScriptInterpreter,

    /// Script time zero, set on the first exchange
    start: Option<Instant>
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ScriptChannel {
    pub fn new(interp: ScriptInterpreter) -> Self {
        Self {
            interp,
            start: None
        }
    }

    /// Get the reply that is due `elapsed_s` after the script started.
    ///
    /// When several messages fall due at once a terminate wins, otherwise the latest goal is
    /// used. Reaching the end of the script terminates the robot.
    pub fn reply_at(&mut self, elapsed_s: f64) -> PeerMsg {
        match self.interp.get_pending_msgs(elapsed_s) {
            PendingMsgs::None => PeerMsg::Ack,
            PendingMsgs::Some(msgs) => {
                debug!("Script messages due at {:.3} s: {:?}", elapsed_s, msgs);

                if msgs.contains(&PeerMsg::Terminate) {
                    PeerMsg::Terminate
                }
                else {
                    msgs.into_iter()
                        .rev()
                        .find(|m| matches!(m, PeerMsg::Goal { .. }))
                        .unwrap_or(PeerMsg::Ack)
                }
            },
            PendingMsgs::EndOfScript => {
                info!("End of goal script reached, stopping");
                PeerMsg::Terminate
            }
        }
    }
}

impl Channel for ScriptChannel {
    fn exchange(&mut self, _record: &TelemetryRecord) -> Result<PeerMsg, OpClientError> {
        let start = *self.start.get_or_insert_with(Instant::now);
        Ok(self.reply_at(start.elapsed().as_secs_f64()))
    }

    fn reconnect(&mut self) -> Result<(), OpClientError> {
        Ok(())
    }

    fn close(&mut self, _ack: bool) {
        info!("Goal script closed with {} messages remaining", self.interp.get_num_msgs());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reply_at() {
        let interp = ScriptInterpreter::from_script_str(r#"
            0.0: {"Goal": {"vx_ms": 1.0, "vy_ms": 0.0}};
            2.0: {"Goal": {"vx_ms": 2.0, "vy_ms": 0.0}};
            2.0: {"Goal": {"vx_ms": 3.0, "vy_ms": 0.0}};
            3.0: "Ack";
        "#).unwrap();
        let mut chan = ScriptChannel::new(interp);

        assert_eq!(chan.reply_at(0.0), PeerMsg::Goal { vx_ms: 1.0, vy_ms: 0.0 });
        assert_eq!(chan.reply_at(1.0), PeerMsg::Ack);
        assert_eq!(chan.reply_at(2.5), PeerMsg::Goal { vx_ms: 3.0, vy_ms: 0.0 });
        assert_eq!(chan.reply_at(3.5), PeerMsg::Ack);
        assert_eq!(chan.reply_at(4.0), PeerMsg::Terminate);
    }

    #[test]
    fn test_terminate_wins() {
        let interp = ScriptInterpreter::from_script_str(r#"
            1.0: {"Goal": {"vx_ms": 1.0, "vy_ms": 0.0}};
            1.0: "Terminate";
            1.0: {"Goal": {"vx_ms": 2.0, "vy_ms": 0.0}};
        "#).unwrap();
        let mut chan = ScriptChannel::new(interp);

        assert_eq!(chan.reply_at(1.5), PeerMsg::Terminate);
    }
}
