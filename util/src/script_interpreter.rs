//! # Goal script interpreter module
//!
//! This module provides an interpreter for goal scripts, allowing the robot to be driven from a
//! file of timed operator messages rather than a live operator.
//!
//! A script is a sequence of entries of the form `<time_s>: <json>;`, where the JSON is a
//! [`PeerMsg`], for example:
//!
//! ```text
//! 0.5: {"Goal": {"vx_ms": 0.2, "vy_ms": 0.0}};
//! 5.0: "Terminate";
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::fs;
use regex::RegexBuilder;
use thiserror::Error;

// Internal
use comms_if::op::PeerMsg;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A message which is scripted to occur at a specific time.
struct Entry {
    /// The time the message is supposed to be delivered at
    exec_time_s: f64,

    msg: PeerMsg
}

/// A script interpreter.
///
/// After initialising with the path to the script to run use `.get_pending_msgs` to
/// acquire a list of messages that are due.
pub struct ScriptInterpreter {
    script_path: Option<PathBuf>,
    entries: VecDeque<Entry>
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Could not find the script at {0:?}")]
    ScriptNotFound(PathBuf),

    #[error("Could not load the script: {0}")]
    ScriptLoadError(std::io::Error),

    #[error("The script is empty (or is so bad it can't be read)")]
    ScriptEmpty,

    #[error(
        "Script contains an invalid timestamp: {0}. \
        Should be a float (like 1.0)")]
    InvalidTimestamp(String),

    #[error("Script entries must be in time order, found {0} s after {1} s")]
    OutOfOrder(f64, f64),

    #[error("Script contains an invalid message at {0} s: {1}")]
    InvalidMsg(f64, serde_json::Error)
}

/// Messages which are due from a script.
#[derive(Debug, PartialEq)]
pub enum PendingMsgs {
    None,
    Some(Vec<PeerMsg>),
    EndOfScript
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ScriptInterpreter {

    /// Create a new interpreter from the given script path.
    pub fn new<P: AsRef<Path>>(script_path: P) -> Result<Self, ScriptError> {

        let path = PathBuf::from(script_path.as_ref());

        if !path.exists() {
            return Err(ScriptError::ScriptNotFound(path))
        }

        let script = fs::read_to_string(&path)
            .map_err(ScriptError::ScriptLoadError)?;

        let mut interp = Self::from_script_str(&script)?;
        interp.script_path = Some(path);

        Ok(interp)
    }

    /// Create a new interpreter from the text of a script.
    pub fn from_script_str(script: &str) -> Result<Self, ScriptError> {

        let mut entries: VecDeque<Entry> = VecDeque::new();

        // Go through the script executing __the magic regex__.
        let re = RegexBuilder::new(r"^\s*(\d+(\.\d+)?)\s*:\s*([^;]*);")
            .multi_line(true)
            .build()
            .map_err(|e| ScriptError::InvalidTimestamp(format!("{}", e)))?;

        for cap in re.captures_iter(script) {
            // Both groups are mandatory in the pattern so are always present in a match
            let (time_str, payload) = match (cap.get(1), cap.get(3)) {
                (Some(t), Some(p)) => (t.as_str(), p.as_str()),
                _ => continue
            };

            let exec_time_s: f64 = time_str.parse()
                .map_err(|e| ScriptError::InvalidTimestamp(format!("{}", e)))?;

            if let Some(prev) = entries.back() {
                if exec_time_s < prev.exec_time_s {
                    return Err(ScriptError::OutOfOrder(exec_time_s, prev.exec_time_s))
                }
            }

            let msg: PeerMsg = serde_json::from_str(payload)
                .map_err(|e| ScriptError::InvalidMsg(exec_time_s, e))?;

            entries.push_back(Entry {
                exec_time_s,
                msg
            });
        }

        if entries.is_empty() {
            return Err(ScriptError::ScriptEmpty)
        }

        Ok(ScriptInterpreter {
            script_path: None,
            entries
        })
    }

    /// Return the messages which are due at `current_time_s`.
    ///
    /// Once every message has been returned this returns `PendingMsgs::EndOfScript`.
    pub fn get_pending_msgs(&mut self, current_time_s: f64) -> PendingMsgs {

        if self.entries.is_empty() {
            return PendingMsgs::EndOfScript
        }

        let mut msgs: Vec<PeerMsg> = vec![];

        while let Some(entry) = self.entries.front() {
            if entry.exec_time_s > current_time_s {
                break
            }

            if let Some(entry) = self.entries.pop_front() {
                msgs.push(entry.msg);
            }
        }

        if msgs.is_empty() {
            PendingMsgs::None
        }
        else {
            PendingMsgs::Some(msgs)
        }
    }

    /// Get the path the script was loaded from, if any.
    pub fn script_path(&self) -> Option<&Path> {
        self.script_path.as_deref()
    }

    /// Get the number of messages remaining in the script
    pub fn get_num_msgs(&self) -> usize {
        self.entries.len()
    }

    /// Get the length of the script in seconds
    pub fn get_duration(&self) -> f64 {
        match self.entries.back() {
            Some(e) => e.exec_time_s,
            None => 0f64
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SCRIPT: &str = r#"
        0.0: {"Goal": {"vx_ms": 0.2, "vy_ms": 0.0}};
        1.5: {"Goal": {"vx_ms": 0.0, "vy_ms": 0.3}};
        1.5: {"Goal": {"vx_ms": 0.0, "vy_ms": 0.0}};
        4: "Terminate";
    "#;

    #[test]
    fn test_pending_msgs() {
        let mut interp = ScriptInterpreter::from_script_str(SCRIPT).unwrap();

        assert_eq!(interp.get_num_msgs(), 4);
        assert_eq!(interp.get_duration(), 4.0);

        assert_eq!(
            interp.get_pending_msgs(0.1),
            PendingMsgs::Some(vec![PeerMsg::Goal { vx_ms: 0.2, vy_ms: 0.0 }])
        );
        assert_eq!(interp.get_pending_msgs(1.0), PendingMsgs::None);

        match interp.get_pending_msgs(2.0) {
            PendingMsgs::Some(v) => assert_eq!(v.len(), 2),
            p => panic!("Expected two messages, got {:?}", p)
        }

        assert_eq!(
            interp.get_pending_msgs(10.0),
            PendingMsgs::Some(vec![PeerMsg::Terminate])
        );
        assert_eq!(interp.get_pending_msgs(11.0), PendingMsgs::EndOfScript);
    }

    #[test]
    fn test_bad_scripts() {
        assert!(matches!(
            ScriptInterpreter::from_script_str("nothing here"),
            Err(ScriptError::ScriptEmpty)
        ));
        assert!(matches!(
            ScriptInterpreter::from_script_str("1.0: {\"Goal\": 3};"),
            Err(ScriptError::InvalidMsg(_, _))
        ));
        assert!(matches!(
            ScriptInterpreter::from_script_str("2.0: \"Terminate\";\n1.0: \"Terminate\";"),
            Err(ScriptError::OutOfOrder(_, _))
        ));
        assert!(matches!(
            ScriptInterpreter::new("/does/not/exist.script"),
            Err(ScriptError::ScriptNotFound(_))
        ));
    }
}
