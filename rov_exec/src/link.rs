//! # Channel link
//!
//! Fault handling around a [`Channel`]. A failed exchange takes the link down. The caller is
//! told the link was lost on that same exchange, so it can stop the robot before anything else
//! happens. Reconnection is only attempted on later exchanges, once an exponentially growing
//! backoff has elapsed, and the link gives up when the retry budget is used.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::{Duration, Instant};
use log::{info, warn};
use serde::Deserialize;

use crate::op_client::{Channel, OpClientError};
use comms_if::op::{PeerMsg, TelemetryRecord};
use util::params::{check_non_negative, InvalidParam, Validate};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Reconnection policy.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkParams {
    /// Number of consecutive failed reconnection attempts after which the link gives up.
    pub retry_budget: u32,

    /// Wait before the first reconnection attempt, doubled after each failure.
    ///
    /// Units: seconds
    pub backoff_initial_s: f64,

    /// Units: seconds
    pub backoff_max_s: f64
}

pub struct ChannelLink<C: Channel> {
    channel: C,
    params: LinkParams,
    state: LinkState
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinkState {
    Up,
    Down {
        /// Failed reconnection attempts so far
        attempts: u32,
        next_attempt: Instant
    }
}

/// Result of a link exchange.
#[derive(Debug)]
pub enum Exchange {
    /// The operator replied.
    Reply(PeerMsg),

    /// The exchange failed and the link has just gone down.
    LinkLost(OpClientError),

    /// The link is down and either no reconnection was due or the attempt failed.
    Down
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Could not reconnect to the operator after {attempts} attempts, last error: {last}")]
    BudgetExhausted {
        attempts: u32,
        last: OpClientError
    }
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<C: Channel> ChannelLink<C> {
    /// Wrap a connected channel.
    pub fn new(channel: C, params: LinkParams) -> Self {
        Self {
            channel,
            params,
            state: LinkState::Up
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_up(&self) -> bool {
        self.state == LinkState::Up
    }

    /// Access the wrapped channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Exchange telemetry for an operator message, handling faults.
    ///
    /// `now` is the time used to schedule reconnection attempts.
    pub fn exchange(
        &mut self,
        record: &TelemetryRecord,
        now: Instant
    ) -> Result<Exchange, LinkError> {
        if let LinkState::Down { attempts, next_attempt } = self.state {
            if now < next_attempt {
                return Ok(Exchange::Down)
            }

            match self.channel.reconnect() {
                Ok(()) => {
                    info!("Operator link restored after {} failed attempts", attempts);
                    self.state = LinkState::Up;
                },
                Err(e) => {
                    let attempts = attempts + 1;
                    warn!("Reconnection attempt {} failed: {}", attempts, e);

                    if attempts >= self.params.retry_budget {
                        return Err(LinkError::BudgetExhausted { attempts, last: e })
                    }

                    self.state = LinkState::Down {
                        attempts,
                        next_attempt: now + self.backoff(attempts)
                    };
                    return Ok(Exchange::Down)
                }
            }
        }

        match self.channel.exchange(record) {
            Ok(msg) => Ok(Exchange::Reply(msg)),
            Err(e) => {
                warn!("Operator link lost: {}", e);
                self.state = LinkState::Down {
                    attempts: 0,
                    next_attempt: now + self.backoff(0)
                };
                Ok(Exchange::LinkLost(e))
            }
        }
    }

    /// Close the wrapped channel.
    pub fn close(&mut self, ack: bool) {
        self.channel.close(ack && self.is_up())
    }

    /// Wait before the next attempt after `attempts` failures.
    fn backoff(&self, attempts: u32) -> Duration {
        let s = self.params.backoff_initial_s * 2f64.powi(attempts.min(30) as i32);
        Duration::from_secs_f64(s.min(self.params.backoff_max_s))
    }
}

impl Validate for LinkParams {
    fn validate(&self) -> Result<(), InvalidParam> {
        if self.retry_budget == 0 {
            return Err(InvalidParam::new("retry_budget", "must be at least 1"))
        }
        check_non_negative("backoff_initial_s", self.backoff_initial_s)?;
        check_non_negative("backoff_max_s", self.backoff_max_s)?;
        if self.backoff_max_s < self.backoff_initial_s {
            return Err(InvalidParam::new("backoff_max_s", "must not be less than backoff_initial_s"))
        }
        Ok(())
    }
}
