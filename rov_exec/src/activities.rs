//! # Activities
//!
//! Runs the robot as three concurrent activities instead of one cooperative cycle:
//!
//! - Sensing reads the sensors, runs the estimator and publishes the estimate.
//! - Comms exchanges the latest estimate for operator commands.
//! - Actuation runs the controller on the latest estimate and drives the robot.
//!
//! The activities only communicate through [`Shared`]. When the link is lost or the robot is
//! terminated actuation holds the drive stopped, and comms waits until actuation has confirmed a
//! stop before it reconnects or acknowledges the terminate.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant}
};
use chrono::Utc;
use log::{debug, error, info, warn};

use crate::{
    coordinator::CoordError,
    eqpt::{apply_intent, ActuationIntent, Drive, Sensors, SpeedLimits},
    link::{ChannelLink, Exchange},
    loc::{self, LocMgr},
    nav_ctrl::{self, ControllerState, GoalVelocity, NavCtrl},
    op_client::Channel,
    shared::Shared
};
use comms_if::op::{PeerMsg, TelemetryRecord};
use util::{archive::Archived, module::State};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Poll period while comms waits for actuation to confirm a stop.
const STOP_POLL_PERIOD: Duration = Duration::from_millis(2);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Rates of each activity.
#[derive(Debug, Clone, Copy)]
pub struct Rates {
    pub sensing_rate_hz: f64,
    pub comms_rate_hz: f64,
    pub actuation_rate_hz: f64
}

/// The decision taken by one actuation iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuationReport {
    /// Generation of the estimate the decision was based on
    pub generation: u64,

    pub ctrl_state: ControllerState,
    pub intent: ActuationIntent
}

/// Statistics of a complete run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Number of estimates published by sensing
    pub generations: u64,

    /// Number of controller decisions issued by actuation
    pub actuation_cycles: u64,

    /// Number of telemetry exchanges made by comms
    pub exchanges: u64,

    /// The last controller decision, if any was made
    pub last_report: Option<ActuationReport>
}

/// Everything handed back once the activities have finished, whether or not they failed.
pub struct Finished {
    pub summary: RunSummary,

    /// The estimator holding its final state, `None` if sensing panicked or never started
    pub loc: Option<LocMgr>,

    pub nav_ctrl: Option<NavCtrl>,

    /// The first error which stopped the activities
    pub result: Result<(), CoordError>
}

/// What an activity hands back when it ends, along with the error that ended it if any.
type Outcome<T> = (T, Result<(), CoordError>);

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Run the activities until the operator terminates the robot or one of them fails.
///
/// `loc` and `nav_ctrl` must already be initialised. The drive has always been commanded to stop
/// by the time this function returns, provided the actuation activity could be started.
pub fn run<S, D, C>(
    sensors: S,
    drive: D,
    link: ChannelLink<C>,
    loc: LocMgr,
    nav_ctrl: NavCtrl,
    limits: SpeedLimits,
    rates: Rates,
    archive: bool
) -> Finished
where
    S: Sensors + 'static,
    D: Drive + 'static,
    C: Channel + 'static
{
    let shared = Arc::new(Shared::new());

    info!(
        "Starting activities: sensing {} Hz, comms {} Hz, actuation {} Hz",
        rates.sensing_rate_hz, rates.comms_rate_hz, rates.actuation_rate_hz
    );

    // The drive is only ever owned by a running actuation activity, so it is started first
    let actuation_jh = spawn("actuation", &shared, {
        let shared = shared.clone();
        move || actuation(shared, drive, nav_ctrl, limits, rates.actuation_rate_hz, archive)
    });
    let sensing_jh = match actuation_jh {
        Ok(_) => spawn("sensing", &shared, {
            let shared = shared.clone();
            move || sensing(shared, sensors, loc, rates.sensing_rate_hz, archive)
        }),
        Err(_) => Err(CoordError::ActivityNotStarted("sensing"))
    };
    let comms_jh = match sensing_jh {
        Ok(_) => spawn("comms", &shared, {
            let shared = shared.clone();
            move || comms(shared, link, rates.comms_rate_hz)
        }),
        Err(_) => Err(CoordError::ActivityNotStarted("comms"))
    };

    // Whichever activity finishes first the others must follow, and every started activity is
    // joined
    let (exchanges, comms_result) = join("comms", comms_jh, &shared);
    let (actuation_out, actuation_result) = join("actuation", actuation_jh, &shared);
    let (loc, sensing_result) = join("sensing", sensing_jh, &shared);

    let (nav_ctrl, actuation_cycles, last_report) = match actuation_out {
        Some((n, c, r)) => (Some(n), c, r),
        None => (None, 0, None)
    };

    let summary = RunSummary {
        generations: shared.snapshot().generation,
        actuation_cycles,
        exchanges: exchanges.unwrap_or(0),
        last_report
    };

    // A failed actuation or sensing activity is what ends comms, so their errors come first
    let result = actuation_result.and(sensing_result).and(comms_result);

    match result {
        Ok(()) => info!("Activities finished: {:?}", summary),
        Err(ref e) => error!("Activities stopped on {}: {:?}", e, summary)
    }

    Finished {
        summary,
        loc,
        nav_ctrl,
        result
    }
}

// ------------------------------------------------------------------------------------------------
// ACTIVITIES
// ------------------------------------------------------------------------------------------------

fn sensing<S: Sensors>(
    shared: Arc<Shared>,
    mut sensors: S,
    mut loc: LocMgr,
    rate_hz: f64,
    archive: bool
) -> Outcome<LocMgr> {
    let period = Duration::from_secs_f64(1.0 / rate_hz);
    let mut last: Option<Instant> = None;
    let mut aux = vec![];

    while shared.is_running() {
        let start = Instant::now();
        let dt_s = match last {
            Some(l) => start.duration_since(l).as_secs_f64(),
            None => period.as_secs_f64()
        };
        last = Some(start);

        let odom = sensors.read_odometry_delta()
            .map_err(|e| warn!("Could not read odometry: {}", e))
            .ok();
        let inertial = sensors.read_inertial_sample()
            .map_err(|e| warn!("Could not read the inertial sensor: {}", e))
            .ok();
        match sensors.read_auxiliary() {
            Ok(a) => aux = a,
            Err(e) => warn!("Could not read the auxiliary sensors: {}", e)
        }

        let input = loc::InputData { odom, inertial, dt_s };
        let (output, _) = match loc.proc(&input) {
            Ok(o) => o,
            Err(e) => {
                error!("Sensing stopped: {}", e);
                shared.request_terminate();
                return (loc, Err(CoordError::Loc(e)))
            }
        };

        shared.publish_estimate(output.pose, output.velocity, aux.clone());

        if archive {
            if let Err(e) = loc.write() {
                warn!("Could not archive the estimate: {}", e);
            }
        }

        sleep_remaining(start, period);
    }

    debug!("Sensing finished");
    (loc, Ok(()))
}

fn comms<C: Channel>(
    shared: Arc<Shared>,
    mut link: ChannelLink<C>,
    rate_hz: f64
) -> Outcome<u64> {
    let period = Duration::from_secs_f64(1.0 / rate_hz);
    let mut exchanges = 0;

    // Stop count actuation must exceed before the link may be used again
    let mut await_stop: Option<u64> = None;

    let result = loop {
        // Another activity has failed
        if !shared.is_running() || shared.is_terminating() {
            link.close(false);
            break Ok(())
        }

        let start = Instant::now();

        if let Some(stops) = await_stop.take() {
            wait_for_stop(&shared, stops);
        }

        let snap = shared.snapshot();
        let record = TelemetryRecord {
            cycle: snap.generation,
            timestamp: Utc::now(),
            pose: snap.pose,
            velocity: snap.velocity,
            aux: snap.aux,
            ctrl_state: shared.ctrl_state(),
            safe: !shared.is_link_up()
        };

        match link.exchange(&record, start) {
            Ok(Exchange::Reply(msg)) => {
                exchanges += 1;
                if !shared.is_link_up() {
                    info!("Operator link up, resuming");
                    shared.set_link_up(true);
                }

                match msg {
                    PeerMsg::Goal { vx_ms, vy_ms } => {
                        shared.set_goal(GoalVelocity { vx_ms, vy_ms });
                    },
                    PeerMsg::Ack => (),
                    PeerMsg::Terminate => {
                        info!("Terminate recieved from the operator");
                        let stops = shared.safe_stops();
                        shared.request_terminate();
                        wait_for_stop(&shared, stops);
                        link.close(true);
                        break Ok(())
                    }
                }
            },
            Ok(Exchange::LinkLost(_)) => {
                shared.set_goal(GoalVelocity::default());
                await_stop = Some(shared.safe_stops());
                shared.set_link_up(false);
            },
            Ok(Exchange::Down) => (),
            Err(e) => {
                error!("{}", e);
                let stops = shared.safe_stops();
                shared.request_terminate();
                wait_for_stop(&shared, stops);
                link.close(false);
                break Err(CoordError::Link(e))
            }
        }

        sleep_remaining(start, period);
    };

    shared.stop_running();
    debug!("Comms finished");
    (exchanges, result)
}

fn actuation<D: Drive>(
    shared: Arc<Shared>,
    mut drive: D,
    mut nav_ctrl: NavCtrl,
    limits: SpeedLimits,
    rate_hz: f64,
    archive: bool
) -> Outcome<(NavCtrl, u64, Option<ActuationReport>)> {
    let period = Duration::from_secs_f64(1.0 / rate_hz);
    let mut cycles = 0;
    let mut last_report = None;

    let result = loop {
        if !shared.is_running() {
            break Ok(())
        }

        let start = Instant::now();

        if shared.is_terminating() || !shared.is_link_up() {
            if let Err(e) = drive.command_stop() {
                error!("Could not stop the drive: {}", e);
            }
            shared.note_safe_stop();
            shared.set_ctrl_state(ControllerState::Stopped);

            if shared.is_terminating() {
                break Ok(())
            }

            sleep_remaining(start, period);
            continue
        }

        // One copy of the estimate is used for the whole decision
        let snap = shared.snapshot();
        let input = nav_ctrl::InputData {
            goal: shared.goal(),
            pose: snap.pose
        };

        let (intent, report) = match nav_ctrl.proc(&input) {
            Ok(o) => o,
            Err(e) => break Err(CoordError::NavCtrl(e))
        };
        shared.set_ctrl_state(report.ctrl_state);

        if let Err(e) = apply_intent(&mut drive, intent, &limits) {
            break Err(CoordError::Drive(e))
        }

        cycles += 1;
        last_report = Some(ActuationReport {
            generation: snap.generation,
            ctrl_state: report.ctrl_state,
            intent
        });

        if archive {
            if let Err(e) = nav_ctrl.write() {
                warn!("Could not archive the controller status: {}", e);
            }
        }

        sleep_remaining(start, period);
    };

    // Whatever ended the activity the drive is left stopped
    if let Err(e) = drive.command_stop() {
        error!("Could not stop the drive: {}", e);
    }
    shared.note_safe_stop();

    if let Err(ref e) = result {
        error!("Actuation stopped: {}", e);
        shared.request_terminate();
        shared.stop_running();
    }

    debug!("Actuation finished");
    ((nav_ctrl, cycles, last_report), result)
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Start an activity, stopping any already running if it cannot be started.
fn spawn<F, T>(
    name: &'static str,
    shared: &Shared,
    f: F
) -> Result<JoinHandle<Outcome<T>>, CoordError>
where
    F: FnOnce() -> Outcome<T> + Send + 'static,
    T: Send + 'static
{
    thread::Builder::new()
        .name(name.into())
        .spawn(f)
        .map_err(|e| {
            error!("Could not start the {} activity: {}", name, e);
            shared.request_terminate();
            shared.stop_running();
            CoordError::ActivityNotStarted(name)
        })
}

/// Wait for an activity to end. An activity which was never started gives its start error.
fn join<T>(
    name: &'static str,
    jh: Result<JoinHandle<Outcome<T>>, CoordError>,
    shared: &Shared
) -> (Option<T>, Result<(), CoordError>) {
    let (out, result) = match jh {
        Ok(jh) => match jh.join() {
            Ok((out, result)) => (Some(out), result),
            Err(_) => (None, Err(CoordError::ActivityPanicked(name)))
        },
        Err(e) => (None, Err(e))
    };

    if result.is_err() {
        shared.request_terminate();
        shared.stop_running();
    }

    (out, result)
}

/// Block until actuation has issued a stop after `stops` was read, or everything is stopping.
fn wait_for_stop(shared: &Shared, stops: u64) {
    while shared.safe_stops() <= stops && shared.is_running() {
        thread::sleep(STOP_POLL_PERIOD);
    }
}

fn sleep_remaining(start: Instant, period: Duration) {
    if let Some(d) = period.checked_sub(start.elapsed()) {
        thread::sleep(d);
    }
}
