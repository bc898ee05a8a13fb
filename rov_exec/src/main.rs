//! Main robot-side executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise all modules
//!     - Main loop:
//!         - System input acquisition:
//!             - Odometry
//!             - Inertial sensing
//!             - Auxiliary sensors
//!         - Localisation processing
//!         - Telemetry and operator command exchange
//!         - Navigation control processing
//!         - Drive command issuing
//!
//! When the parameters select the multi-activity scheduling the same steps run as three
//! concurrent activities instead, see `rov_lib::activities`.
//!
//! # Modules
//!
//! All modules (e.g. `loc`) shall meet the following requirements:
//!     1. Provide a public struct implementing the `util::module::State` trait.
//!

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::{eyre, WrapErr}, Report};
use log::{debug, error, info};
use std::env;
use std::thread;
use std::time::Instant;

// Internal
use comms_if::net::{zmq, NetParams};
use rov_lib::{
    activities::{self, Rates},
    coordinator::{Coordinator, CycleOutcome},
    link::ChannelLink,
    loc::{self, LocMgr},
    nav_ctrl::{self, NavCtrl},
    op_client::{Channel, OpClient},
    params::{RovExecParams, Scheduling},
    script_channel::ScriptChannel,
    sim_robot::{SimRobot, SimRobotParams}
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    module::State,
    script_interpreter::ScriptInterpreter,
    session::Session
};

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {

    // ---- EARLY INITIALISATION ----

    color_eyre::install()?;

    // Initialise session
    let session = Session::new(
        "rov_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Robot Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let exec_params: RovExecParams = util::params::load_validated(
        "rov_exec.toml"
    ).wrap_err("Could not load exec params")?;
    let loc_params: loc::Params = util::params::load_validated(
        "loc.toml"
    ).wrap_err("Could not load loc params")?;
    let nav_ctrl_params: nav_ctrl::Params = util::params::load_validated(
        "nav_ctrl.toml"
    ).wrap_err("Could not load nav_ctrl params")?;
    let sim_robot_params: SimRobotParams = util::params::load_validated(
        "sim_robot.toml"
    ).wrap_err("Could not load sim_robot params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE OPERATOR CHANNEL ----

    // Collect all arguments
    let args: Vec<String> = env::args().collect();

    debug!("CLI arguments: {:?}", args);

    // If we have a single argument use it as the script path, otherwise connect to the operator
    let channel: Box<dyn Channel> = match args.len() {
        2 => {
            info!("Loading script from \"{}\"", &args[1]);

            let si = ScriptInterpreter::new(&args[1])
                .wrap_err("Failed to load script")?;

            info!(
                "Loaded script lasts {:.02} s and contains {} messages\n",
                si.get_duration(),
                si.get_num_msgs()
            );

            Box::new(ScriptChannel::new(si))
        },
        1 => {
            info!("No script provided, remote control via the OpClient will be used\n");

            let net_params: NetParams = util::params::load("net.toml")
                .wrap_err("Could not load net params")?;

            let zmq_ctx = zmq::Context::new();

            let client = OpClient::new(&zmq_ctx, &net_params, &exec_params.robot_id)
                .wrap_err("Failed to initialise the OpClient")?;
            info!("OpClient initialised");

            Box::new(client)
        },
        _ => return Err(eyre!(
            "Expected either zero or one argument, found {}", args.len() - 1
        ))
    };

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let arch_session = match exec_params.archive {
        true => Some(&session),
        false => None
    };

    let limits = nav_ctrl_params.speed_limits();

    let mut loc = LocMgr::default();
    loc.init(loc_params, arch_session)
        .wrap_err("Failed to initialise Loc")?;
    info!("Loc init complete");

    let mut nav_ctrl = NavCtrl::default();
    nav_ctrl.init(nav_ctrl_params, arch_session)
        .wrap_err("Failed to initialise NavCtrl")?;
    info!("NavCtrl init complete");

    let (_robot, sensors, drive) = SimRobot::new(sim_robot_params);
    info!("Simulated robot initialised");

    let link = ChannelLink::new(channel, exec_params.link.clone());

    info!("Module initialisation complete\n");

    // ---- MAIN LOOP ----

    let result = match exec_params.scheduling {
        Scheduling::Cooperative => {
            info!("Beginning cooperative main loop\n");

            let mut coord = Coordinator::new(
                sensors,
                drive,
                link,
                loc,
                nav_ctrl,
                limits,
                exec_params.cycle_rate_hz,
                exec_params.archive
            );

            let result = loop {
                let cycle_start_instant = Instant::now();

                // A failed cycle has already stopped the drive and closed the channel
                match coord.run_cycle() {
                    Ok(CycleOutcome::Continue) => (),
                    Ok(CycleOutcome::Terminated) => break Ok(()),
                    Err(e) => break Err(e)
                }

                // ---- CYCLE MANAGEMENT ----

                if let Some(d) = coord.cycle_end(Instant::now() - cycle_start_instant) {
                    thread::sleep(d);
                }
            };

            info!("Ran {} cycles", coord.data_store().num_cycles);
            save_estimate(&session, coord.data_store().loc.estimator_state());

            result
        },
        Scheduling::MultiActivity => {
            info!("Beginning concurrent activities\n");

            let rates = Rates {
                sensing_rate_hz: exec_params.sensing_rate_hz,
                comms_rate_hz: exec_params.cycle_rate_hz,
                actuation_rate_hz: exec_params.actuation_rate_hz
            };

            let finished = activities::run(
                sensors,
                drive,
                link,
                loc,
                nav_ctrl,
                limits,
                rates,
                exec_params.archive
            );

            save_estimate(&session, finished.loc.as_ref().and_then(|l| l.estimator_state()));

            finished.result
        }
    };

    // ---- SHUTDOWN ----

    if let Err(ref e) = result {
        error!("Execution failed: {}", e);
    }

    info!("End of execution");

    session.exit();

    result.wrap_err("The robot stopped on a fatal error")
}

/// Save the final state of the estimator into the session.
fn save_estimate(session: &Session, state: Option<&loc::EstimatorState>) {
    if let Some(state) = state {
        match serde_json::to_string(&state.pose()) {
            Ok(s) => info!("Final pose: {}", s),
            Err(e) => error!("Could not serialise the final pose: {}", e)
        }

        session.save("loc/final_state.json", state.clone());
    }
}
