//! # Operator Console
//!
//! Command line console which serves goal velocities to the robot and shows its telemetry.
//!
//! Commands are typed at the prompt, for example:
//!
//! ```text
//! goal 1.0 -0.5
//! stop
//! status
//! terminate
//! ```

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Server the robot connects to.
mod op_server;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::{info, warn};
use rustyline::{error::ReadlineError, DefaultEditor};
use structopt::StructOpt;

// Internal
use comms_if::{
    net::{zmq, NetParams},
    op::OpCmd
};
use op_server::OpServer;
use util::logger::{logger_init_stdout, LevelFilter};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const PROMPT: &str = "op $ ";
const HISTORY_PATH: &str = "op_console_history.txt";

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    logger_init_stdout(LevelFilter::Info)
        .wrap_err("Failed to initialise logging")?;

    info!("Operator Console\n");

    let net_params: NetParams = util::params::load("net.toml")
        .wrap_err("Could not load net params")?;

    let ctx = zmq::Context::new();
    let server = OpServer::new(&ctx, &net_params)
        .wrap_err("Failed to start the operator server")?;

    let mut rl = DefaultEditor::new()
        .wrap_err("Failed to create the line editor")?;
    if rl.load_history(HISTORY_PATH).is_err() {
        info!("No history detected");
    }

    loop {
        let line = match rl.readline(PROMPT) {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                warn!("Unhandled error: {:?}", e);
                break
            }
        };

        if line.trim().is_empty() {
            continue
        }
        rl.add_history_entry(line.as_str()).ok();

        let cmd = match parse(&line) {
            Ok(c) => c,
            Err(e) => {
                println!("{}", e.message);
                continue
            }
        };

        match cmd.to_peer_msg() {
            Some(msg) => {
                info!("Sending {:?}", msg);
                server.command(msg);
            },
            None => match serde_json::to_string_pretty(&server.status()) {
                Ok(s) => println!("{}", s),
                Err(e) => warn!("Could not display the status: {}", e)
            }
        }
    }

    if let Err(e) = rl.save_history(HISTORY_PATH) {
        warn!("Could not save the history: {}", e);
    }

    info!("Exiting...");

    Ok(())
}

/// Parse one line typed by the operator.
fn parse(line: &str) -> std::result::Result<OpCmd, structopt::clap::Error> {
    OpCmd::from_iter_safe(std::iter::once("op").chain(line.split_whitespace()))
}
