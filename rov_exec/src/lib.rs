//! # Robot library.
//!
//! This library allows other crates in the workspace, and the integration tests, to access items
//! defined inside the robot crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Activities - runs sensing, comms and actuation concurrently
pub mod activities;

/// Cycle coordinator - runs one cooperative sense, estimate, communicate and act cycle
pub mod coordinator;

/// Data store for the cooperative cycle
pub mod data_store;

/// Equipment interfaces - the sensors and drive the robot is built from
pub mod eqpt;

/// Channel link - reconnection and backoff around the operator channel
pub mod link;

/// Localisation module - provides the robot with an idea of where it is in the world
pub mod loc;

/// Navigation control module - turns the operator's goal velocity into drive commands
pub mod nav_ctrl;

/// Operator client - exchanges telemetry for commands with the operator console
pub mod op_client;

/// Executable parameters
pub mod params;

/// Script channel - replays operator commands from a script file
pub mod script_channel;

/// State shared between the concurrent activities
pub mod shared;

/// Simulated robot - stands in for the sensors and drive
pub mod sim_robot;
