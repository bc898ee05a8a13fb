//! Generic parameters functions
//!
//! Parameter files are TOML documents stored in `$ROV_SW_ROOT/params`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::fs::read_to_string;
use thiserror::Error;
use toml;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A parameter structure which can check its own consistency after loading.
pub trait Validate {
    /// Return an error describing the first invalid parameter found.
    fn validate(&self) -> Result<(), InvalidParam>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A single parameter which failed validation.
#[derive(Debug, Error)]
#[error("Parameter `{name}` is invalid: {reason}")]
pub struct InvalidParam {
    pub name: &'static str,
    pub reason: String
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("The software root environment variable (ROV_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot load the parmeter file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Cannot read the parameter file: {0}")]
    DeserialiseError(toml::de::Error),

    #[error("{0}")]
    Invalid(InvalidParam)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl InvalidParam {
    pub fn new<S: Into<String>>(name: &'static str, reason: S) -> Self {
        Self {
            name,
            reason: reason.into()
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file
///
/// The file path is relative to the "$ROV_SW_ROOT/params" directory
pub fn load<P>(param_file_path: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned
{
    // Get the params dir
    let mut path = crate::host::get_sw_root()
        .map_err(|_| LoadError::SwRootNotSet)?;
    path.push("params");
    path.push(param_file_path);

    // Load the file into a string
    let params_str = read_to_string(path)
        .map_err(LoadError::FileLoadError)?;

    from_str(&params_str)
}

/// Load a parameter file and check it is consistent.
pub fn load_validated<P>(param_file_path: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned + Validate
{
    let params: P = load(param_file_path)?;
    params.validate().map_err(LoadError::Invalid)?;
    Ok(params)
}

/// Parse parameters from a TOML string.
pub fn from_str<P>(params_str: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned
{
    toml::from_str(params_str).map_err(LoadError::DeserialiseError)
}

/// Check that a parameter is finite and strictly positive.
pub fn check_positive(name: &'static str, value: f64) -> Result<(), InvalidParam> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    }
    else {
        Err(InvalidParam::new(name, format!("expected a positive value, found {}", value)))
    }
}

/// Check that a parameter is finite and not negative.
pub fn check_non_negative(name: &'static str, value: f64) -> Result<(), InvalidParam> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    }
    else {
        Err(InvalidParam::new(name, format!("expected a non-negative value, found {}", value)))
    }
}
