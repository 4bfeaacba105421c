//! Check that a TensorDock API key/token pair is valid.
//!
//! Reads `TENSORDOCK_API_KEY` and `TENSORDOCK_API_TOKEN` (plus the optional
//! `TENSORDOCK_BASE_URL` / `TENSORDOCK_TIMEOUT_SECS`), calls `auth/test` in
//! debug mode and exits non-zero if the call fails.

use std::process::ExitCode;

use tensordock_core::{ClientConfig, Credentials, TensorDock};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let credentials = match Credentials::from_env() {
        Ok(credentials) => credentials,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let config = match ClientConfig::from_env() {
        Ok(config) => config.with_debug(true),
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let api = TensorDock::with_config(credentials, config);
    match api.test_authorization() {
        Ok(reply) if reply["success"] == true => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}
