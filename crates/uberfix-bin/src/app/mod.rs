//! Application wiring and command handlers.

mod commands;
mod maintenance;
mod state;

pub use commands::{
    run_broker, run_maps_load, run_maps_reset, run_maps_status, run_otp_purge,
    run_otp_send, run_otp_verify, run_reference, run_status,
};
pub use state::{AppState, Provider};
