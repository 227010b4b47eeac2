pub mod commands;
pub mod handlers;

pub use commands::{CliArgs, Commands, DoctorArgs, RunArgs};
pub use handlers::{handle_doctor, handle_run};
