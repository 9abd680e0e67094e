pub mod backend;
pub mod telemetry;
