pub mod alarm;
pub mod climate;
pub mod commands;
pub mod gateway;
pub mod modes;
pub mod output;
pub mod packed;
pub mod shell;
pub mod telemetry;
