pub mod cooldown;
pub mod event;
pub mod gate;
pub mod sync;
pub mod telemetry;
pub mod time;
