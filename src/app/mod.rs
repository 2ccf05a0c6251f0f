//! Process-level wiring: console, timers and the runtime loop

pub mod console;
pub mod runtime;
pub mod ticker;

pub use runtime::ClientRuntime;
pub use ticker::TimerDriver;
