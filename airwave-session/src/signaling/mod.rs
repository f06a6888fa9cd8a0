mod memory_bus;
mod pg_bus;
mod retention;
mod signal_bus;

pub use memory_bus::*;
pub use pg_bus::*;
pub use retention::*;
pub use signal_bus::*;
