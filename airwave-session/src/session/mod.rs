mod session_manager;
mod session_status;

pub use session_manager::*;
pub use session_status::*;
