mod controller;
mod controller_input;
mod filter;

pub use controller::*;
pub use controller_input::*;
pub use filter::*;
