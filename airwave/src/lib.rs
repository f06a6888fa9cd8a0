pub use airwave_core::model::{PeerId, RoomId, SignalKind, SignalingMessage};

pub mod model {
    pub use airwave_core::model::*;
}

#[cfg(feature = "session")]
pub mod session {
    pub use airwave_session::*;
}
