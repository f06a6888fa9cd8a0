pub mod config;
pub mod error;
pub mod handshake;
pub mod logging;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod transport;

pub use config::AirwaveConfig;
pub use error::{SessionError, SessionResult};
pub use media::{
    CaptureConstraints, MediaError, MediaSource, MicrophoneSource, PacketCounterSink,
    PlaylistSource, TrackSink,
};
pub use session::{Role, SessionManager, SessionStatus};
pub use signaling::{BusError, MemoryBus, PgSignalBus, SignalBus};
pub use transport::TransportConfig;
