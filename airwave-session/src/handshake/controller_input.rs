use tokio::sync::oneshot;

/// Commands sent to a running controller by its session.
#[derive(Debug)]
pub enum ControllerCommand {
    /// Close every peer and leave the loop. `ack` receives the number of
    /// peers that were closed.
    Shutdown { ack: oneshot::Sender<usize> },
}
