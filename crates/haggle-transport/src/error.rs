/// Errors raised while moving frames between the server and an agent.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection is gone, or was closed on this side.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// An agent could not reach the server.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Writing a frame failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Reading a frame failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding the listener or upgrading an accepted socket failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),
}
