use thiserror::Error;

/// Failure talking to a device over its management session
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection to {address} failed: {reason}")]
    Connect { address: String, reason: String },
    #[error("Authentication failed for {user}@{address}")]
    Auth { user: String, address: String },
    #[error("Command '{command}' rejected: {output}")]
    Command { command: String, output: String },
    #[error("Session error: {0}")]
    Session(String),
}

/// Genuine faults of a provisioning run. Conflicts, denials and generation
/// failures are ordinary outcomes and never travel through this type.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Deployment failed on {device}: {source}")]
    Transport {
        device: String,
        #[source]
        source: TransportError,
    },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
