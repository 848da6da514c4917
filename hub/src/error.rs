use thiserror::Error;

use lumen_shared::{CodecError, MessageParseError};

use crate::batch::BatchError;
use crate::ota::OtaError;
use crate::registry::RegistryError;

/// Top-level hub error. Everything a transport callback or operator
/// call can fail with funnels into this so the event queue carries one
/// type.
#[derive(Debug, Error)]
pub enum HubError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Ota(#[from] OtaError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Parse(#[from] MessageParseError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Outbound queue is gone; the transport side hung up
    #[error("Cannot send control message; the transport task has shut down")]
    SendError,

    /// Inbound queue is gone; the transport side hung up
    #[error("Cannot receive control events; the transport task has shut down")]
    RecvError,
}
