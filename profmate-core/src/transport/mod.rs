//! Duplex channel to the model endpoint.
//!
//! The session talks to a [`LiveChannel`] obtained from a
//! [`ChannelConnector`]. The uplink and downlink tasks share one channel, so
//! every method takes `&self`; implementations guard each direction
//! separately.

pub mod gemini;
pub mod protocol;

use std::sync::Arc;

use async_trait::async_trait;

pub use gemini::GeminiConnector;
pub use protocol::{Modality, ServerMessage, SetupRequest};

use crate::{codec::MediaBlob, error::Result};

/// An open duplex session with the model endpoint.
#[async_trait]
pub trait LiveChannel: Send + Sync {
    /// Push one realtime media chunk. Returns `ChannelClosed` once the
    /// channel has shut down.
    async fn send_realtime_input(&self, blob: MediaBlob) -> Result<()>;

    /// Next message from the endpoint, or `None` once the channel is closed.
    async fn next_message(&self) -> Option<Result<ServerMessage>>;

    /// Close the channel. Channels without an explicit close keep this
    /// default.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Opens [`LiveChannel`]s. Resolves once the endpoint acknowledged setup.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn open(&self, setup: &SetupRequest) -> Result<Arc<dyn LiveChannel>>;
}
