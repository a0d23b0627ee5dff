//! Trait definitions with mockall annotations for testing
//!
//! The supervisor talks to its workers exclusively through [`Channel`]
//! trait objects and obtains them from a [`ChannelFactory`], so tests can
//! inject mock transports without touching the file system or sockets.

use shared::{ChannelKind, Message};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;

use crate::config::SupervisorSettings;
use crate::error::SupervisorResult;

/// Transport endpoint for one (process, transport kind) pair
///
/// Implementations use interior mutability: the supervisor shares each
/// channel between its main loop, monitors and senders as `Arc<dyn Channel>`.
/// After [`Channel::close`], `send` and `receive` fail with
/// `SupervisorError::ChannelClosed`.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Channel: Send + Sync {
    /// Transport kind of this channel
    fn kind(&self) -> ChannelKind;

    /// Acquire transport resources; safe to retry after a failure
    async fn initialize(&self) -> SupervisorResult<()>;

    /// Deliver one message to the worker
    async fn send(&self, message: &Message) -> SupervisorResult<()>;

    /// Wait up to `timeout` for one inbound message
    ///
    /// # Returns
    /// `Ok(None)` when the timeout elapsed without a message
    async fn receive(&self, timeout: Duration) -> SupervisorResult<Option<Message>>;

    /// Release every resource; calling it again is a no-op
    async fn close(&self);

    /// Environment variables a worker needs to locate this channel
    fn child_env(&self) -> Vec<(String, String)>;

    /// Whether the child must be spawned with piped stdin/stdout
    fn wants_stdio(&self) -> bool;

    /// Bind the channel to a freshly spawned child (called on every spawn)
    async fn attach(&self, child: &mut Child) -> SupervisorResult<()>;
}

/// Creates the channel for a requested transport kind
#[mockall::automock]
pub trait ChannelFactory: Send + Sync {
    /// Build an uninitialized channel for `process`
    fn create(&self, kind: ChannelKind, process: &str, settings: &SupervisorSettings) -> Arc<dyn Channel>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that mock traits can be instantiated and used as trait objects
    #[tokio::test]
    async fn test_mock_channel_as_trait_object() {
        let mut mock = MockChannel::new();
        mock.expect_kind().return_const(ChannelKind::Pipe);
        mock.expect_receive().returning(|_| Ok(None));

        let channel: Arc<dyn Channel> = Arc::new(mock);
        assert_eq!(channel.kind(), ChannelKind::Pipe);
        assert!(channel.receive(Duration::from_millis(1)).await.unwrap().is_none());

        let _factory = MockChannelFactory::new();
    }

    #[test]
    fn test_mock_factory_hands_out_channels() {
        let mut factory = MockChannelFactory::new();
        factory.expect_create().returning(|kind, _, _| {
            let mut channel = MockChannel::new();
            channel.expect_kind().return_const(kind);
            channel.expect_send().returning(|_| Ok(()));
            Arc::new(channel) as Arc<dyn Channel>
        });

        let channel = factory.create(ChannelKind::File, "worker", &SupervisorSettings::default());
        assert_eq!(channel.kind(), ChannelKind::File);

        let message = Message::heartbeat("supervisor", "worker");
        assert!(tokio_test::block_on(channel.send(&message)).is_ok());
    }
}
