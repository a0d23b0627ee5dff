//! Test helpers: polling utilities and mock transports

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use supervisor::traits::{MockChannel, MockChannelFactory};
use supervisor::{Channel, ChannelKind, Message, ProcessState, Supervisor};

use super::fixtures::TestFixtures;

pub struct TestHelpers;

impl TestHelpers {
    /// Poll `check` every few milliseconds until it holds or `timeout` elapses
    pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if check().await {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub async fn wait_for_state(supervisor: &Supervisor, name: &str, state: ProcessState) -> bool {
        Self::wait_until(TestFixtures::WAIT, move || async move {
            supervisor.process_state(name).await == Some(state)
        })
        .await
    }

    pub async fn pid_of(supervisor: &Supervisor, name: &str) -> Option<u32> {
        supervisor.snapshot(name).await.and_then(|snapshot| snapshot.pid)
    }
}

/// Inbound queue and outbound log of one mock channel
#[derive(Clone, Default)]
pub struct ChannelProbe {
    pub inbound: Arc<Mutex<VecDeque<Message>>>,
    pub sent: Arc<Mutex<Vec<Message>>>,
    pub closed: Arc<Mutex<usize>>,
}

impl ChannelProbe {
    pub fn push_inbound(&self, message: Message) {
        self.inbound.lock().unwrap().push_back(message);
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        *self.closed.lock().unwrap()
    }
}

/// Builds mock channel factories backed by [`ChannelProbe`]s
pub struct MockTransport;

impl MockTransport {
    /// Mock channel that serves `probe.inbound` and records what it is sent
    pub fn channel(kind: ChannelKind, probe: &ChannelProbe) -> MockChannel {
        let mut channel = MockChannel::new();
        channel.expect_kind().return_const(kind);
        channel.expect_initialize().returning(|| Ok(()));
        channel.expect_child_env().returning(Vec::new);
        channel.expect_wants_stdio().return_const(false);
        channel.expect_attach().returning(|_| Ok(()));

        let inbound = probe.inbound.clone();
        channel
            .expect_receive()
            .returning(move |_| Ok(inbound.lock().unwrap().pop_front()));

        let sent = probe.sent.clone();
        channel.expect_send().returning(move |message| {
            sent.lock().unwrap().push(message.clone());
            Ok(())
        });

        let closed = probe.closed.clone();
        channel.expect_close().returning(move || {
            *closed.lock().unwrap() += 1;
        });
        channel
    }

    /// Factory handing every process a channel wired to the same probe
    pub fn factory(probe: &ChannelProbe) -> MockChannelFactory {
        let probe = probe.clone();
        let mut factory = MockChannelFactory::new();
        factory
            .expect_create()
            .returning(move |kind, _, _| Arc::new(Self::channel(kind, &probe)) as Arc<dyn Channel>);
        factory
    }

    /// Factory whose channels all fail to initialize
    pub fn failing_factory(probe: &ChannelProbe) -> MockChannelFactory {
        let closed = probe.closed.clone();
        let mut factory = MockChannelFactory::new();
        factory.expect_create().returning(move |kind, _, _| {
            let mut channel = MockChannel::new();
            channel.expect_kind().return_const(kind);
            channel
                .expect_initialize()
                .returning(move || Err(supervisor::SupervisorError::channel(kind, "listener unavailable")));
            let closed = closed.clone();
            channel.expect_close().returning(move || {
                *closed.lock().unwrap() += 1;
            });
            Arc::new(channel) as Arc<dyn Channel>
        });
        factory
    }
}
