//! Shared harness for job client integration tests
//!
//! Builds a [`JobClient`] over a scripted transport, an in-memory handle slot
//! and a virtual clock, and records every terminal event it emits.

use std::sync::Arc;
use std::time::Duration;

use cloudscan_client::infra::testing::{StubTransport, VirtualTimeProvider};
use cloudscan_client::{
    CredentialArtifact, HandleSlot, JobClient, TerminalEvent,
};
use parking_lot::Mutex;

pub const INTERVAL: Duration = Duration::from_secs(2);

// Code is used by test modules, but not in every one of them
#[allow(unused)]
pub struct Harness {
    pub stub: StubTransport,
    pub clock: VirtualTimeProvider,
    pub client: JobClient,
    pub terminals: Arc<Mutex<Vec<TerminalEvent>>>,
}

#[allow(unused)]
impl Harness {
    pub fn new(stub: StubTransport, slot: Arc<dyn HandleSlot>) -> Self {
        Self::with_failure_limit(stub, slot, None)
    }

    pub fn with_failure_limit(
        stub: StubTransport,
        slot: Arc<dyn HandleSlot>,
        max_failures: Option<u32>,
    ) -> Self {
        let clock = VirtualTimeProvider::new();
        let client = JobClient::builder(Arc::new(stub.clone()))
            .handle_slot(slot)
            .time_provider(Arc::new(clock.clone()))
            .poll_interval(INTERVAL)
            .max_consecutive_failures(max_failures)
            .build();

        let terminals = Arc::new(Mutex::new(Vec::new()));
        client.on_terminal({
            let terminals = Arc::clone(&terminals);
            move |event| terminals.lock().push(event.clone())
        });

        Self {
            stub,
            clock,
            client,
            terminals,
        }
    }

    /// Let spawned tasks run until they block on the clock or the stub
    pub async fn settle(&self) {
        settle().await;
    }

    /// Fire one polling interval and let the tick complete
    pub async fn tick(&self) {
        self.clock.advance(INTERVAL);
        settle().await;
    }

    pub fn terminal_count(&self) -> usize {
        self.terminals.lock().len()
    }
}

pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

#[allow(unused)]
pub fn key_file() -> CredentialArtifact {
    CredentialArtifact::key_file(
        "service-account.json",
        br#"{"type":"service_account","project_id":"proj-a"}"#.to_vec(),
    )
}
