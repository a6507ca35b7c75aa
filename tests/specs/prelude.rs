// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness: a real bus hosting fake providers, driven by a real engine

pub use chrono::Utc;
pub use kiln_adapters::{ContainerCall, FakeContainerAdapter, FakeSnapshotStore};
pub use kiln_core::{Build, BuildId, Phase, Status, SystemClock};
pub use kiln_engine::{
    Bus, Engine, EngineConfig, EngineDeps, EngineError, FakeProvider, Provider, ProviderRegistry,
};
pub use std::sync::Arc;
pub use std::time::Duration;

use tokio::sync::broadcast;

/// Upper bound for anything these tests wait on
pub const WAIT: Duration = Duration::from_secs(5);

pub type TestEngine = Engine<Bus, FakeSnapshotStore, FakeContainerAdapter, SystemClock>;

pub struct Pipeline {
    pub engine: Arc<TestEngine>,
    pub store: FakeSnapshotStore,
    pub containers: FakeContainerAdapter,
    ends: broadcast::Receiver<Build>,
}

impl Pipeline {
    /// Launch providers on a fresh bus. Must run inside a tokio runtime.
    pub fn with(providers: &[FakeProvider]) -> Self {
        let providers: Vec<Arc<dyn Provider>> = providers
            .iter()
            .map(|p| Arc::new(p.clone()) as Arc<dyn Provider>)
            .collect();
        let registry = ProviderRegistry::new(providers);
        let (bus, inbox) = Bus::launch(&registry);

        let store = FakeSnapshotStore::new();
        let containers = FakeContainerAdapter::new();
        let engine = Arc::new(Engine::new(
            EngineDeps {
                dispatch: bus,
                store: store.clone(),
                containers: containers.clone(),
            },
            registry.chains(),
            SystemClock,
            EngineConfig::default(),
        ));
        tokio::spawn(Arc::clone(&engine).run(inbox));
        let ends = engine.subscribe_flow_end();

        Self {
            engine,
            store,
            containers,
            ends,
        }
    }

    pub async fn start(&self, id: &str) -> BuildId {
        let build_id = BuildId::from(id);
        self.engine
            .start(build_id.clone(), parked(id), Some("make all".into()))
            .await
            .unwrap();
        build_id
    }

    /// Next build whose flow ended
    pub async fn finished(&mut self) -> Build {
        tokio::time::timeout(WAIT, self.ends.recv())
            .await
            .expect("no flow ended in time")
            .unwrap()
    }

    /// Poll the active flow until its build satisfies `check`
    pub async fn wait_until(&self, id: &BuildId, check: impl Fn(&Build) -> bool) -> Build {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            if let Some(build) = self.engine.snapshot(id).await {
                if check(&build) {
                    return build;
                }
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "build {id} never reached the expected state"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

/// Poll until `check` holds, failing the test after [`WAIT`]
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn parked(id: &str) -> Build {
    Build::new(id, Utc::now()).unwrap()
}

pub fn stage(ids: &[&str]) -> Vec<Phase> {
    ids.iter().map(|id| Phase::new(*id, *id).unwrap()).collect()
}

pub fn statuses(build: &Build) -> Vec<(String, Status)> {
    build
        .phases
        .iter()
        .map(|p| (p.id.clone(), p.status))
        .collect()
}

/// Token numbers of every command a provider received, in arrival order
pub fn tokens(provider: &FakeProvider) -> Vec<u64> {
    provider.calls().iter().map(|c| c.token.0).collect()
}
