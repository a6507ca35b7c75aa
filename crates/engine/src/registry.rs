// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider discovery and ordering
//!
//! Providers are registered once, explicitly, at startup. For each
//! capability they are stably sorted by declared order (ties keep
//! registration order). The resulting chains fix, for the life of the
//! process, how many providers a pass expects and where the Nth one lives.

use crate::provider::Provider;
use kiln_core::{Address, Capability};
use std::collections::HashMap;
use std::sync::Arc;

/// Ordered mailbox addresses per capability
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderChains {
    setup: Vec<Address>,
    run_phase: Vec<Address>,
    tear_down: Vec<Address>,
}

impl ProviderChains {
    /// Chains from bare orders, sorted the same way providers are
    pub fn from_orders(setup: &[i32], run_phase: &[i32], tear_down: &[i32]) -> Self {
        Self {
            setup: sorted_addresses(Capability::Setup, setup.to_vec()),
            run_phase: sorted_addresses(Capability::RunPhase, run_phase.to_vec()),
            tear_down: sorted_addresses(Capability::TearDown, tear_down.to_vec()),
        }
    }

    pub fn chain(&self, capability: Capability) -> &[Address] {
        match capability {
            Capability::Setup => &self.setup,
            Capability::RunPhase => &self.run_phase,
            Capability::TearDown => &self.tear_down,
        }
    }

    pub fn count(&self, capability: Capability) -> usize {
        self.chain(capability).len()
    }

    /// Address of the provider at position `n` of the chain
    pub fn address(&self, capability: Capability, n: usize) -> Option<Address> {
        self.chain(capability).get(n).copied()
    }
}

fn sorted_addresses(capability: Capability, mut orders: Vec<i32>) -> Vec<Address> {
    orders.sort();
    orders
        .into_iter()
        .enumerate()
        .map(|(rank, order)| Address {
            capability,
            order,
            rank,
        })
        .collect()
}

/// Every registered provider, indexed by the mailbox it serves
pub struct ProviderRegistry {
    slots: HashMap<Address, Arc<dyn Provider>>,
    chains: Arc<ProviderChains>,
    names: Vec<String>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        let mut slots = HashMap::new();
        let mut chains = ProviderChains::default();

        for capability in Capability::ALL {
            let mut serving: Vec<&Arc<dyn Provider>> =
                providers.iter().filter(|p| p.serves(capability)).collect();
            // sort_by_key is stable: equal orders keep registration order
            serving.sort_by_key(|p| p.order());

            let mut addresses = Vec::with_capacity(serving.len());
            for (rank, provider) in serving.into_iter().enumerate() {
                let address = Address {
                    capability,
                    order: provider.order(),
                    rank,
                };
                tracing::debug!(
                    provider = provider.name(),
                    capability = %capability,
                    order = address.order,
                    rank,
                    "registered provider"
                );
                slots.insert(address, Arc::clone(provider));
                addresses.push(address);
            }

            match capability {
                Capability::Setup => chains.setup = addresses,
                Capability::RunPhase => chains.run_phase = addresses,
                Capability::TearDown => chains.tear_down = addresses,
            }
        }

        Self {
            slots,
            chains: Arc::new(chains),
            names: providers.iter().map(|p| p.name().to_string()).collect(),
        }
    }

    pub fn chains(&self) -> Arc<ProviderChains> {
        Arc::clone(&self.chains)
    }

    pub fn provider(&self, address: &Address) -> Option<&Arc<dyn Provider>> {
        self.slots.get(address)
    }

    /// Every (address, provider) pair, one per capability served
    pub fn slots(&self) -> impl Iterator<Item = (Address, Arc<dyn Provider>)> + '_ {
        self.slots.iter().map(|(a, p)| (*a, Arc::clone(p)))
    }

    /// Provider names in registration order
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
