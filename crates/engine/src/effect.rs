// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effects a flow asks its host to carry out

use kiln_core::{Address, Build, Command};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEffect {
    /// Send a command to the provider at `address`
    Dispatch { address: Address, command: Command },
    /// Hand a full build snapshot to the store
    PublishSnapshot(Build),
    /// The flow finished; evict it
    End(Build),
}

impl FlowEffect {
    pub fn name(&self) -> &'static str {
        match self {
            FlowEffect::Dispatch { .. } => "dispatch",
            FlowEffect::PublishSnapshot(_) => "publish_snapshot",
            FlowEffect::End(_) => "end",
        }
    }

    /// Key/value pairs for log lines
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            FlowEffect::Dispatch { address, command } => {
                let mut fields = vec![
                    ("build_id", command.build.id.to_string()),
                    ("address", address.to_string()),
                    ("token", command.token.to_string()),
                ];
                if let Some(phase) = &command.phase {
                    fields.push(("phase", phase.id.clone()));
                }
                fields
            }
            FlowEffect::PublishSnapshot(build) | FlowEffect::End(build) => vec![
                ("build_id", build.id.to_string()),
                ("status", build.status.to_string()),
            ],
        }
    }
}
