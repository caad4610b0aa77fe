// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! System manager.
//!
//! Collects `SystemComponentState` announcements and broadcasts
//! `SystemState` whenever a required component flips the overall state.

use std::collections::BTreeSet;

use crate::config::ManagerConfig;
use crate::messages::{
    Header, MessageProcessor, SystemComponentState, SystemState, SystemStateRequest,
};
use crate::service::{ServiceBase, ServiceHandler};

pub struct ManagerService {
    base: ServiceBase,
    required: BTreeSet<String>,
    started: BTreeSet<String>,
}

impl ManagerService {
    pub fn new(base: ServiceBase, config: &ManagerConfig) -> Self {
        Self {
            base,
            required: config.required.iter().cloned().collect(),
            started: BTreeSet::new(),
        }
    }

    /// `true` when every required component has announced itself.
    pub fn is_system_started(&self) -> bool {
        self.required.is_subset(&self.started)
    }

    fn broadcast(&self, started: bool, reason: &str) {
        log::info!(
            "[manager] system {}{}",
            if started { "started" } else { "stopped" },
            if reason.is_empty() {
                String::new()
            } else {
                format!(" by '{}'", reason)
            }
        );
        self.base.out().send(SystemState {
            started,
            reason: reason.to_string(),
        });
    }
}

impl MessageProcessor for ManagerService {
    fn on_system_component_state(&mut self, header: Header, body: SystemComponentState) {
        let component = header.sender;
        let is_required = self.required.contains(&component);

        if body.started {
            self.started.insert(component.clone());
            log::debug!("[manager] '{}' started", component);
            if is_required && self.is_system_started() {
                self.broadcast(true, "");
            }
        } else {
            self.started.remove(&component);
            log::debug!("[manager] '{}' stopped", component);
            if is_required && !self.is_system_started() {
                self.broadcast(false, &component);
            }
        }
    }

    fn on_system_state_request(&mut self, header: Header, _body: SystemStateRequest) {
        self.base.out().respond(
            &header,
            SystemState {
                started: self.is_system_started(),
                reason: String::new(),
            },
        );
    }

    fn on_system_state(&mut self, _header: Header, _body: SystemState) {}
}

impl ServiceHandler for ManagerService {
    fn base(&self) -> &ServiceBase {
        &self.base
    }
}
