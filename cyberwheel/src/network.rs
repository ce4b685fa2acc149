// src/network.rs
//
// Network model: hosts, subnets and the flags the engagement mutates.
//
// Hosts are stored in a flat arena and addressed by index. Base hosts come
// from the configuration and occupy the first `num_base_hosts` slots; decoys
// deployed during an episode are appended after them. A removed decoy stays
// in the arena (detached) until the next reset so that names and indices
// handed out earlier in the episode remain valid.
//
// Invariants:
// - `num_decoys` equals the sum of per-subnet `DecoyState::current`.
// - `DecoyState::current <= DecoyState::max` for every subnet.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::NetworkSpec;
use crate::types::HostType;

/// A single host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    pub host_type: HostType,
    /// Index of the owning subnet.
    pub subnet: usize,
    pub decoy: bool,
    /// Impacted by the attacker.
    pub compromised: bool,
    pub isolated: bool,
    /// False once a decoy has been removed from its subnet.
    pub attached: bool,
    pub services: Vec<String>,
    pub vulnerabilities: Vec<String>,
}

/// Decoy bookkeeping for one subnet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoyState {
    pub current: usize,
    pub max: usize,
    /// Names of decoys currently deployed, oldest first.
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subnet {
    pub name: String,
    /// Indices of attached hosts, base hosts first then decoys.
    pub hosts: Vec<usize>,
    pub decoys: DecoyState,
}

/// Graph of hosts and subnets owned by one environment.
#[derive(Debug, Clone)]
pub struct NetworkModel {
    name: String,
    hosts: Vec<Host>,
    subnets: Vec<Subnet>,
    host_index: HashMap<String, usize>,
    subnet_index: HashMap<String, usize>,
    num_base_hosts: usize,
    num_decoys: usize,
}

impl NetworkModel {
    /// Build a network from a validated layout.
    pub fn build(spec: &NetworkSpec, subnet_decoy_max: usize) -> Self {
        let mut hosts = Vec::new();
        let mut subnets = Vec::with_capacity(spec.subnets.len());
        let mut host_index = HashMap::new();
        let mut subnet_index = HashMap::new();

        for (s_idx, subnet_spec) in spec.subnets.iter().enumerate() {
            let mut members = Vec::with_capacity(subnet_spec.hosts.len());
            for host_spec in &subnet_spec.hosts {
                let idx = hosts.len();
                host_index.insert(host_spec.name.clone(), idx);
                members.push(idx);
                hosts.push(Host {
                    name: host_spec.name.clone(),
                    host_type: host_spec.host_type,
                    subnet: s_idx,
                    decoy: false,
                    compromised: false,
                    isolated: false,
                    attached: true,
                    services: host_spec.services.clone(),
                    vulnerabilities: host_spec.vulnerabilities.clone(),
                });
            }
            subnet_index.insert(subnet_spec.name.clone(), s_idx);
            subnets.push(Subnet {
                name: subnet_spec.name.clone(),
                hosts: members,
                decoys: DecoyState {
                    current: 0,
                    max: subnet_decoy_max,
                    ids: Vec::new(),
                },
            });
        }

        let num_base_hosts = hosts.len();
        Self {
            name: spec.name.clone(),
            hosts,
            subnets,
            host_index,
            subnet_index,
            num_base_hosts,
            num_decoys: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drop all decoys and clear every host flag.
    pub fn reset(&mut self) {
        for host in self.hosts.drain(self.num_base_hosts..) {
            self.host_index.remove(&host.name);
        }
        for host in &mut self.hosts {
            host.compromised = false;
            host.isolated = false;
            host.attached = true;
        }
        let base = self.num_base_hosts;
        for subnet in &mut self.subnets {
            subnet.hosts.retain(|&idx| idx < base);
            subnet.decoys.current = 0;
            subnet.decoys.ids.clear();
        }
        self.num_decoys = 0;
    }

    // --- Lookups -----------------------------------------------------------

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn host(&self, idx: usize) -> &Host {
        &self.hosts[idx]
    }

    pub fn host_idx(&self, name: &str) -> Option<usize> {
        self.host_index.get(name).copied()
    }

    pub fn host_by_name(&self, name: &str) -> Option<&Host> {
        self.host_idx(name).map(|idx| &self.hosts[idx])
    }

    pub fn subnets(&self) -> &[Subnet] {
        &self.subnets
    }

    pub fn subnet(&self, idx: usize) -> &Subnet {
        &self.subnets[idx]
    }

    pub fn subnet_idx(&self, name: &str) -> Option<usize> {
        self.subnet_index.get(name).copied()
    }

    pub fn num_subnets(&self) -> usize {
        self.subnets.len()
    }

    /// Hosts ever present this episode, including detached decoys.
    pub fn num_hosts(&self) -> usize {
        self.hosts.len()
    }

    pub fn num_base_hosts(&self) -> usize {
        self.num_base_hosts
    }

    /// Attached hosts in a subnet that are reachable (not isolated).
    pub fn reachable_in_subnet(&self, subnet: usize) -> impl Iterator<Item = usize> + '_ {
        self.subnets[subnet]
            .hosts
            .iter()
            .copied()
            .filter(move |&idx| !self.hosts[idx].isolated)
    }

    /// Every attached, non-isolated host, subnet by subnet.
    pub fn reachable_hosts(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.subnets.len()).flat_map(move |s| self.reachable_in_subnet(s))
    }

    // --- Aggregates --------------------------------------------------------

    pub fn num_decoys(&self) -> usize {
        self.num_decoys
    }

    pub fn num_compromised_decoys(&self) -> usize {
        self.hosts
            .iter()
            .filter(|h| h.decoy && h.attached && h.compromised)
            .count()
    }

    pub fn num_isolated(&self) -> usize {
        self.hosts.iter().filter(|h| h.isolated).count()
    }

    /// Non-decoy host names with the given role, in declaration order.
    pub fn hosts_of_type(&self, host_type: HostType) -> Vec<&str> {
        self.hosts[..self.num_base_hosts]
            .iter()
            .filter(|h| h.host_type == host_type)
            .map(|h| h.name.as_str())
            .collect()
    }

    pub fn server_hosts(&self) -> Vec<&str> {
        self.hosts_of_type(HostType::Server)
    }

    pub fn user_hosts(&self) -> Vec<&str> {
        self.hosts_of_type(HostType::Workstation)
    }

    /// Uniformly pick a non-decoy host with the given role.
    pub fn random_host<R: Rng + ?Sized>(&self, host_type: HostType, rng: &mut R) -> Option<&str> {
        self.hosts_of_type(host_type).choose(rng).copied()
    }

    pub fn random_user_host<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        self.random_host(HostType::Workstation, rng)
    }

    // --- Mutation ----------------------------------------------------------

    /// Whether a subnet can take another decoy.
    pub fn subnet_has_room(&self, subnet: usize) -> bool {
        let state = &self.subnets[subnet].decoys;
        state.current < state.max
    }

    /// Attach a new decoy host to a subnet and return its index.
    ///
    /// Capacity checks are the caller's job; this only keeps the counts
    /// consistent.
    pub fn add_decoy(
        &mut self,
        subnet: usize,
        name: String,
        host_type: HostType,
        services: Vec<String>,
    ) -> usize {
        let idx = self.hosts.len();
        self.host_index.insert(name.clone(), idx);
        self.hosts.push(Host {
            name: name.clone(),
            host_type,
            subnet,
            decoy: true,
            compromised: false,
            isolated: false,
            attached: true,
            services,
            vulnerabilities: Vec::new(),
        });
        let s = &mut self.subnets[subnet];
        s.hosts.push(idx);
        s.decoys.current += 1;
        s.decoys.ids.push(name);
        self.num_decoys += 1;
        self.debug_check_decoys();
        idx
    }

    /// Detach a decoy from its subnet. Returns false if it is not deployed there.
    pub fn detach_decoy(&mut self, subnet: usize, name: &str) -> bool {
        let s = &mut self.subnets[subnet];
        let Some(pos) = s.decoys.ids.iter().position(|id| id == name) else {
            return false;
        };
        s.decoys.ids.remove(pos);
        s.decoys.current -= 1;
        if let Some(idx) = self.host_index.get(name).copied() {
            s.hosts.retain(|&h| h != idx);
            self.hosts[idx].attached = false;
        }
        self.num_decoys -= 1;
        self.debug_check_decoys();
        true
    }

    pub fn set_isolated(&mut self, idx: usize, isolated: bool) {
        self.hosts[idx].isolated = isolated;
    }

    pub fn mark_compromised(&mut self, idx: usize) {
        self.hosts[idx].compromised = true;
    }

    fn debug_check_decoys(&self) {
        debug_assert_eq!(
            self.num_decoys,
            self.subnets.iter().map(|s| s.decoys.current).sum::<usize>(),
            "global decoy count out of sync with subnets"
        );
        debug_assert!(self.subnets.iter().all(|s| s.decoys.current <= s.decoys.max));
    }
}
