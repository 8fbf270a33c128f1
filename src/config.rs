// Copyright 2023 litep2p developers
// Copyright 2026 reachnet developers
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Per-subsystem configuration, one builder each, mirroring how transports
//! and protocols are configured upstream.

use std::time::Duration;

/// Address-management protocol scheduler knobs.
#[derive(Debug, Clone)]
pub struct AddrMgmtConfig {
    pub refresh_interval: Duration,
    pub cleanup_interval: Duration,
    pub notify_timeout: Duration,
    pub max_neighbors: usize,
    pub require_signature: bool,
}

impl Default for AddrMgmtConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(60),
            notify_timeout: Duration::from_secs(5),
            max_neighbors: 8,
            require_signature: true,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct AddrMgmtConfigBuilder {
    config: AddrMgmtConfig,
}

impl AddrMgmtConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.config.refresh_interval = interval;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.config.cleanup_interval = interval;
        self
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.config.notify_timeout = timeout;
        self
    }

    pub fn with_max_neighbors(mut self, max: usize) -> Self {
        self.config.max_neighbors = max;
        self
    }

    /// Debug/test posture: accept `refresh_notify` without a trailing key.
    pub fn allow_unsigned(mut self) -> Self {
        self.config.require_signature = false;
        self
    }

    pub fn build(self) -> AddrMgmtConfig {
        self.config
    }
}

/// Reachability coordinator knobs.
#[derive(Debug, Clone)]
pub struct ReachabilityConfig {
    pub min_witnesses: usize,
    pub witness_report_expiry: Duration,
    pub disconnect_protection: Duration,
}

impl Default for ReachabilityConfig {
    fn default() -> Self {
        Self {
            min_witnesses: 2,
            witness_report_expiry: Duration::from_secs(600),
            disconnect_protection: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ReachabilityConfigBuilder {
    config: ReachabilityConfig,
}

impl ReachabilityConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_witnesses(mut self, count: usize) -> Self {
        self.config.min_witnesses = count;
        self
    }

    pub fn with_witness_report_expiry(mut self, ttl: Duration) -> Self {
        self.config.witness_report_expiry = ttl;
        self
    }

    pub fn with_disconnect_protection(mut self, window: Duration) -> Self {
        self.config.disconnect_protection = window;
        self
    }

    pub fn build(self) -> ReachabilityConfig {
        self.config
    }
}

/// Endpoint dial/accept engine knobs.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub dial_timeout: Duration,
    pub max_connections: usize,
    pub accept_queue_size: usize,
    pub rate_limit_per_sec: u32,
    pub rate_limit_burst: u32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(10),
            max_connections: 512,
            accept_queue_size: 16,
            rate_limit_per_sec: 20,
            rate_limit_burst: 40,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct EndpointConfigBuilder {
    config: EndpointConfig,
}

impl EndpointConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.config.dial_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    pub fn with_accept_queue_size(mut self, size: usize) -> Self {
        self.config.accept_queue_size = size;
        self
    }

    pub fn with_rate_limit(mut self, per_sec: u32, burst: u32) -> Self {
        self.config.rate_limit_per_sec = per_sec;
        self.config.rate_limit_burst = burst;
        self
    }

    pub fn build(self) -> EndpointConfig {
        self.config
    }
}

/// Discovery façade knobs.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub advertise_timeout: Duration,
    pub max_recursion_depth: usize,
    pub peer_cache_ttl: Duration,
    pub peer_cache_capacity: usize,
    pub bootstrap_observation_window: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            advertise_timeout: Duration::from_secs(10),
            max_recursion_depth: 3,
            peer_cache_ttl: Duration::from_secs(600),
            peer_cache_capacity: 4096,
            bootstrap_observation_window: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct DiscoveryConfigBuilder {
    config: DiscoveryConfig,
}

impl DiscoveryConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_advertise_timeout(mut self, timeout: Duration) -> Self {
        self.config.advertise_timeout = timeout;
        self
    }

    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.config.max_recursion_depth = depth;
        self
    }

    pub fn with_peer_cache(mut self, ttl: Duration, capacity: usize) -> Self {
        self.config.peer_cache_ttl = ttl;
        self.config.peer_cache_capacity = capacity;
        self
    }

    pub fn build(self) -> DiscoveryConfig {
        self.config
    }
}

/// Address-manager daemon knobs.
#[derive(Debug, Clone)]
pub struct AddressManagerConfig {
    pub refresh_interval: Duration,
    pub stun_timeout: Duration,
    pub discovery_budget: Duration,
    pub user_configured: Vec<String>,
    pub enable_upnp: bool,
}

impl Default for AddressManagerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(900),
            stun_timeout: Duration::from_secs(10),
            discovery_budget: Duration::from_secs(15),
            user_configured: Vec::new(),
            enable_upnp: true,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct AddressManagerConfigBuilder {
    config: AddressManagerConfig,
}

impl AddressManagerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.config.refresh_interval = interval;
        self
    }

    pub fn with_user_configured_address(mut self, addr: impl Into<String>) -> Self {
        self.config.user_configured.push(addr.into());
        self
    }

    pub fn with_upnp(mut self, enabled: bool) -> Self {
        self.config.enable_upnp = enabled;
        self
    }

    pub fn build(self) -> AddressManagerConfig {
        self.config
    }
}

/// Top-level configuration aggregating every subsystem builder, mirroring
/// the top-level config object that wires transports and protocols together.
#[derive(Debug, Clone, Default)]
pub struct ReachnetConfig {
    pub addr_mgmt: AddrMgmtConfig,
    pub reachability: ReachabilityConfig,
    pub endpoint: EndpointConfig,
    pub discovery: DiscoveryConfig,
    pub address_manager: AddressManagerConfig,
}

#[derive(Debug, Default)]
pub struct ReachnetConfigBuilder {
    config: ReachnetConfig,
}

impl ReachnetConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_addr_mgmt(mut self, config: AddrMgmtConfig) -> Self {
        self.config.addr_mgmt = config;
        self
    }

    pub fn with_reachability(mut self, config: ReachabilityConfig) -> Self {
        self.config.reachability = config;
        self
    }

    pub fn with_endpoint(mut self, config: EndpointConfig) -> Self {
        self.config.endpoint = config;
        self
    }

    pub fn with_discovery(mut self, config: DiscoveryConfig) -> Self {
        self.config.discovery = config;
        self
    }

    pub fn with_address_manager(mut self, config: AddressManagerConfig) -> Self {
        self.config.address_manager = config;
        self
    }

    pub fn build(self) -> ReachnetConfig {
        self.config
    }
}
