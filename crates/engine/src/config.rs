//! Configuration for the federation engine

use std::time::Duration;

use crate::identity::ScopeRelation;

/// Default timeout for a single-target subscription request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout reserved for multicast subscription requests
pub const MULTICAST_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Which topology relationships this instance accepts subscriptions over
#[derive(Debug, Clone)]
pub struct ScopeCapabilities {
    /// Accept subscribers in the same zone and site
    pub supports_intra_zone: bool,
    /// Accept subscribers in a different zone of the same site
    pub supports_inter_zone: bool,
    /// Accept subscribers at a different site
    pub supports_inter_site: bool,
}

impl ScopeCapabilities {
    /// Whether subscriptions over the given relationship are accepted
    pub fn allows(&self, relation: ScopeRelation) -> bool {
        match relation {
            ScopeRelation::IntraZone => self.supports_intra_zone,
            ScopeRelation::InterZone => self.supports_inter_zone,
            ScopeRelation::InterSite => self.supports_inter_site,
        }
    }
}

impl Default for ScopeCapabilities {
    fn default() -> Self {
        Self {
            supports_intra_zone: true,
            supports_inter_zone: true,
            supports_inter_site: false,
        }
    }
}

/// Configuration for the federation manager
#[derive(Debug, Clone)]
pub struct FederationConfig {
    /// Timeout for each outbound subscription request
    pub request_timeout: Duration,
    /// Interval between retry sweeps while anything is pending
    pub sweep_interval: Duration,
    /// Consecutive no-op sweeps absorbed before the sweeper parks.
    ///
    /// Late membership events can arrive after apparent convergence; the
    /// sweeper keeps confirming for this many extra cycles before it stops
    /// ticking and waits to be woken.
    pub max_idle_passes: usize,
    /// Relationships this instance accepts inbound subscriptions over
    pub capabilities: ScopeCapabilities,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            sweep_interval: Duration::from_secs(10),
            max_idle_passes: 10,
            capabilities: ScopeCapabilities::default(),
        }
    }
}
