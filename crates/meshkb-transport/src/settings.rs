//! Quality-of-service settings for one transport session.
//!
//! `Settings` bundles the static configuration with the mutable policy
//! surface: trust lists for peers and originators, the three filter chains,
//! and the optional trigger evaluated after every applied message.

use std::collections::HashSet;

use meshkb_core::config::Config;
use meshkb_knowledge::{filters::FilterChain, interpreter::CompiledExpression};

/// Everything that shapes what a transport accepts, emits, and forwards.
pub struct Settings {
    /// Static session configuration.
    pub config: Config,
    /// Peers (immediate senders) allowed to talk to us. Empty means all.
    pub trusted_peers: HashSet<String>,
    /// Peers rejected unconditionally. Takes precedence over trust.
    pub banned_peers: HashSet<String>,
    /// Originators whose knowledge we accept. Empty means all.
    pub trusted_originators: HashSet<String>,
    /// Originators rejected unconditionally. Takes precedence over trust.
    pub banned_originators: HashSet<String>,
    /// Filters applied to outgoing batches.
    pub send_filters: FilterChain,
    /// Filters applied to decoded incoming batches.
    pub receive_filters: FilterChain,
    /// Filters applied to batches considered for re-propagation.
    pub rebroadcast_filters: FilterChain,
    /// Trigger evaluated after a message is applied to the store.
    pub on_data_received: Option<Box<dyn CompiledExpression>>,
}

impl Settings {
    /// Creates settings with open trust, empty filter chains, and no trigger.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            trusted_peers: HashSet::new(),
            banned_peers: HashSet::new(),
            trusted_originators: HashSet::new(),
            banned_originators: HashSet::new(),
            send_filters: FilterChain::new(),
            receive_filters: FilterChain::new(),
            rebroadcast_filters: FilterChain::new(),
            on_data_received: None,
        }
    }

    /// Whether traffic from `peer` is accepted. Banned always loses; an
    /// empty trusted set admits everyone else.
    pub fn is_peer_trusted(&self, peer: &str) -> bool {
        if self.banned_peers.contains(peer) {
            return false;
        }
        self.trusted_peers.is_empty() || self.trusted_peers.contains(peer)
    }

    /// Whether knowledge created by `originator` is accepted. Same rule as
    /// peer trust.
    pub fn is_originator_trusted(&self, originator: &str) -> bool {
        if self.banned_originators.contains(originator) {
            return false;
        }
        self.trusted_originators.is_empty() || self.trusted_originators.contains(originator)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_lists_trust_everyone() {
        let settings = Settings::default();
        assert!(settings.is_peer_trusted("10.0.0.1:4150"));
        assert!(settings.is_originator_trusted("10.0.0.1:4150"));
    }

    #[test]
    fn test_trusted_list_closes_the_default() {
        let mut settings = Settings::default();
        settings.trusted_peers.insert("10.0.0.1:4150".to_owned());

        assert!(settings.is_peer_trusted("10.0.0.1:4150"));
        assert!(!settings.is_peer_trusted("10.0.0.2:4150"));
    }

    #[test]
    fn test_ban_beats_trust() {
        let mut settings = Settings::default();
        settings.trusted_originators.insert("10.0.0.1:4150".to_owned());
        settings.banned_originators.insert("10.0.0.1:4150".to_owned());

        assert!(!settings.is_originator_trusted("10.0.0.1:4150"));
    }
}
