//! Ordered fragment table mapping link URLs to affiliate networks.

use crate::config::AffiliateNetwork;

/// Ordered affiliate-network table. The first entry whose fragment occurs in
/// a link URL names the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffiliateTable {
    networks: Vec<AffiliateNetwork>,
}

impl AffiliateTable {
    /// Build a table from configured networks, keeping their order.
    pub fn new(networks: Vec<AffiliateNetwork>) -> Self {
        Self { networks }
    }

    /// Network name for `link_url`, if any fragment matches.
    ///
    /// Matching is a case-insensitive substring test against the full URL.
    pub fn classify(&self, link_url: &str) -> Option<&str> {
        let haystack = link_url.to_ascii_lowercase();
        self.networks
            .iter()
            .find(|n| haystack.contains(&n.fragment.to_ascii_lowercase()))
            .map(|n| n.name.as_str())
    }
}

impl Default for AffiliateTable {
    fn default() -> Self {
        Self::new(crate::config::default_networks())
    }
}
