//! The leader-held index: file name -> hosting peers, in insertion order.

use std::collections::HashMap;

use crate::peer::PeerAddr;

/// In-memory "who hosts what" record. Exists only on the node that currently
/// believes itself leader; every inbound report and removal funnels through it.
#[derive(Debug, Default)]
pub struct Dht {
    entries: HashMap<String, Vec<PeerAddr>>,
}

impl Dht {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register `addr` as a source for each named file. Idempotent per (file, addr).
    pub fn update(&mut self, addr: PeerAddr, file_names: &[String]) {
        for name in file_names {
            let sources = self.entries.entry(name.clone()).or_default();
            if !sources.contains(&addr) {
                sources.push(addr);
            }
        }
    }

    /// Drop `addr` from every source list. File names left with no sources
    /// disappear from the index entirely. Deleting an absent address is a no-op.
    pub fn delete(&mut self, addr: PeerAddr) {
        for sources in self.entries.values_mut() {
            sources.retain(|a| *a != addr);
        }
        self.entries.retain(|_, sources| !sources.is_empty());
    }

    /// All indexed file names.
    pub fn file_list(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Peers hosting `name`, in the order they first reported it.
    /// Unknown names read as an empty source list.
    pub fn sources(&self, name: &str) -> Vec<PeerAddr> {
        self.entries.get(name).cloned().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(port: u16) -> PeerAddr {
        PeerAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn update_preserves_insertion_order() {
        let mut dht = Dht::new();
        dht.update(addr(9001), &names(&["x", "y"]));
        dht.update(addr(9002), &names(&["y"]));
        assert_eq!(dht.sources("y"), vec![addr(9001), addr(9002)]);
        assert_eq!(dht.sources("x"), vec![addr(9001)]);
    }

    #[test]
    fn update_is_idempotent_per_file_and_addr() {
        let mut dht = Dht::new();
        dht.update(addr(9001), &names(&["x"]));
        dht.update(addr(9001), &names(&["x"]));
        assert_eq!(dht.sources("x"), vec![addr(9001)]);
    }

    #[test]
    fn delete_drops_emptied_files() {
        let mut dht = Dht::new();
        dht.update(addr(9001), &names(&["x", "y"]));
        dht.update(addr(9002), &names(&["y"]));
        dht.delete(addr(9001));
        assert!(dht.sources("x").is_empty());
        assert!(!dht.file_list().contains(&"x".to_string()));
        assert_eq!(dht.sources("y"), vec![addr(9002)]);
    }

    #[test]
    fn second_delete_is_noop() {
        let mut dht = Dht::new();
        dht.update(addr(9001), &names(&["x"]));
        dht.delete(addr(9001));
        dht.delete(addr(9001));
        assert!(dht.is_empty());
    }

    #[test]
    fn unknown_file_reads_as_empty() {
        let dht = Dht::new();
        assert!(dht.sources("nope").is_empty());
    }
}
