//! Packet alias table (spec.md §4.4, §9).
//!
//! Once `hello` negotiates aliases, outbound packets carry a small integer
//! in element 0 instead of the type name, and inbound integers are resolved
//! back to names before dispatch. Each direction keeps its own table: the
//! alias a peer assigns for `"ping"` need not match the alias this side uses
//! for the same name in the other direction.

use std::collections::HashMap;

/// A bijective name↔integer table for one direction of a connection.
#[derive(Clone, Debug, Default)]
pub struct AliasTable {
    name_to_id: HashMap<String, u64>,
    id_to_name: HashMap<u64, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs an explicit name → alias-integer mapping, as published by a
    /// peer's `aliases` capability dict (spec.md §3/§6: aliases are a
    /// `Dict` of packet-type-name to small positive integer, not a
    /// positionally-indexed list — the peer is free to choose any ids).
    pub fn install(&mut self, pairs: &[(String, u64)]) {
        self.name_to_id.clear();
        self.id_to_name.clear();
        for (name, id) in pairs {
            self.name_to_id.insert(name.clone(), *id);
            self.id_to_name.insert(*id, name.clone());
        }
    }

    /// Installs a table this side builds for its own outgoing names,
    /// assigning sequential ids by position. Used when this side is the one
    /// choosing its own alias ids to publish, not when installing a table
    /// received from a peer (use [`Self::install`] for that).
    pub fn install_sequential(&mut self, names: &[String]) {
        let pairs: Vec<(String, u64)> = names.iter().cloned().zip(0u64..).collect();
        self.install(&pairs);
    }

    pub fn alias_for(&self, name: &str) -> Option<u64> {
        self.name_to_id.get(name).copied()
    }

    pub fn name_for(&self, alias: u64) -> Option<&str> {
        self.id_to_name.get(&alias).map(|s| s.as_str())
    }

    pub fn is_installed(&self) -> bool {
        !self.name_to_id.is_empty()
    }

    pub fn len(&self) -> usize {
        self.name_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.name_to_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_sequential_builds_bijection_by_position() {
        let mut table = AliasTable::new();
        table.install_sequential(&["ping".to_string(), "hello".to_string(), "damage".to_string()]);
        assert_eq!(table.alias_for("hello"), Some(1));
        assert_eq!(table.name_for(1), Some("hello"));
        assert_eq!(table.alias_for("unknown"), None);
    }

    #[test]
    fn install_accepts_explicit_pairs_in_any_order() {
        let mut table = AliasTable::new();
        table.install(&[("damage".to_string(), 42), ("ping".to_string(), 7)]);
        assert_eq!(table.alias_for("ping"), Some(7));
        assert_eq!(table.name_for(42), Some("damage"));
    }

    #[test]
    fn reinstall_replaces_previous_table() {
        let mut table = AliasTable::new();
        table.install_sequential(&["a".to_string()]);
        table.install_sequential(&["b".to_string(), "c".to_string()]);
        assert_eq!(table.alias_for("a"), None);
        assert_eq!(table.alias_for("c"), Some(1));
    }
}
