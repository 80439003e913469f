use std::collections::{BTreeMap, HashMap};

use crate::error::Error;

/// Macro definitions keyed by name and the block depth they were defined at.
///
/// Bodies are stored raw; they are lexed when accessed.
#[derive(Debug, Default, Clone)]
pub struct MacroTable(HashMap<String, BTreeMap<usize, String>>);

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, name: String, depth: usize, body: String) {
        self.0.entry(name).or_default().insert(depth, body);
    }

    /// Remove the definition made at exactly `depth`.
    pub fn undefine(&mut self, name: &str, depth: usize) -> Result<String, Error> {
        let missing = || Error::UndefinedMacro {
            name: name.to_string(),
            depth,
        };
        let scopes = self.0.get_mut(name).ok_or_else(missing)?;
        let body = scopes.remove(&depth).ok_or_else(missing)?;
        if scopes.is_empty() {
            self.0.remove(name);
        }
        Ok(body)
    }

    /// Innermost definition visible from `depth`.
    pub fn lookup(&self, name: &str, depth: usize) -> Option<&str> {
        self.0
            .get(name)?
            .range(..=depth)
            .next_back()
            .map(|(_, body)| body.as_str())
    }

    pub fn is_defined(&self, name: &str, depth: usize) -> bool {
        self.lookup(name, depth).is_some()
    }

    /// Drop every definition made deeper than `depth`.
    pub fn purge_above(&mut self, depth: usize) {
        self.0.retain(|_, scopes| {
            scopes.retain(|defined_at, _| *defined_at <= depth);
            !scopes.is_empty()
        });
    }

    /// Number of live definitions across all depths.
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_outward() {
        let mut table = MacroTable::new();
        table.define("A".into(), 0, "outer".into());
        table.define("A".into(), 2, "inner".into());

        assert_eq!(table.lookup("A", 0), Some("outer"));
        assert_eq!(table.lookup("A", 1), Some("outer"));
        assert_eq!(table.lookup("A", 2), Some("inner"));
        assert_eq!(table.lookup("A", 5), Some("inner"));
        assert_eq!(table.lookup("B", 5), None);
    }

    #[test]
    fn test_purge_above() {
        let mut table = MacroTable::new();
        table.define("A".into(), 0, "a".into());
        table.define("A".into(), 1, "a1".into());
        table.define("B".into(), 2, "b".into());

        table.purge_above(0);
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup("A", 3), Some("a"));
        assert!(!table.is_defined("B", 3));
    }

    #[test]
    fn test_undefine_exact_depth_only() {
        let mut table = MacroTable::new();
        table.define("A".into(), 0, "a".into());

        let err = table.undefine("A", 1).unwrap_err();
        assert!(matches!(err, Error::UndefinedMacro { ref name, depth: 1 } if name == "A"));
        assert_eq!(table.undefine("A", 0).unwrap(), "a");
        assert!(table.is_empty());
        assert!(table.undefine("A", 0).is_err());
    }

    #[test]
    fn test_redefine_replaces() {
        let mut table = MacroTable::new();
        table.define("A".into(), 0, "1".into());
        table.define("A".into(), 0, "2".into());
        assert_eq!(table.lookup("A", 0), Some("2"));
        assert_eq!(table.len(), 1);
    }
}
