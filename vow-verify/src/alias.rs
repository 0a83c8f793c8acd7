#![forbid(unsafe_code)]

//! Versioned names for single-assignment encoding.
//!
//! Every logical variable has a current generation. Writing a variable
//! issues a fresh generation, so each solver symbol is assigned exactly
//! once. Tables are forked at branches and merged afterwards; the merge
//! reports which names diverged so the encoder can join them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AliasName {
    base: String,
    generation: u32,
}

impl AliasName {
    pub fn new(base: impl Into<String>, generation: u32) -> Self {
        Self {
            base: base.into(),
            generation,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Splits a rendered symbol back into base and generation.
    pub fn parse(symbol: &str) -> Option<Self> {
        let (base, generation) = symbol.rsplit_once('@')?;
        Some(Self::new(base, generation.parse().ok()?))
    }
}

impl fmt::Display for AliasName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.base, self.generation)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AliasError {
    #[error("`{0}` is already registered")]
    AlreadyRegistered(String),
    #[error("`{0}` is not registered")]
    Unregistered(String),
    #[error("cannot merge tables over different names (left only: {left_only:?}, right only: {right_only:?})")]
    MismatchedNames {
        left_only: Vec<String>,
        right_only: Vec<String>,
    },
}

/// Per-method alias table.
///
/// `clone` forks the table: the copy's current generations and history are
/// independent of the original. All forks of one root share a single
/// issuance counter per name, so two forks never hand out the same alias.
#[derive(Clone, Debug)]
pub struct AliasTable {
    current: BTreeMap<String, u32>,
    history: Vec<AliasName>,
    issued: Arc<Mutex<HashMap<String, u32>>>,
}

impl Default for AliasTable {
    fn default() -> Self {
        Self {
            current: BTreeMap::new(),
            history: Vec::new(),
            issued: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` at generation 0.
    pub fn add_name(&mut self, name: impl Into<String>) -> Result<AliasName, AliasError> {
        let name = name.into();
        if self.current.contains_key(&name) {
            return Err(AliasError::AlreadyRegistered(name));
        }
        self.issued.lock().entry(name.clone()).or_insert(0);
        self.current.insert(name.clone(), 0);
        let alias = AliasName::new(name, 0);
        self.history.push(alias.clone());
        Ok(alias)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.current.contains_key(name)
    }

    pub fn get_alias(&self, name: &str) -> Result<AliasName, AliasError> {
        self.current
            .get(name)
            .map(|&g| AliasName::new(name, g))
            .ok_or_else(|| AliasError::Unregistered(name.to_string()))
    }

    /// Issues a fresh generation for `name` and makes it current.
    pub fn increment_name_alias(&mut self, name: &str) -> Result<AliasName, AliasError> {
        let slot = self
            .current
            .get_mut(name)
            .ok_or_else(|| AliasError::Unregistered(name.to_string()))?;
        let next = {
            let mut issued = self.issued.lock();
            let top = issued.entry(name.to_string()).or_insert(*slot);
            *top += 1;
            *top
        };
        *slot = next;
        let alias = AliasName::new(name, next);
        self.history.push(alias.clone());
        Ok(alias)
    }

    /// Aliases this table has used that `other` has not.
    pub fn alias_difference(&self, other: &AliasTable) -> BTreeSet<AliasName> {
        let theirs: BTreeSet<&AliasName> = other.history.iter().collect();
        self.history
            .iter()
            .filter(|a| !theirs.contains(a))
            .cloned()
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.current.keys().map(String::as_str)
    }

    /// Every alias this table has issued or inherited, oldest first.
    pub fn history(&self) -> &[AliasName] {
        &self.history
    }

    /// Joins two forks of the same table.
    ///
    /// The result keeps `left`'s current generations and the union of both
    /// histories. Each name whose generation differs between the two sides
    /// is reported; the caller must bind a fresh generation to the join.
    pub fn merge(left: AliasTable, right: AliasTable) -> Result<Merged, AliasError> {
        let left_only: Vec<String> = left
            .current
            .keys()
            .filter(|k| !right.current.contains_key(*k))
            .cloned()
            .collect();
        let right_only: Vec<String> = right
            .current
            .keys()
            .filter(|k| !left.current.contains_key(*k))
            .cloned()
            .collect();
        if !left_only.is_empty() || !right_only.is_empty() {
            return Err(AliasError::MismatchedNames { left_only, right_only });
        }

        let divergences = left
            .current
            .iter()
            .filter_map(|(name, &l)| {
                let r = right.current[name];
                (l != r).then(|| Divergence {
                    name: name.clone(),
                    left: AliasName::new(name.clone(), l),
                    right: AliasName::new(name.clone(), r),
                })
            })
            .collect();

        let mut table = left;
        let known: BTreeSet<AliasName> = table.history.iter().cloned().collect();
        table
            .history
            .extend(right.history.into_iter().filter(|a| !known.contains(a)));
        Ok(Merged { table, divergences })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Divergence {
    pub name: String,
    pub left: AliasName,
    pub right: AliasName,
}

#[derive(Debug)]
pub struct Merged {
    pub table: AliasTable,
    pub divergences: Vec<Divergence>,
}

impl Merged {
    pub fn updated_names(&self) -> BTreeSet<String> {
        self.divergences.iter().map(|d| d.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn register_read_and_increment() {
        let mut t = AliasTable::new();
        assert_eq!(t.add_name("x").expect("add"), AliasName::new("x", 0));
        assert_eq!(
            t.add_name("x"),
            Err(AliasError::AlreadyRegistered("x".to_string()))
        );
        assert_eq!(t.increment_name_alias("x").expect("inc").to_string(), "x@1");
        assert_eq!(t.get_alias("x").expect("get").to_string(), "x@1");
        assert_eq!(t.get_alias("y"), Err(AliasError::Unregistered("y".to_string())));
    }

    #[test]
    fn fork_is_independent_of_the_original() {
        let mut root = AliasTable::new();
        root.add_name("x").expect("add");
        let mut fork = root.clone();
        fork.increment_name_alias("x").expect("inc");

        assert_eq!(root.get_alias("x").expect("get").generation(), 0);
        assert_eq!(root.history().len(), 1);
        assert_eq!(fork.history().len(), 2);
    }

    #[test]
    fn merge_reports_updated_names_and_difference() {
        let mut t = AliasTable::new();
        t.add_name("x").expect("add");
        t.add_name("y").expect("add");
        let mut a = t.clone();
        a.increment_name_alias("x").expect("inc");
        let b = t.clone();

        assert_eq!(
            a.alias_difference(&b),
            BTreeSet::from([AliasName::new("x", 1)])
        );

        let merged = AliasTable::merge(a, b).expect("merge");
        assert_eq!(merged.updated_names(), BTreeSet::from(["x".to_string()]));
        assert_eq!(merged.divergences[0].left, AliasName::new("x", 1));
        assert_eq!(merged.divergences[0].right, AliasName::new("x", 0));
    }

    #[test]
    fn sibling_forks_never_share_an_alias() {
        let mut t = AliasTable::new();
        t.add_name("x").expect("add");
        let mut a = t.clone();
        let mut b = t.clone();
        let from_a = a.increment_name_alias("x").expect("inc");
        let from_b = b.increment_name_alias("x").expect("inc");
        assert_ne!(from_a, from_b);

        let merged = AliasTable::merge(a, b).expect("merge");
        assert!(merged.table.history().contains(&from_a));
        assert!(merged.table.history().contains(&from_b));
    }

    #[test]
    fn merge_over_different_names_is_refused() {
        let mut a = AliasTable::new();
        a.add_name("x").expect("add");
        let mut b = AliasTable::new();
        b.add_name("y").expect("add");
        match AliasTable::merge(a, b) {
            Err(AliasError::MismatchedNames { left_only, right_only }) => {
                assert_eq!(left_only, vec!["x".to_string()]);
                assert_eq!(right_only, vec!["y".to_string()]);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn parses_rendered_aliases() {
        assert_eq!(AliasName::parse("this.count@3"), Some(AliasName::new("this.count", 3)));
        assert_eq!(AliasName::parse("plain"), None);
    }

    proptest! {
        #[test]
        fn increments_always_issue_unseen_aliases(ops in proptest::collection::vec((0usize..3, any::<bool>()), 1..64)) {
            let names = ["a", "b", "c"];
            let mut root = AliasTable::new();
            for n in names {
                root.add_name(n).expect("add");
            }
            let mut forks = vec![root.clone(), root];
            let mut issued = BTreeSet::new();
            for n in names {
                issued.insert(AliasName::new(n, 0));
            }

            for (which, second) in ops {
                let fork = &mut forks[usize::from(second)];
                let before = fork.get_alias(names[which]).expect("get");
                let after = fork.increment_name_alias(names[which]).expect("inc");
                prop_assert_ne!(&before, &after);
                prop_assert!(issued.insert(after));
            }
        }
    }
}
