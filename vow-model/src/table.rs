#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use serde::de::{Deserialize, Deserializer, Error as _, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeSeq, Serializer};
use thiserror::Error;

/// Identifier usable as a table key.
pub trait TableKey: Clone + Eq + Hash + fmt::Debug + fmt::Display {
    /// True for the sentinel meaning "name could not be determined".
    fn is_unresolved(&self) -> bool;
}

pub trait Named {
    type Name: TableKey;

    fn name(&self) -> &Self::Name;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("duplicate name `{0}`")]
    Duplicate(String),
    #[error("table is sealed; cannot insert `{0}`")]
    Sealed(String),
}

/// Insertion-ordered, name-keyed table.
///
/// Entries carrying an unresolved name are kept but are not addressable by
/// name, so several of them may coexist. Once sealed the table rejects
/// further inserts.
#[derive(Clone, Debug)]
pub struct NameTable<T: Named> {
    entries: Vec<T>,
    index: HashMap<T::Name, usize>,
    sealed: bool,
}

impl<T: Named> Default for NameTable<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            sealed: false,
        }
    }
}

impl<T: Named> NameTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sealed_empty() -> Self {
        let mut table = Self::new();
        table.seal();
        table
    }

    /// Builds a sealed table from `entries`.
    pub fn sealed_from(entries: impl IntoIterator<Item = T>) -> Result<Self, TableError> {
        let mut table = Self::new();
        for e in entries {
            table.insert(e)?;
        }
        table.seal();
        Ok(table)
    }

    pub fn insert(&mut self, entry: T) -> Result<(), TableError> {
        let name = entry.name().clone();
        if self.sealed {
            return Err(TableError::Sealed(name.to_string()));
        }
        if !name.is_unresolved() {
            if self.index.contains_key(&name) {
                return Err(TableError::Duplicate(name.to_string()));
            }
            self.index.insert(name, self.entries.len());
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn get(&self, name: &T::Name) -> Option<&T> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, name: &T::Name) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a, T: Named> IntoIterator for &'a NameTable<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<T: Named + PartialEq> PartialEq for NameTable<T> {
    fn eq(&self, other: &Self) -> bool {
        self.sealed == other.sealed && self.entries == other.entries
    }
}

impl<T: Named + Serialize> Serialize for NameTable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.entries.len()))?;
        for e in &self.entries {
            seq.serialize_element(e)?;
        }
        seq.end()
    }
}

/// Tables arrive from the front-end already complete, so a deserialized
/// table is sealed.
impl<'de, T: Named + Deserialize<'de>> Deserialize<'de> for NameTable<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor<T>(PhantomData<T>);

        impl<'de, T: Named + Deserialize<'de>> Visitor<'de> for TableVisitor<T> {
            type Value = NameTable<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a sequence of uniquely named entries")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut table = NameTable::new();
                while let Some(entry) = seq.next_element::<T>()? {
                    table.insert(entry).map_err(A::Error::custom)?;
                }
                table.seal();
                Ok(table)
            }
        }

        deserializer.deserialize_seq(TableVisitor(PhantomData))
    }
}
