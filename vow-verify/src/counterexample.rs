// Counterexample mapping: solver model -> source-level bindings.
//
// Symbols are `base@generation`; the mapper splits them, drops ghost
// bookkeeping and attaches the declared type of each base name.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::alias::AliasName;
use crate::encode::{RESULT_NAME, RETURNED_NAME};
use crate::term::{Model, Value};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Binding {
    /// Source-level name; fields keep their `this.` prefix.
    pub name: String,
    pub version: u32,
    pub ty: String,
    pub value: String,
}

impl Binding {
    /// Generation 0 is the value on entry.
    pub fn is_input(&self) -> bool {
        self.version == 0
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_input() {
            write!(f, "{} : {} = {}", self.name, self.ty, self.value)
        } else {
            write!(f, "{}#{} : {} = {}", self.name, self.version, self.ty, self.value)
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Counterexample {
    pub bindings: Vec<Binding>,
}

impl Counterexample {
    pub fn inputs(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.iter().filter(|b| b.is_input())
    }

    /// Entry value of `name`.
    pub fn input(&self, name: &str) -> Option<&Binding> {
        self.inputs().find(|b| b.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// One-line rendering of the inputs, e.g. `x = 1, this.count = 0`.
    pub fn display_compact(&self) -> String {
        self.inputs()
            .map(|b| format!("{} = {}", b.name, b.value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Maps solver models onto source names, given each logical name's type.
pub struct CounterexampleMapper {
    type_context: BTreeMap<String, String>,
}

impl CounterexampleMapper {
    pub fn new(type_context: BTreeMap<String, String>) -> Self {
        Self { type_context }
    }

    pub fn map(&self, model: &Model) -> Counterexample {
        let mut bindings: Vec<Binding> = model
            .assignments
            .iter()
            .filter_map(|(symbol, value)| {
                let alias = AliasName::parse(symbol)?;
                if alias.base() == RETURNED_NAME {
                    return None;
                }
                let ty = self
                    .type_context
                    .get(alias.base())
                    .cloned()
                    .unwrap_or_else(|| value_type(value).to_string());
                let name = if alias.base() == RESULT_NAME {
                    "result".to_string()
                } else {
                    alias.base().to_string()
                };
                Some(Binding {
                    name,
                    version: alias.generation(),
                    ty,
                    value: value.to_string(),
                })
            })
            .collect();
        bindings.sort_by(|a, b| {
            (!a.is_input(), &a.name, a.version).cmp(&(!b.is_input(), &b.name, b.version))
        });
        Counterexample { bindings }
    }
}

fn value_type(v: &Value) -> &'static str {
    match v {
        Value::Int(_) => "int",
        Value::Bool(_) => "bool",
        Value::Other(_) => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inputs_come_first_and_ghosts_are_hidden() {
        let mut model = Model::default();
        model.insert("x@1", Value::Int(5));
        model.insert("x@0", Value::Int(4));
        model.insert("this.count@0", Value::Int(0));
        model.insert("$returned@1", Value::Bool(true));
        model.insert("$result@1", Value::Int(9));

        let types = BTreeMap::from([
            ("x".to_string(), "int".to_string()),
            ("this.count".to_string(), "long".to_string()),
        ]);
        let cex = CounterexampleMapper::new(types).map(&model);
        let order: Vec<String> = cex.bindings.iter().map(ToString::to_string).collect();
        assert_eq!(
            order,
            vec![
                "this.count : long = 0",
                "x : int = 4",
                "result#1 : int = 9",
                "x#1 : int = 5",
            ]
        );
        assert_eq!(cex.display_compact(), "this.count = 0, x = 4");
        assert_eq!(cex.input("x").map(|b| b.value.as_str()), Some("4"));
    }
}
