//! Host classes and method-resolution order.

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use super::value::HostCode;
use crate::error::HostError;

/// How a class linearizes its ancestors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mro {
    /// Depth-first, left-to-right, first occurrence wins.
    #[default]
    Dfs,
    /// C3 linearization; fails on inconsistent hierarchies.
    C3,
}

/// A host class: parents in declaration order plus locally defined methods.
#[derive(Clone)]
pub struct HostClass {
    name: Rc<str>,
    parents: Vec<Rc<str>>,
    methods: IndexMap<String, HostCode>,
    mro: Mro,
}

impl HostClass {
    pub fn new(name: impl Into<Rc<str>>) -> Self {
        Self {
            name: name.into(),
            parents: Vec::new(),
            methods: IndexMap::new(),
            mro: Mro::Dfs,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<Rc<str>>) -> Self {
        self.parents.push(parent.into());
        self
    }

    pub fn with_method(mut self, name: impl Into<String>, code: HostCode) -> Self {
        self.methods.insert(name.into(), code);
        self
    }

    pub fn with_mro(mut self, mro: Mro) -> Self {
        self.mro = mro;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parents(&self) -> &[Rc<str>] {
        &self.parents
    }

    pub fn mro(&self) -> Mro {
        self.mro
    }

    pub fn method(&self, name: &str) -> Option<&HostCode> {
        self.methods.get(name)
    }

    pub fn methods(&self) -> impl Iterator<Item = (&str, &HostCode)> {
        self.methods.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl std::fmt::Debug for HostClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostClass")
            .field("name", &self.name)
            .field("parents", &self.parents)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("mro", &self.mro)
            .finish()
    }
}

/// Linearize `name` against `classes`. Unknown classes contribute only
/// themselves, like an empty package.
pub fn linearize(classes: &HashMap<Rc<str>, HostClass>, name: &str) -> Result<Vec<Rc<str>>, HostError> {
    let mro = classes.get(name).map(HostClass::mro).unwrap_or_default();
    match mro {
        Mro::Dfs => {
            let mut out = Vec::new();
            dfs(classes, name, &mut out, &mut Vec::new());
            Ok(out)
        }
        Mro::C3 => c3(classes, name, &mut Vec::new()),
    }
}

fn class_key(classes: &HashMap<Rc<str>, HostClass>, name: &str) -> Rc<str> {
    classes
        .get_key_value(name)
        .map(|(k, _)| k.clone())
        .unwrap_or_else(|| name.into())
}

fn dfs(classes: &HashMap<Rc<str>, HostClass>, name: &str, out: &mut Vec<Rc<str>>, path: &mut Vec<Rc<str>>) {
    if out.iter().any(|c| &**c == name) || path.iter().any(|c| &**c == name) {
        return;
    }
    let key = class_key(classes, name);
    out.push(key.clone());
    path.push(key);
    if let Some(class) = classes.get(name) {
        for parent in &class.parents {
            dfs(classes, parent, out, path);
        }
    }
    path.pop();
}

fn c3(
    classes: &HashMap<Rc<str>, HostClass>,
    name: &str,
    path: &mut Vec<Rc<str>>,
) -> Result<Vec<Rc<str>>, HostError> {
    if path.iter().any(|c| &**c == name) {
        return Err(HostError::new(format!("recursive inheritance detected in class '{name}'")));
    }
    let key = class_key(classes, name);
    let parents = classes.get(name).map(|c| c.parents.clone()).unwrap_or_default();

    path.push(key.clone());
    let mut sequences = Vec::with_capacity(parents.len() + 1);
    for parent in &parents {
        sequences.push(c3(classes, parent, path)?);
    }
    path.pop();
    sequences.push(parents);

    let mut out = vec![key];
    loop {
        sequences.retain(|s| !s.is_empty());
        if sequences.is_empty() {
            return Ok(out);
        }

        let candidate = sequences
            .iter()
            .map(|s| s[0].clone())
            .find(|head| !sequences.iter().any(|s| s[1..].contains(head)))
            .ok_or_else(|| {
                HostError::new(format!("inconsistent hierarchy during C3 merge of class '{name}'"))
            })?;

        for seq in &mut sequences {
            if seq[0] == candidate {
                seq.remove(0);
            }
        }
        out.push(candidate);
    }
}
