//! Writer-side interning tables for symbols and templates.
//!
//! Both follow the same get-or-append discipline: the first sighting of an
//! entry appends it and fixes its index forever, so table order is exactly
//! first-insertion order and encoding is deterministic.

use std::collections::HashMap;
use std::sync::Arc;

use crate::format::{NodeTemplate, SymbolId, TemplateId};

#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Arc<str>>,
    index: HashMap<Arc<str>, SymbolId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The existing index of `name`, or the index it was just appended at.
    pub fn get_index(&mut self, name: &Arc<str>) -> SymbolId {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(name.clone());
        self.index.insert(name.clone(), id);
        id
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<str>> {
        self.symbols.iter()
    }
}

#[derive(Debug, Default)]
pub struct TemplateTable {
    templates: Vec<NodeTemplate>,
    index: HashMap<NodeTemplate, TemplateId>,
}

impl TemplateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The existing index of `template`, or the index it was just appended
    /// at. Keyed by structural equality, so two `Call { arity: 3 }` values
    /// collapse into one entry.
    pub fn get_index(&mut self, template: NodeTemplate) -> TemplateId {
        if let Some(&id) = self.index.get(&template) {
            return id;
        }
        let id = TemplateId(self.templates.len() as u32);
        self.templates.push(template);
        self.index.insert(template, id);
        id
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeTemplate> {
        self.templates.iter()
    }
}
