//! Writer-side node table construction.
//!
//! [`NodeTableBuilder`] owns the symbol table, the template registry, the
//! classifying comparator, and the run list whose concatenation is the flat
//! node table. `get_index` interns a node and everything below it, children
//! strictly before parents, so the emitted table always decodes in one
//! forward pass.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::format::{EncodingKind, NodeId, NodeTemplate, TemplateId};
use crate::intern::Classifier;
use crate::node::{Node, Value};
use crate::tables::{SymbolTable, TemplateTable};

/// A maximal contiguous group of node-table entries sharing an encoding
/// kind and, for templated entries, a template.
#[derive(Debug)]
pub(crate) struct Run {
    pub kind: EncodingKind,
    pub template: Option<TemplateId>,
    pub nodes: Vec<Node>,
}

enum Phase {
    Enter,
    Commit,
}

pub(crate) struct NodeTableBuilder {
    pub symbols: SymbolTable,
    pub templates: TemplateTable,
    classifier: Classifier,
    runs: Vec<Run>,
    /// The runs' nodes again, flattened, so interning can probe candidates
    /// by table index.
    flat: Vec<Node>,
    /// Structural hash -> node-table indices with that hash.
    buckets: HashMap<u64, Vec<NodeId>>,
}

/// The encoding kind a literal value serializes under.
pub(crate) fn literal_kind(value: &Value) -> Result<EncodingKind> {
    Ok(match value {
        Value::Null => EncodingKind::Null,
        Value::Bool(_) => EncodingKind::Boolean,
        Value::Int8(_) => EncodingKind::Int8,
        Value::Int16(_) => EncodingKind::Int16,
        Value::Int32(_) => EncodingKind::Int32,
        Value::Int64(_) => EncodingKind::Int64,
        Value::UInt8(_) => EncodingKind::UInt8,
        Value::UInt16(_) => EncodingKind::UInt16,
        Value::UInt32(_) => EncodingKind::UInt32,
        Value::UInt64(_) => EncodingKind::UInt64,
        Value::Float32(_) => EncodingKind::Float32,
        Value::Float64(_) => EncodingKind::Float64,
        Value::Char(c) if *c as u32 > 0xFFFF => {
            return Err(Error::UnsupportedLiteral(
                "char outside the basic multilingual plane",
            ));
        }
        Value::Char(_) => EncodingKind::Char,
        Value::String(_) => EncodingKind::String,
        Value::Void => EncodingKind::Void,
        Value::Decimal(_) => EncodingKind::Decimal,
        Value::BigInt(_) => EncodingKind::BigInteger,
    })
}

impl NodeTableBuilder {
    pub fn new() -> Self {
        Self {
            symbols: SymbolTable::new(),
            templates: TemplateTable::new(),
            classifier: Classifier::new(),
            runs: Vec::new(),
            flat: Vec::new(),
            buckets: HashMap::new(),
        }
    }

    /// The flat-table index of `node`, interning it and any missing
    /// descendants first. Children are interned before parents: attributes
    /// in order followed by the attribute-stripped node, or a call's target
    /// followed by its arguments in order. A call target that is a bare
    /// identifier contributes a symbol, not a node-table entry.
    ///
    /// Runs on an explicit work stack so arbitrarily deep trees cannot
    /// exhaust the native stack.
    pub fn get_index(&mut self, node: &Node) -> Result<NodeId> {
        if let Some(id) = self.lookup(node) {
            return Ok(id);
        }
        let mut stack = vec![(node.clone(), Phase::Enter)];
        while let Some((n, phase)) = stack.pop() {
            match phase {
                Phase::Enter => {
                    if self.lookup(&n).is_some() {
                        continue;
                    }
                    stack.push((n.clone(), Phase::Commit));
                    if n.has_attrs() {
                        stack.push((n.strip_attrs(), Phase::Enter));
                        for attr in n.attrs().iter().rev() {
                            stack.push((attr.clone(), Phase::Enter));
                        }
                    } else if let Some((target, args)) = n.as_call() {
                        for arg in args.iter().rev() {
                            stack.push((arg.clone(), Phase::Enter));
                        }
                        if target.is_bare_ident() {
                            self.symbols.get_index(target.name().unwrap());
                        } else {
                            stack.push((target.clone(), Phase::Enter));
                        }
                    } else if let Some(name) = n.name() {
                        self.symbols.get_index(name);
                    } else if let Some(Value::String(s)) = n.value() {
                        self.symbols.get_index(s);
                    }
                }
                Phase::Commit => {
                    if self.lookup(&n).is_some() {
                        continue;
                    }
                    let (kind, template) = self.classify(&n)?;
                    self.append(n, kind, template);
                }
            }
        }
        Ok(self.lookup(node).unwrap())
    }

    /// Registers every descendant leaf of `roots` ahead of the internal
    /// nodes: null literals first, then identifiers, then the remaining
    /// literals grouped by kind in first-seen order. Front-loading the
    /// homogeneous entries minimizes the number of run headers.
    pub fn register_leaves(&mut self, roots: &[Node]) -> Result<()> {
        let mut nulls: Vec<Node> = Vec::new();
        let mut idents: Vec<Node> = Vec::new();
        let mut groups: Vec<(EncodingKind, Vec<Node>)> = Vec::new();

        let mut seen: HashSet<usize> = HashSet::new();
        let mut stack: Vec<Node> = roots.iter().rev().cloned().collect();
        while let Some(n) = stack.pop() {
            if !seen.insert(n.identity()) {
                continue;
            }
            if n.has_attrs() {
                // Not a leaf; contributes its attributes and its stripped
                // self, in that order.
                stack.push(n.strip_attrs());
                for attr in n.attrs().iter().rev() {
                    stack.push(attr.clone());
                }
            } else if let Some((target, args)) = n.as_call() {
                for arg in args.iter().rev() {
                    stack.push(arg.clone());
                }
                // A bare identifier target only ever becomes a symbol.
                if !target.is_bare_ident() {
                    stack.push(target.clone());
                }
            } else if n.is_ident() {
                idents.push(n);
            } else {
                let value = n.value().unwrap();
                let kind = literal_kind(value)?;
                if kind == EncodingKind::Null {
                    nulls.push(n);
                } else {
                    match groups.iter_mut().find(|(k, _)| *k == kind) {
                        Some((_, group)) => group.push(n),
                        None => groups.push((kind, vec![n])),
                    }
                }
            }
        }

        for n in nulls {
            self.get_index(&n)?;
        }
        for n in idents {
            self.get_index(&n)?;
        }
        for (_, group) in groups {
            for n in group {
                self.get_index(&n)?;
            }
        }
        Ok(())
    }

    fn lookup(&mut self, node: &Node) -> Option<NodeId> {
        if let Some(id) = self.classifier.assigned_index(node) {
            return Some(id);
        }
        let hash = self.classifier.hash(node);
        let candidates = self.buckets.get(&hash)?.clone();
        for id in candidates {
            let existing = self.flat[id.index()].clone();
            if self.classifier.eq(node, &existing) {
                return Some(id);
            }
        }
        None
    }

    fn classify(&mut self, node: &Node) -> Result<(EncodingKind, Option<TemplateId>)> {
        if node.has_attrs() {
            let template = NodeTemplate::Attribute {
                attr_count: node.attrs().len() as u32,
            };
            let id = self.templates.get_index(template);
            return Ok((EncodingKind::TemplatedNode, Some(id)));
        }
        if let Some((target, args)) = node.as_call() {
            let template = if target.is_bare_ident() {
                NodeTemplate::CallId {
                    target: self.symbols.get_index(target.name().unwrap()),
                    arity: args.len() as u32,
                }
            } else {
                NodeTemplate::Call {
                    arity: args.len() as u32,
                }
            };
            let id = self.templates.get_index(template);
            return Ok((EncodingKind::TemplatedNode, Some(id)));
        }
        if node.is_ident() {
            return Ok((EncodingKind::IdNode, None));
        }
        Ok((literal_kind(node.value().unwrap())?, None))
    }

    fn append(&mut self, node: Node, kind: EncodingKind, template: Option<TemplateId>) -> NodeId {
        let id = NodeId(self.flat.len() as u32);
        let split = match self.runs.last() {
            // A run is homogeneous in kind and, for templated nodes, in
            // template; anything else starts a fresh run.
            Some(run) => run.kind != kind || run.template != template,
            None => true,
        };
        if split {
            self.runs.push(Run {
                kind,
                template,
                nodes: Vec::new(),
            });
        }
        self.runs.last_mut().unwrap().nodes.push(node.clone());
        let hash = self.classifier.hash(&node);
        self.buckets.entry(hash).or_default().push(id);
        self.classifier.assign(&node, id);
        self.flat.push(node);
        id
    }

    /// The table index of an already-interned node. Callers rely on the
    /// children-before-parents invariant; asking for an unregistered node
    /// is a bug in the builder itself.
    pub fn index_of(&mut self, node: &Node) -> NodeId {
        self.lookup(node).unwrap()
    }

    pub fn node_count(&self) -> usize {
        self.flat.len()
    }

    pub fn take_runs(&mut self) -> Vec<Run> {
        std::mem::take(&mut self.runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_shapes(builder: &NodeTableBuilder) -> Vec<(EncodingKind, usize)> {
        builder
            .runs
            .iter()
            .map(|run| (run.kind, run.nodes.len()))
            .collect()
    }

    #[test]
    fn interning_is_idempotent() {
        let mut builder = NodeTableBuilder::new();
        let x = Node::call(Node::ident("baz"), vec![]);
        let outer = Node::call(Node::ident("bar"), vec![x.clone(), x.clone()]);
        let again = Node::call(
            Node::ident("bar"),
            vec![Node::call(Node::ident("baz"), vec![]), x.clone()],
        );
        let a = builder.get_index(&outer).unwrap();
        let b = builder.get_index(&again).unwrap();
        assert_eq!(a, b);
        // One entry for x, one for bar(x, x).
        assert_eq!(builder.node_count(), 2);
    }

    #[test]
    fn runs_split_on_kind_change() {
        let mut builder = NodeTableBuilder::new();
        builder.get_index(&Node::literal(1i32)).unwrap();
        builder.get_index(&Node::literal(2i32)).unwrap();
        builder.get_index(&Node::ident("x")).unwrap();
        builder.get_index(&Node::literal(3i32)).unwrap();
        assert_eq!(
            run_shapes(&builder),
            [
                (EncodingKind::Int32, 2),
                (EncodingKind::IdNode, 1),
                (EncodingKind::Int32, 1),
            ]
        );
    }

    #[test]
    fn runs_split_on_template_change() {
        let mut builder = NodeTableBuilder::new();
        // Same kind tag (TemplatedNode) but different templates.
        builder
            .get_index(&Node::call(Node::ident("f"), vec![]))
            .unwrap();
        builder
            .get_index(&Node::call(Node::ident("f"), vec![Node::literal(1i32)]))
            .unwrap();
        builder
            .get_index(&Node::call(Node::ident("g"), vec![Node::literal(2i32)]))
            .unwrap();
        let templated: Vec<_> = builder
            .runs
            .iter()
            .filter(|run| run.kind == EncodingKind::TemplatedNode)
            .collect();
        assert_eq!(templated.len(), 3);
        assert!(templated.iter().all(|run| run.nodes.len() == 1));
    }

    #[test]
    fn clustering_front_loads_leaves() {
        let mut builder = NodeTableBuilder::new();
        let forest = [
            Node::call(Node::ident("f"), vec![Node::literal(1i32)]),
            Node::call(Node::ident("g"), vec![Node::literal(2i32), Node::literal(true)]),
        ];
        builder.register_leaves(&forest).unwrap();
        for root in &forest {
            builder.get_index(root).unwrap();
        }
        let shapes = run_shapes(&builder);
        // All Int32 leaves land in one front run; without the pre-pass the
        // two calls would tear it in half.
        assert_eq!(shapes[0], (EncodingKind::Int32, 2));
        assert_eq!(shapes[1], (EncodingKind::Boolean, 1));
        assert!(
            shapes[2..]
                .iter()
                .all(|(kind, _)| *kind == EncodingKind::TemplatedNode)
        );
    }

    #[test]
    fn null_then_idents_then_literals() {
        let mut builder = NodeTableBuilder::new();
        let forest = [Node::call(
            Node::ident("mix"),
            vec![
                Node::literal(7u8),
                Node::ident("sym"),
                Node::literal(Value::Null),
            ],
        )];
        builder.register_leaves(&forest).unwrap();
        assert_eq!(
            run_shapes(&builder),
            [
                (EncodingKind::Null, 1),
                (EncodingKind::IdNode, 1),
                (EncodingKind::UInt8, 1),
            ]
        );
    }

    #[test]
    fn children_precede_parents() {
        let mut builder = NodeTableBuilder::new();
        let inner = Node::call(Node::ident("leaf"), vec![Node::literal(1i32)]);
        let attred = inner.with_attrs(vec![Node::ident("attr")]);
        let root = Node::call(attred.clone(), vec![inner.clone()]);
        let root_id = builder.get_index(&root).unwrap();
        let inner_id = builder.index_of(&inner);
        let attred_id = builder.index_of(&attred);
        let stripped_id = builder.index_of(&attred.strip_attrs());
        assert!(inner_id.index() < attred_id.index());
        assert_eq!(stripped_id, inner_id);
        assert!(attred_id.index() < root_id.index());
    }

    #[test]
    fn astral_char_is_rejected_before_emission() {
        let mut builder = NodeTableBuilder::new();
        let err = builder.get_index(&Node::literal('🦀')).unwrap_err();
        assert!(matches!(err, Error::UnsupportedLiteral(_)));
    }

    #[test]
    fn deep_tree_does_not_overflow_the_stack() {
        let mut builder = NodeTableBuilder::new();
        let mut node = Node::literal(0i32);
        for _ in 0..50_000 {
            node = Node::call(Node::ident("deep"), vec![node]);
        }
        let id = builder.get_index(&node).unwrap();
        assert_eq!(id.index(), builder.node_count() - 1);
        drop(builder);
        // Tear the chain down iteratively; a plain drop would recurse.
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            if let Some((_, args)) = n.as_call() {
                stack.extend(args.iter().cloned());
            }
        }
    }
}
