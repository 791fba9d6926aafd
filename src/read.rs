//! BLT decoding: a single forward pass over the stream.
//!
//! Every reference in the node table points at an entry that was fully
//! materialized earlier in the same pass, so the decoder never seeks and
//! never back-patches. The flat node array's length is the sole bound on
//! the set of legal references at any point.

use std::io::Read;
use std::sync::Arc;

use log::debug;
use num_bigint::BigInt;

use crate::codec::ByteReader;
use crate::error::{Error, Result};
use crate::format::{EncodingKind, MAGIC, NodeTemplate, SymbolId, TemplateTag, Version};
use crate::node::{Decimal, Node, NodeFactory, SourceFactory, Value};

/// Decodes a BLT file into its top-level nodes.
///
/// `source` is an opaque label the stock factory stamps on every produced
/// node; it has no on-disk representation.
pub fn read_file<R: Read>(reader: R, source: Option<&str>) -> Result<Vec<Node>> {
    read_file_with(reader, SourceFactory::new(source))
}

/// Like [`read_file`], with a caller-supplied node factory.
pub fn read_file_with<R: Read, F: NodeFactory>(reader: R, factory: F) -> Result<Vec<Node>> {
    Decoder {
        input: ByteReader::new(reader),
        factory,
        symbols: Vec::new(),
        templates: Vec::new(),
        nodes: Vec::new(),
    }
    .read()
}

struct Decoder<R, F> {
    input: ByteReader<R>,
    factory: F,
    symbols: Vec<Arc<str>>,
    templates: Vec<NodeTemplate>,
    /// The flat node table, growing left to right.
    nodes: Vec<Node>,
}

impl<R: Read, F: NodeFactory> Decoder<R, F> {
    fn read(mut self) -> Result<Vec<Node>> {
        self.read_header()?;
        self.read_symbols()?;
        self.read_templates()?;
        self.read_node_table()?;
        let tops = self.read_top_level()?;
        debug!(
            "decoded {} symbols, {} templates, {} nodes, {} roots",
            self.symbols.len(),
            self.templates.len(),
            self.nodes.len(),
            tops.len()
        );
        Ok(tops)
    }

    fn read_header(&mut self) -> Result<()> {
        let mut magic = [0u8; 3];
        self.input.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(Error::BadMagic(magic));
        }
        let version = Version::from_word(self.input.read_u32()?);
        if version > Version::CURRENT {
            return Err(Error::UnsupportedVersion(version));
        }
        Ok(())
    }

    fn read_symbols(&mut self) -> Result<()> {
        let count = self.input.read_uleb128()?;
        for _ in 0..count {
            let symbol = self.input.read_string()?;
            self.symbols.push(Arc::from(symbol));
        }
        Ok(())
    }

    fn read_templates(&mut self) -> Result<()> {
        let count = self.input.read_uleb128()?;
        for _ in 0..count {
            let tag = TemplateTag::try_from(self.input.read_u8()?)
                .map_err(|_| Error::MalformedInput("unknown template tag"))?;
            let template = match tag {
                TemplateTag::Call => NodeTemplate::Call {
                    arity: self.read_count()?,
                },
                TemplateTag::CallId => NodeTemplate::CallId {
                    target: self.read_symbol_ref()?,
                    arity: self.read_count()?,
                },
                TemplateTag::Attribute => NodeTemplate::Attribute {
                    attr_count: self.read_count()?,
                },
            };
            self.templates.push(template);
        }
        Ok(())
    }

    fn read_node_table(&mut self) -> Result<()> {
        let run_count = self.input.read_uleb128()?;
        for _ in 0..run_count {
            let node_count = self.input.read_uleb128()?;
            let kind = EncodingKind::try_from(self.input.read_u8()?)
                .map_err(|_| Error::MalformedInput("unknown encoding kind tag"))?;
            match kind {
                EncodingKind::TemplatedNode => {
                    let template = self.read_template_ref()?;
                    for _ in 0..node_count {
                        let node = self.instantiate(template)?;
                        self.nodes.push(node);
                    }
                }
                EncodingKind::VariablyTemplatedNode => {
                    for _ in 0..node_count {
                        let template = self.read_template_ref()?;
                        let node = self.instantiate(template)?;
                        self.nodes.push(node);
                    }
                }
                EncodingKind::IdNode => {
                    for _ in 0..node_count {
                        let name = self.read_symbol()?;
                        self.nodes.push(self.factory.ident(name));
                    }
                }
                _ => {
                    for _ in 0..node_count {
                        let value = self.read_literal(kind)?;
                        self.nodes.push(self.factory.literal(value));
                    }
                }
            }
        }
        Ok(())
    }

    fn read_top_level(&mut self) -> Result<Vec<Node>> {
        let count = self.input.read_uleb128()?;
        let mut tops = Vec::new();
        for _ in 0..count {
            tops.push(self.read_node_ref()?);
        }
        Ok(tops)
    }

    /// Builds one node from `template`, consuming its slot references.
    fn instantiate(&mut self, template: NodeTemplate) -> Result<Node> {
        Ok(match template {
            NodeTemplate::Call { arity } => {
                let target = self.read_node_ref()?;
                let mut args = Vec::new();
                for _ in 0..arity {
                    args.push(self.read_node_ref()?);
                }
                self.factory.call(target, args)
            }
            NodeTemplate::CallId { target, arity } => {
                let target = self.factory.ident(self.symbol(target));
                let mut args = Vec::new();
                for _ in 0..arity {
                    args.push(self.read_node_ref()?);
                }
                self.factory.call(target, args)
            }
            NodeTemplate::Attribute { attr_count } => {
                let stripped = self.read_node_ref()?;
                let mut attrs = Vec::new();
                for _ in 0..attr_count {
                    attrs.push(self.read_node_ref()?);
                }
                self.factory.attach(stripped, attrs)
            }
        })
    }

    fn read_literal(&mut self, kind: EncodingKind) -> Result<Value> {
        Ok(match kind {
            EncodingKind::String => Value::String(self.read_symbol()?),
            EncodingKind::Int8 => Value::Int8(self.input.read_i8()?),
            EncodingKind::Int16 => Value::Int16(self.input.read_i16()?),
            EncodingKind::Int32 => Value::Int32(self.input.read_i32()?),
            EncodingKind::Int64 => Value::Int64(self.input.read_i64()?),
            EncodingKind::UInt8 => Value::UInt8(self.input.read_u8()?),
            EncodingKind::UInt16 => Value::UInt16(self.input.read_u16()?),
            EncodingKind::UInt32 => Value::UInt32(self.input.read_u32()?),
            EncodingKind::UInt64 => Value::UInt64(self.input.read_u64()?),
            EncodingKind::Float32 => Value::Float32(self.input.read_f32()?),
            EncodingKind::Float64 => Value::Float64(self.input.read_f64()?),
            EncodingKind::Char => {
                let unit = self.input.read_u16()?;
                match char::from_u32(u32::from(unit)) {
                    Some(c) => Value::Char(c),
                    None => return Err(Error::MalformedInput("lone utf-16 surrogate")),
                }
            }
            EncodingKind::Boolean => match self.input.read_u8()? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                _ => return Err(Error::MalformedInput("boolean byte out of range")),
            },
            EncodingKind::Void => Value::Void,
            EncodingKind::Null => Value::Null,
            EncodingKind::Decimal => Value::Decimal(Decimal {
                lo: self.input.read_u32()?,
                mid: self.input.read_u32()?,
                hi: self.input.read_u32()?,
                flags: self.input.read_u32()?,
            }),
            EncodingKind::BigInteger => {
                Value::BigInt(BigInt::from_signed_bytes_le(&self.input.read_bytes()?))
            }
            EncodingKind::TemplatedNode
            | EncodingKind::IdNode
            | EncodingKind::VariablyTemplatedNode => {
                return Err(Error::MalformedInput("node kind in literal position"));
            }
        })
    }

    /// A ULEB128 count that must fit a template field.
    fn read_count(&mut self) -> Result<u32> {
        u32::try_from(self.input.read_uleb128()?)
            .map_err(|_| Error::MalformedInput("oversized count"))
    }

    fn read_symbol_ref(&mut self) -> Result<SymbolId> {
        let index = self.input.read_uleb128()?;
        if index >= self.symbols.len() as u64 {
            return Err(Error::OutOfBoundsIndex {
                table: "symbol",
                index,
                len: self.symbols.len(),
            });
        }
        Ok(SymbolId(index as u32))
    }

    fn read_symbol(&mut self) -> Result<Arc<str>> {
        let id = self.read_symbol_ref()?;
        Ok(self.symbol(id))
    }

    fn symbol(&self, id: SymbolId) -> Arc<str> {
        self.symbols[id.index()].clone()
    }

    fn read_template_ref(&mut self) -> Result<NodeTemplate> {
        let index = self.input.read_uleb128()?;
        if index >= self.templates.len() as u64 {
            return Err(Error::OutOfBoundsIndex {
                table: "template",
                index,
                len: self.templates.len(),
            });
        }
        Ok(self.templates[index as usize])
    }

    /// A node-table reference; only positions already populated are legal.
    fn read_node_ref(&mut self) -> Result<Node> {
        let index = self.input.read_uleb128()?;
        if index >= self.nodes.len() as u64 {
            return Err(Error::ForwardReference {
                index,
                len: self.nodes.len(),
            });
        }
        Ok(self.nodes[index as usize].clone())
    }
}
