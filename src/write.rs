//! BLT encoding: table construction followed by emission.

use std::io::Write;

use log::debug;

use crate::builder::NodeTableBuilder;
use crate::codec::ByteWriter;
use crate::error::Result;
use crate::format::{EncodingKind, MAGIC, NodeTemplate, Version};
use crate::node::{Node, Value};

/// Encodes `nodes` as a complete BLT file.
///
/// The writer owns `writer` for the duration of the call. Data-dependent
/// failures (an unencodable literal) surface while the tables are built,
/// before the first byte is committed to the stream.
pub fn write_file<W: Write>(writer: W, nodes: &[Node]) -> Result<()> {
    let mut builder = NodeTableBuilder::new();
    builder.register_leaves(nodes)?;
    let mut tops = Vec::with_capacity(nodes.len());
    for node in nodes {
        tops.push(builder.get_index(node)?);
    }
    let runs = builder.take_runs();
    debug!(
        "encoding {} roots: {} symbols, {} templates, {} nodes in {} runs",
        nodes.len(),
        builder.symbols.len(),
        builder.templates.len(),
        builder.node_count(),
        runs.len()
    );

    let mut out = ByteWriter::new(writer);
    out.write_all(&MAGIC)?;
    out.write_u32(Version::CURRENT.to_word())?;

    out.write_uleb128(builder.symbols.len() as u64)?;
    for symbol in builder.symbols.iter() {
        out.write_str(symbol)?;
    }

    out.write_uleb128(builder.templates.len() as u64)?;
    for template in builder.templates.iter() {
        out.write_u8(template.tag() as u8)?;
        match *template {
            NodeTemplate::Call { arity } => out.write_uleb128(u64::from(arity))?,
            NodeTemplate::CallId { target, arity } => {
                out.write_uleb128(target.index() as u64)?;
                out.write_uleb128(u64::from(arity))?;
            }
            NodeTemplate::Attribute { attr_count } => out.write_uleb128(u64::from(attr_count))?,
        }
    }

    out.write_uleb128(runs.len() as u64)?;
    for run in &runs {
        out.write_uleb128(run.nodes.len() as u64)?;
        out.write_u8(run.kind as u8)?;
        if run.kind == EncodingKind::TemplatedNode {
            // One template reference shared by the whole run; the builder
            // split runs on template change to keep this sound.
            out.write_uleb128(run.template.unwrap().index() as u64)?;
        }
        for node in &run.nodes {
            emit_body(&mut out, &mut builder, node)?;
        }
    }

    out.write_uleb128(tops.len() as u64)?;
    for id in tops {
        out.write_uleb128(id.index() as u64)?;
    }
    Ok(())
}

/// One node's body: slot references for templated nodes, a symbol
/// reference for identifiers and strings, raw little-endian bytes for the
/// other literals. The node's shape determines its body; the run header
/// already carried the kind tag.
fn emit_body<W: Write>(
    out: &mut ByteWriter<W>,
    builder: &mut NodeTableBuilder,
    node: &Node,
) -> Result<()> {
    if node.has_attrs() {
        out.write_uleb128(builder.index_of(&node.strip_attrs()).index() as u64)?;
        for attr in node.attrs() {
            out.write_uleb128(builder.index_of(attr).index() as u64)?;
        }
    } else if let Some((target, args)) = node.as_call() {
        if !target.is_bare_ident() {
            out.write_uleb128(builder.index_of(target).index() as u64)?;
        }
        for arg in args {
            out.write_uleb128(builder.index_of(arg).index() as u64)?;
        }
    } else if let Some(name) = node.name() {
        out.write_uleb128(builder.symbols.get_index(name).index() as u64)?;
    } else {
        emit_literal(out, builder, node.value().unwrap())?;
    }
    Ok(())
}

fn emit_literal<W: Write>(
    out: &mut ByteWriter<W>,
    builder: &mut NodeTableBuilder,
    value: &Value,
) -> Result<()> {
    match value {
        // Self-identifying from the run's kind tag.
        Value::Null | Value::Void => {}
        Value::Bool(v) => out.write_u8(u8::from(*v))?,
        Value::Int8(v) => out.write_i8(*v)?,
        Value::Int16(v) => out.write_i16(*v)?,
        Value::Int32(v) => out.write_i32(*v)?,
        Value::Int64(v) => out.write_i64(*v)?,
        Value::UInt8(v) => out.write_u8(*v)?,
        Value::UInt16(v) => out.write_u16(*v)?,
        Value::UInt32(v) => out.write_u32(*v)?,
        Value::UInt64(v) => out.write_u64(*v)?,
        Value::Float32(v) => out.write_f32(*v)?,
        Value::Float64(v) => out.write_f64(*v)?,
        // Classification rejected anything beyond the BMP.
        Value::Char(c) => out.write_u16(*c as u16)?,
        Value::String(s) => out.write_uleb128(builder.symbols.get_index(s).index() as u64)?,
        Value::Decimal(d) => {
            out.write_u32(d.lo)?;
            out.write_u32(d.mid)?;
            out.write_u32(d.hi)?;
            out.write_u32(d.flags)?;
        }
        Value::BigInt(v) => out.write_bytes(&v.to_signed_bytes_le())?,
    }
    Ok(())
}
