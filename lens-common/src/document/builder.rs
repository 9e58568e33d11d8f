//! Builder seam between the value-stream parser and its consumers.
//!
//! The parser walks the tagged field stream exactly once and reports
//! structure through a [`ResourceBuilder`]. [`TreeBuilder`] materializes
//! the owned [`Document`] tree; the XML mirror implements the same trait
//! to emit elements instead of allocating a tree it would immediately
//! walk again.

use hashbrown::HashMap;

use crate::error::{Error, Result};

use super::arrays::resolve_spans;
use super::{ArrayData, Block, BlockKey, Document, Node, Value};

/// Streaming sink for one pass over a document's value stream.
///
/// Calls arrive in document order: `start_block`/`finish_block` bracket
/// nested blocks (the implicit root included), `add_value` and
/// `add_array` emit leaves into the innermost open block. `add_array`
/// carries only the declared pool offset and element count; the parser
/// calls `finish_arrays` once, after the final `END`, when pool spans
/// can be resolved.
pub trait ResourceBuilder {
    fn start_block(&mut self, key: Option<&str>);

    fn finish_block(&mut self);

    fn add_value(&mut self, key: Option<&str>, value: Value);

    fn add_array(&mut self, key: Option<&str>, offset: u32, count: u32);

    /// True once the root block's `END` has been consumed.
    fn is_finished(&self) -> bool;

    /// Resolve deferred arrays against the byte pool. `pool_base` is the
    /// pool's offset within the file, for error reporting.
    fn finish_arrays(&mut self, pool: &[u8], pool_base: usize) -> Result<()>;
}

/// Positional key for an unlabeled entry: the length of the enclosing
/// block at insertion time.
fn entry_key(block: &Block, key: Option<&str>) -> BlockKey {
    match key {
        Some(name) => BlockKey::Name(name.to_owned()),
        None => BlockKey::Index(block.len() as u32),
    }
}

/// [`ResourceBuilder`] that assembles an owned [`Document`].
#[derive(Debug, Default)]
pub struct TreeBuilder {
    /// Open blocks, innermost last. Index 0 is the implicit root.
    open: Vec<(Option<BlockKey>, Block)>,
    root: Option<Block>,
    /// Declared `(offset, count)` pairs, in discovery order.
    arrays: Vec<(u32, u32)>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            open: vec![(None, Block::new())],
            root: None,
            arrays: Vec::new(),
        }
    }

    fn current(&mut self) -> Option<&mut Block> {
        // Empty once the root has closed; like `finish_block`, later
        // calls are ignored rather than reopening the tree.
        self.open.last_mut().map(|(_, block)| block)
    }

    pub fn into_document(self) -> Result<Document> {
        let root = self
            .root
            .ok_or_else(|| Error::malformed("value stream ended with unclosed blocks"))?;
        Ok(Document { root })
    }
}

impl ResourceBuilder for TreeBuilder {
    fn start_block(&mut self, key: Option<&str>) {
        let Some(block) = self.current() else { return };
        let key = entry_key(block, key);
        self.open.push((Some(key), Block::new()));
    }

    fn finish_block(&mut self) {
        let Some((key, block)) = self.open.pop() else {
            return;
        };
        match (key, self.open.last_mut()) {
            (Some(key), Some((_, parent))) => parent.insert(key, Node::Block(block)),
            _ => self.root = Some(block),
        }
    }

    fn add_value(&mut self, key: Option<&str>, value: Value) {
        let Some(block) = self.current() else { return };
        let key = entry_key(block, key);
        block.insert(key, Node::Value(value));
    }

    fn add_array(&mut self, key: Option<&str>, offset: u32, count: u32) {
        if self.open.is_empty() {
            return;
        }
        self.arrays.push((offset, count));
        self.add_value(
            key,
            Value::Array(ArrayData { offset, count, bytes: Vec::new() }),
        );
    }

    fn is_finished(&self) -> bool {
        self.root.is_some()
    }

    fn finish_arrays(&mut self, pool: &[u8], _pool_base: usize) -> Result<()> {
        if self.arrays.is_empty() {
            return Ok(());
        }
        let mut spans: HashMap<u32, Vec<u8>> = HashMap::new();
        for span in resolve_spans(&self.arrays, pool.len())? {
            spans.insert(span.offset, pool[span.range].to_vec());
        }
        if let Some(root) = self.root.as_mut() {
            fill_arrays(root, &spans);
        }
        Ok(())
    }
}

fn fill_arrays(block: &mut Block, spans: &HashMap<u32, Vec<u8>>) {
    for node in block.values_mut() {
        match node {
            Node::Block(child) => fill_arrays(child, spans),
            Node::Value(Value::Array(array)) => {
                if let Some(bytes) = spans.get(&array.offset) {
                    array.bytes = bytes.clone();
                }
            }
            Node::Value(_) => {}
        }
    }
}
