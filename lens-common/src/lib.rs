//! Shared codecs for Snapchat lens resource files
//!
//! This crate provides the format layer shared between:
//! - `lens-assets` (mesh/scene/material interpretation)
//! - conversion tools built on the XML mirror
//!
//! # Modules
//!
//! - [`cursor`] - Little-endian byte readers and writers
//! - [`document`] - Tagged-field resource documents (`.scn`, `.mesh`)
//! - [`archive`] - The `.lns` zstd-compressed archive container
//! - [`xml`] - Editable XML mirror of resource documents

pub mod archive;
pub mod cursor;
pub mod document;
pub mod error;
pub mod xml;

pub use archive::{LNS_MAGIC, LnsArchive};
pub use cursor::{ByteReader, ByteWriter};
pub use document::builder::{ResourceBuilder, TreeBuilder};
pub use document::serializer::ResourceSerializer;
pub use document::{ArrayData, Block, BlockKey, Document, FieldTag, Node, Value};
pub use error::{Error, Result};
pub use xml::{resource_to_xml, xml_to_resource};
