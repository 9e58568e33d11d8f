//! `.lns` lens archive container.
//!
//! An archive is a zstd-compressed blob of member files plus a path
//! table:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ 0x00  magic "LZC\0"                                        │
//! │ 0x04  container version (1)                                │
//! │ 0x08  fileCount: u32                                       │
//! │ 0x0c  headerSize: u32       (0x48 + table size)            │
//! │ 0x10  reserved / section markers                           │
//! │ 0x48  file table: fileCount × entry                        │
//! │       entry = pathLen:u32, path, 4 reserved,               │
//! │               fileSize:u32, fileOffset:u32                 │
//! │ headerSize      marker (1)                                 │
//! │ headerSize+0x04 compressedSize: u32                        │
//! │ headerSize+0x08 zstd frame of all files back to back       │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! `fileOffset`/`fileSize` index into the *decompressed* blob. Member
//! paths are archive-absolute (`/scene.scn`).

use std::fs;
use std::path::Path;

use indexmap::IndexMap;

use crate::cursor::{ByteReader, ByteWriter};
use crate::error::{Error, Result};

pub const LNS_MAGIC: &[u8; 4] = b"LZC\0";

/// File offset where the path table begins.
const TABLE_START: usize = 0x48;

/// Decoded `.lns` archive: member paths to file contents, in table
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LnsArchive {
    pub files: IndexMap<String, Vec<u8>>,
}

impl LnsArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode an archive, decompressing the blob once and slicing every
    /// member out of it.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        if reader.read_bytes(4)? != LNS_MAGIC {
            return Err(Error::InvalidArchive);
        }
        reader.skip(4)?; // container version
        let file_count = reader.read_u32()?;
        let header_size = reader.read_u32()? as usize;

        reader.seek(header_size.checked_add(4).ok_or(Error::OutOfBounds)?)?;
        let compressed_size = reader.read_u32()? as usize;
        let compressed = reader.read_bytes(compressed_size)?;
        let blob = zstd::stream::decode_all(compressed).map_err(Error::CorruptArchive)?;

        reader.seek(TABLE_START)?;
        let mut blob_reader = ByteReader::new(&blob);
        let mut files = IndexMap::new();
        for _ in 0..file_count {
            let path_len = reader.read_u32()? as usize;
            let path = reader.read_str(path_len)?.to_owned();
            reader.skip(4)?;
            let file_size = reader.read_u32()? as usize;
            let file_offset = reader.read_u32()? as usize;

            blob_reader.seek(file_offset)?;
            let contents = blob_reader.read_bytes(file_size)?.to_vec();
            files.insert(path, contents);
        }

        tracing::debug!(files = files.len(), "decoded lns archive");
        Ok(Self { files })
    }

    /// Encode the archive: members are concatenated in map order,
    /// compressed as one zstd frame, and indexed by the path table.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut table = ByteWriter::new();
        let mut blob = ByteWriter::new();
        for (path, contents) in &self.files {
            table.write_u32(path.len() as u32);
            table.write_str(path);
            table.write_u32(0);
            table.write_u32(contents.len() as u32);
            table.write_u32(blob.len() as u32);
            blob.write_bytes(contents);
        }

        let blob = blob.into_bytes();
        let compressed =
            zstd::stream::encode_all(blob.as_slice(), 0).map_err(Error::CorruptArchive)?;

        let mut file = ByteWriter::new();
        file.write_bytes(LNS_MAGIC);
        file.write_u32(1);
        file.write_u32(self.files.len() as u32);
        file.write_u32((TABLE_START + table.len()) as u32);
        file.write_u32(1);
        file.write_u32(1);
        file.write_u32(blob.len() as u32);
        file.write_u32(compressed.len() as u32);
        file.write_bytes(&[0u8; 32]);
        file.write_u32(2);
        file.write_u32(table.len() as u32);
        file.write_bytes(table.as_slice());
        file.write_u32(1);
        file.write_u32(compressed.len() as u32);
        file.write_bytes(&compressed);
        Ok(file.into_bytes())
    }

    /// Build an archive from a directory tree. Paths become
    /// archive-absolute with forward slashes, in sorted walk order.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut files = IndexMap::new();
        for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(dir) else {
                continue;
            };
            let path = format!(
                "/{}",
                relative.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/")
            );
            files.insert(path, fs::read(entry.path())?);
        }
        Ok(Self { files })
    }

    /// Write every member under `dir`, creating directories as needed.
    pub fn extract_to(&self, dir: &Path) -> Result<()> {
        for (path, contents) in &self.files {
            let target = dir.join(path.trim_start_matches('/'));
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, contents)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_archive() -> LnsArchive {
        let mut archive = LnsArchive::new();
        archive.files.insert("/a.txt".to_owned(), b"abc".to_vec());
        archive.files.insert("/b/c.txt".to_owned(), Vec::new());
        archive
    }

    #[test]
    fn test_archive_round_trip() {
        let archive = sample_archive();
        let bytes = archive.to_bytes().unwrap();
        let decoded = LnsArchive::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, archive);
        // Map order follows the table.
        let paths: Vec<_> = decoded.files.keys().cloned().collect();
        assert_eq!(paths, ["/a.txt", "/b/c.txt"]);
    }

    #[test]
    fn test_archive_layout() {
        let bytes = sample_archive().to_bytes().unwrap();
        assert_eq!(&bytes[0..4], LNS_MAGIC);
        let file_count = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        assert_eq!(file_count, 2);
        // Entries: (4+6+12) + (4+8+12) = 46 bytes of table after 0x48.
        let header_size = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        assert_eq!(header_size, 0x48 + 46);
        // First table entry starts at 0x48 with the path length.
        let path_len = u32::from_le_bytes(bytes[0x48..0x4c].try_into().unwrap());
        assert_eq!(path_len, 6);
        assert_eq!(&bytes[0x4c..0x52], b"/a.txt");
    }

    #[test]
    fn test_zero_length_member() {
        let bytes = sample_archive().to_bytes().unwrap();
        let decoded = LnsArchive::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.files["/b/c.txt"], Vec::<u8>::new());
        assert_eq!(decoded.files["/a.txt"], b"abc");
    }

    #[test]
    fn test_empty_archive() {
        let bytes = LnsArchive::new().to_bytes().unwrap();
        let decoded = LnsArchive::from_bytes(&bytes).unwrap();
        assert!(decoded.files.is_empty());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = sample_archive().to_bytes().unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            LnsArchive::from_bytes(&bytes),
            Err(Error::InvalidArchive)
        ));
    }

    #[test]
    fn test_corrupt_blob_rejected() {
        let archive = sample_archive();
        let mut bytes = archive.to_bytes().unwrap();
        // Stomp the zstd frame magic at the start of the compressed blob.
        let header_size = u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;
        for byte in &mut bytes[header_size + 8..header_size + 12] {
            *byte = 0xaa;
        }
        assert!(matches!(
            LnsArchive::from_bytes(&bytes),
            Err(Error::CorruptArchive(_))
        ));
    }

    #[test]
    fn test_dir_round_trip() {
        let archive = sample_archive();
        let dir = tempfile::tempdir().unwrap();
        archive.extract_to(dir.path()).unwrap();
        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"abc");
        assert_eq!(fs::read(dir.path().join("b/c.txt")).unwrap(), b"");

        let rebuilt = LnsArchive::from_dir(dir.path()).unwrap();
        assert_eq!(rebuilt, archive);
    }
}
