//! Partition key sources and tag pairing.
//!
//! Every partition lives in its own file, `<root>/user_<id>.txt`, in one of
//! two encodings:
//! - `text`: one decimal key per `\n`-terminated line
//! - `binary`: back-to-back little-endian `u64` records
//!
//! The number of records found in the file decides how many keys are
//! returned. A load either yields every record or fails; it never hands back
//! a partially filled array.

use std::fs::File;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use memmap2::Mmap;
use tracing::{debug, warn};

use crate::error::LoadError;
use crate::{Key, Partition, Tag};

/// Width of one binary key record.
pub const BINARY_RECORD_SIZE: usize = std::mem::size_of::<Key>();

/// On-disk encoding of a partition file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum KeyEncoding {
    Binary,
    Text,
}

impl KeyEncoding {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyEncoding::Binary => "binary",
            KeyEncoding::Text => "text",
        }
    }
}

/// Directory holding one key file per partition.
#[derive(Clone, Debug)]
pub struct PartitionSource {
    root: PathBuf,
}

impl PartitionSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, partition: Partition) -> PathBuf {
        self.root.join(format!("user_{partition}.txt"))
    }

    /// Materialize every key of `partition`, in file order.
    pub fn load(&self, partition: Partition, encoding: KeyEncoding) -> Result<Vec<Key>, LoadError> {
        let path = self.path(partition);
        let file = File::open(&path).map_err(|source| LoadError::Open {
            partition,
            path: path.clone(),
            source,
        })?;
        let len = file
            .metadata()
            .map_err(|source| LoadError::Open {
                partition,
                path: path.clone(),
                source,
            })?
            .len();

        // Zero-length mappings are rejected by the OS.
        let keys = if len == 0 {
            decode(&[], encoding, partition, &path)?
        } else {
            // SAFETY: partition files are inputs to the run and are not
            // modified while it reads them.
            let map = unsafe { Mmap::map(&file) }.map_err(|source| LoadError::Map {
                partition,
                path: path.clone(),
                source,
            })?;
            decode(&map, encoding, partition, &path)?
        };

        debug!(
            partition,
            keys = keys.len(),
            encoding = encoding.as_str(),
            path = %path.display(),
            "loaded partition"
        );
        Ok(keys)
    }
}

/// Number of records `bytes` holds under `encoding`.
///
/// Text counts line terminators; a trailing fragment without one is not a
/// record. Binary counts whole fixed-width records.
pub fn count_records(bytes: &[u8], encoding: KeyEncoding) -> usize {
    match encoding {
        KeyEncoding::Text => bytes.iter().filter(|&&b| b == b'\n').count(),
        KeyEncoding::Binary => bytes.len() / BINARY_RECORD_SIZE,
    }
}

fn decode(
    bytes: &[u8],
    encoding: KeyEncoding,
    partition: Partition,
    path: &Path,
) -> Result<Vec<Key>, LoadError> {
    let count = count_records(bytes, encoding);
    let mut keys = Vec::with_capacity(count);

    match encoding {
        KeyEncoding::Binary => {
            let trailing = bytes.len() % BINARY_RECORD_SIZE;
            if trailing != 0 {
                return Err(LoadError::PartialRecord {
                    partition,
                    path: path.to_path_buf(),
                    trailing,
                });
            }
            keys.extend(bytes.chunks_exact(BINARY_RECORD_SIZE).map(|record| {
                let mut buf = [0u8; BINARY_RECORD_SIZE];
                buf.copy_from_slice(record);
                Key::from_le_bytes(buf)
            }));
        }
        KeyEncoding::Text => {
            let mut lines = bytes.split(|&b| b == b'\n');
            for (i, line) in lines.by_ref().take(count).enumerate() {
                let text = String::from_utf8_lossy(line);
                let key = text.trim().parse::<Key>().map_err(|_| LoadError::BadKey {
                    partition,
                    path: path.to_path_buf(),
                    line: i + 1,
                    text: text.into_owned(),
                })?;
                keys.push(key);
            }
            if let Some(rest) = lines.next() {
                if !rest.iter().all(u8::is_ascii_whitespace) {
                    warn!(
                        partition,
                        bytes = rest.len(),
                        path = %path.display(),
                        "ignoring unterminated final line"
                    );
                }
            }
        }
    }

    debug_assert_eq!(keys.len(), count);
    Ok(keys)
}

/// Tag value recorded with every key of `partition`.
#[inline]
pub fn partition_tag(partition: Partition) -> Tag {
    Tag::from(partition)
}

/// Pair every key with the same `tag`.
pub fn pair_with_tag(keys: &[Key], tag: Tag) -> Vec<(Key, Tag)> {
    keys.iter().map(|&key| (key, tag)).collect()
}
