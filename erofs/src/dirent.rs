//! Directory block decoding.
//!
//! Each directory block opens with a table of 12-byte entries. The table's
//! length is implicit: the first entry's `name_off` points at the first name
//! byte, so `name_off / 12` is the entry count. A name runs from its entry's
//! `name_off` to the next entry's, or to the end of the block's valid bytes
//! for the last entry, with trailing NUL padding trimmed.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Cursor;

use binrw::BinRead;

use crate::error::{Error, Result};
use crate::file::{FileInfo, Node};
use crate::filesystem::Image;
use crate::reader::ReadAt;
use crate::types::{Dirent, DirentFileType};

/// The decoded entry table of one directory block.
#[derive(Debug)]
pub(crate) struct DirentBlock<'a> {
    data: &'a [u8],
    count: usize,
}

impl<'a> DirentBlock<'a> {
    pub(crate) fn parse(data: &'a [u8]) -> Result<Self> {
        let first = read_nth_dirent(data, 0)?;
        let table_len = first.name_off as usize;
        if table_len == 0 || table_len % Dirent::SIZE != 0 || table_len > data.len() {
            return Err(Error::Corrupted(format!(
                "invalid directory entry table size {table_len}"
            )));
        }
        Ok(Self {
            data,
            count: table_len / Dirent::SIZE,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.count
    }

    /// Decodes entry `i` and its name.
    pub(crate) fn entry(&self, i: usize) -> Result<(Dirent, Cow<'a, str>)> {
        let dirent = read_nth_dirent(self.data, i)?;
        let name_start = dirent.name_off as usize;
        let name_end = if i + 1 < self.count {
            read_nth_dirent(self.data, i + 1)?.name_off as usize
        } else {
            self.data.len()
        };
        if name_end <= name_start || name_end > self.data.len() {
            return Err(Error::Corrupted(format!(
                "invalid directory entry name offset {name_start}"
            )));
        }

        let name = &self.data[name_start..name_end];
        let name = match name.iter().position(|b| *b == 0) {
            Some(nul) => &name[..nul],
            None => name,
        };
        Ok((dirent, String::from_utf8_lossy(name)))
    }
}

/// Scans one directory block for `name`, skipping the dot entries.
pub(crate) fn find_entry(data: &[u8], name: &str) -> Result<Option<(u64, DirentFileType)>> {
    let block = DirentBlock::parse(data)?;
    for i in 0..block.len() {
        let (dirent, entry_name) = block.entry(i)?;
        if entry_name == "." || entry_name == ".." {
            continue;
        }
        if entry_name == name {
            return Ok(Some((dirent.nid, dirent.file_type.try_into()?)));
        }
    }
    Ok(None)
}

fn read_nth_dirent(data: &[u8], n: usize) -> Result<Dirent> {
    let start = n * Dirent::SIZE;
    let slice = data
        .get(start..start + Dirent::SIZE)
        .ok_or_else(|| Error::OutOfBounds("failed to parse directory entry".to_string()))?;
    Ok(Dirent::read(&mut Cursor::new(slice))?)
}

/// A directory entry yielded by [`Dir::read_dir`](crate::Dir::read_dir).
///
/// Entries keep a handle to the image so a child can be opened or stat'ed
/// without resolving its path again.
pub struct DirEntry<R: ReadAt> {
    image: Image<R>,
    file_name: String,
    nid: u64,
    file_type: DirentFileType,
}

impl<R: ReadAt> DirEntry<R> {
    pub(crate) fn new(
        image: Image<R>,
        file_name: String,
        nid: u64,
        file_type: DirentFileType,
    ) -> Self {
        Self {
            image,
            file_name,
            nid,
            file_type,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_type(&self) -> DirentFileType {
        self.file_type
    }

    pub fn is_dir(&self) -> bool {
        self.file_type.is_dir()
    }

    /// The node id this entry points at.
    pub fn nid(&self) -> u64 {
        self.nid
    }

    /// Decodes the child's inode and returns its metadata.
    pub fn info(&self) -> Result<FileInfo> {
        let inode = self.image.inode(self.nid)?;
        FileInfo::new(&self.file_name, self.file_type, &inode)
    }

    /// Opens a handle to the child without re-resolving its path.
    pub fn open(&self) -> Node<R> {
        Node::new(
            self.image.clone(),
            self.file_name.clone(),
            self.nid,
            self.file_type,
        )
    }

    /// Decodes the child's extended attributes.
    pub fn xattrs(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        let inode = self.image.inode(self.nid)?;
        crate::xattr::read_xattrs(&self.image, &inode)
    }
}

impl<R: ReadAt> fmt::Debug for DirEntry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirEntry")
            .field("file_name", &self.file_name)
            .field("nid", &self.nid)
            .field("file_type", &self.file_type)
            .finish()
    }
}
