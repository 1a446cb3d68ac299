//! Handles over resolved paths.
//!
//! Handles cache the decoded inode and hold a mutable read position, so they
//! are single-owner; open a separate handle per concurrent reader.

use std::collections::BTreeMap;
use std::fs::Permissions;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::time::{Duration, SystemTime};

use crate::dirent::{self, DirEntry};
use crate::error::{Error, Result};
use crate::filesystem::Image;
use crate::reader::ReadAt;
use crate::types::{DirentFileType, FileMode, Inode, Layout};

/// A resolved path: either a file-like handle or a directory handle.
///
/// Anything that is not a directory opens as [`Node::File`]; reading a
/// symlink's handle yields the target path bytes, device nodes only report
/// their type.
pub enum Node<R: ReadAt> {
    File(File<R>),
    Dir(Dir<R>),
}

impl<R: ReadAt> std::fmt::Debug for Node<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::File(file) => f.debug_tuple("Node::File").field(file).finish(),
            Node::Dir(dir) => f.debug_tuple("Node::Dir").field(dir).finish(),
        }
    }
}

impl<R: ReadAt> Node<R> {
    pub(crate) fn new(image: Image<R>, name: String, nid: u64, ftype: DirentFileType) -> Self {
        let handle = Handle {
            image,
            name,
            nid,
            ftype,
            inode: None,
        };
        if ftype.is_dir() {
            Node::Dir(Dir {
                handle,
                bn: 0,
                consumed: 0,
            })
        } else {
            Node::File(File { handle, offset: 0 })
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Node::File(file) => file.name(),
            Node::Dir(dir) => dir.name(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Dir(_))
    }

    pub fn stat(&mut self) -> Result<FileInfo> {
        match self {
            Node::File(file) => file.stat(),
            Node::Dir(dir) => dir.stat(),
        }
    }

    pub fn xattrs(&mut self) -> Result<BTreeMap<String, Vec<u8>>> {
        match self {
            Node::File(file) => file.xattrs(),
            Node::Dir(dir) => dir.xattrs(),
        }
    }

    pub fn into_file(self) -> Result<File<R>> {
        match self {
            Node::File(file) => Ok(file),
            Node::Dir(dir) => Err(Error::NotAFile(dir.handle.name)),
        }
    }

    pub fn into_dir(self) -> Result<Dir<R>> {
        match self {
            Node::Dir(dir) => Ok(dir),
            Node::File(file) => Err(Error::NotADirectory(file.handle.name)),
        }
    }
}

/// State shared by file and directory handles.
struct Handle<R: ReadAt> {
    image: Image<R>,
    name: String,
    nid: u64,
    ftype: DirentFileType,
    inode: Option<Inode>,
}

impl<R: ReadAt> Handle<R> {
    fn inode(&mut self) -> Result<Inode> {
        if let Some(inode) = self.inode {
            return Ok(inode);
        }
        let inode = self.image.inode(self.nid)?;
        self.inode = Some(inode);
        Ok(inode)
    }

    fn stat(&mut self) -> Result<FileInfo> {
        let inode = self.inode()?;
        FileInfo::new(&self.name, self.ftype, &inode)
    }

    fn xattrs(&mut self) -> Result<BTreeMap<String, Vec<u8>>> {
        let inode = self.inode()?;
        crate::xattr::read_xattrs(&self.image, &inode)
    }
}

/// A handle to a non-directory entry.
///
/// `File` implements [`std::io::Read`]; reads are sequential from a logical
/// offset starting at zero, and a read at the end of the file returns
/// `Ok(0)`.
pub struct File<R: ReadAt> {
    handle: Handle<R>,
    offset: usize,
}

impl<R: ReadAt> std::fmt::Debug for File<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File")
            .field("name", &self.handle.name)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

impl<R: ReadAt> File<R> {
    pub fn name(&self) -> &str {
        &self.handle.name
    }

    pub fn file_type(&self) -> DirentFileType {
        self.handle.ftype
    }

    /// The file size in bytes.
    pub fn size(&mut self) -> Result<u64> {
        Ok(self.handle.inode()?.data_size() as u64)
    }

    pub fn stat(&mut self) -> Result<FileInfo> {
        self.handle.stat()
    }

    pub fn xattrs(&mut self) -> Result<BTreeMap<String, Vec<u8>>> {
        self.handle.xattrs()
    }
}

impl<R: ReadAt> io::Read for File<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let inode = self.handle.inode().map_err(io::Error::from)?;
        let size = inode.data_size();

        let mut written = 0;
        while written < buf.len() && self.offset < size {
            let block = self
                .handle
                .image
                .load_block(&inode, self.offset)
                .map_err(io::Error::from)?;
            let data = block.bytes();
            let n = data.len().min(buf.len() - written);
            buf[written..written + n].copy_from_slice(&data[..n]);
            written += n;
            self.offset += n;
        }
        Ok(written)
    }
}

/// A handle to a directory.
pub struct Dir<R: ReadAt> {
    handle: Handle<R>,
    /// Next block of the entry stream, relative to the directory start.
    bn: usize,
    /// Entries already yielded from that block, dot entries included.
    consumed: usize,
}

impl<R: ReadAt> std::fmt::Debug for Dir<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dir")
            .field("name", &self.handle.name)
            .field("bn", &self.bn)
            .field("consumed", &self.consumed)
            .finish_non_exhaustive()
    }
}

impl<R: ReadAt> Dir<R> {
    pub fn name(&self) -> &str {
        &self.handle.name
    }

    pub fn stat(&mut self) -> Result<FileInfo> {
        self.handle.stat()
    }

    pub fn xattrs(&mut self) -> Result<BTreeMap<String, Vec<u8>>> {
        self.handle.xattrs()
    }

    /// Returns the next directory entries in on-disk order.
    ///
    /// With `n <= 0` every remaining entry is returned and a later call
    /// yields an empty vector. With `n > 0` at most `n` entries are
    /// returned per call; repeated calls produce the full sequence exactly
    /// once. The reserved `"."` and `".."` entries are never returned.
    pub fn read_dir(&mut self, n: isize) -> Result<Vec<DirEntry<R>>> {
        let inode = self.handle.inode()?;
        let size = inode.data_size();
        let block_size = self.handle.image.block_size();

        let mut entries = Vec::new();
        let mut pos = self.bn * block_size;
        while pos < size {
            let block = self.handle.image.load_block(&inode, pos)?;
            let table = dirent::DirentBlock::parse(block.bytes())?;
            for i in self.consumed..table.len() {
                let (dirent, name) = table.entry(i)?;
                self.consumed = i + 1;
                if name == "." || name == ".." {
                    continue;
                }
                entries.push(DirEntry::new(
                    self.handle.image.clone(),
                    name.into_owned(),
                    dirent.nid,
                    dirent.file_type.try_into()?,
                ));
                if n > 0 && entries.len() == n as usize {
                    if i + 1 == table.len() {
                        self.consumed = 0;
                        self.bn += 1;
                    }
                    return Ok(entries);
                }
            }
            self.consumed = 0;
            self.bn += 1;
            pos = self.bn * block_size;
        }
        Ok(entries)
    }
}

/// Decoded metadata of an entry, as returned by `stat`.
#[derive(Debug, Clone)]
pub struct FileInfo {
    name: String,
    ftype: DirentFileType,
    stat: Stat,
}

impl FileInfo {
    pub(crate) fn new(name: &str, ftype: DirentFileType, inode: &Inode) -> Result<FileInfo> {
        let (mtime, mtime_ns) = inode.mtime_raw();
        Ok(FileInfo {
            name: name.to_string(),
            ftype,
            stat: Stat {
                xattr_count: inode.xattr_count(),
                mode: inode.mode_raw(),
                size: inode.data_size() as u64,
                layout: inode.layout()?,
                raw_block_addr: inode.raw_block_addr(),
                ino: inode.ino(),
                nid: inode.id(),
                uid: inode.uid(),
                gid: inode.gid(),
                mtime,
                mtime_ns,
                nlink: inode.nlink(),
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.stat.size
    }

    /// Type and permission bits. The permission bits come from the inode;
    /// the type bits come from the directory entry that named it, which the
    /// format treats as authoritative.
    pub fn mode(&self) -> FileMode {
        FileMode::from_bits_retain(
            (self.stat.mode & FileMode::PERM_MASK) | self.ftype.mode_bits().bits(),
        )
    }

    pub fn permissions(&self) -> Permissions {
        Permissions::from_mode(self.mode().bits() as u32)
    }

    pub fn file_type(&self) -> DirentFileType {
        self.ftype
    }

    pub fn is_dir(&self) -> bool {
        self.ftype.is_dir()
    }

    /// Modification time. Compact inodes carry none and report the epoch.
    pub fn modified(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH
            + Duration::from_secs(self.stat.mtime)
            + Duration::from_nanos(self.stat.mtime_ns as u64)
    }

    pub fn uid(&self) -> u32 {
        self.stat.uid
    }

    pub fn gid(&self) -> u32 {
        self.stat.gid
    }

    pub fn nlink(&self) -> u32 {
        self.stat.nlink
    }

    pub fn ino(&self) -> u64 {
        self.stat.ino
    }

    pub fn raw_block_addr(&self) -> u32 {
        self.stat.raw_block_addr
    }

    /// The raw decoded record, for callers needing format-specific fields.
    pub fn stat(&self) -> &Stat {
        &self.stat
    }
}

/// The format-specific fields of a decoded inode.
#[derive(Debug, Clone, Copy)]
pub struct Stat {
    pub xattr_count: u16,
    /// The unmerged on-disk mode word.
    pub mode: u16,
    pub size: u64,
    pub layout: Layout,
    pub raw_block_addr: u32,
    /// The inode number stored on disk.
    pub ino: u64,
    /// The node id the inode was decoded from.
    pub nid: u64,
    pub uid: u32,
    pub gid: u32,
    pub mtime: u64,
    pub mtime_ns: u32,
    pub nlink: u32,
}
