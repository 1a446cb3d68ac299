//! The opened image and its decoding engine.

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use binrw::BinRead;
use bytes::Buf;
use tracing::{debug, trace};

use crate::dirent;
use crate::error::{Error, Result};
use crate::file::{Dir, File, Node};
use crate::pool::{Block, BlockPool};
use crate::reader::{ReadAt, read_exact_at};
use crate::types::{
    DirentFileType, Inode, InodeCompact, InodeExtended, Layout, MAGIC_NUMBER, SUPER_BLOCK_OFFSET,
    SuperBlock,
};
use crate::walkdir::WalkDir;

/// An opened EROFS image.
///
/// `Image` validates the super block on construction and then resolves
/// paths, decodes inodes, and serves block reads on demand. It is cheap to
/// clone and safe to share across threads; every open handle keeps its own
/// clone. The reader is only ever used positionally.
pub struct Image<R: ReadAt> {
    reader: Arc<R>,
    super_block: SuperBlock,
    block_size: usize,
    pool: Arc<BlockPool>,
}

impl<R: ReadAt> Clone for Image<R> {
    fn clone(&self) -> Self {
        Self {
            reader: Arc::clone(&self.reader),
            super_block: self.super_block,
            block_size: self.block_size,
            pool: Arc::clone(&self.pool),
        }
    }
}

impl<R: ReadAt> fmt::Debug for Image<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("super_block", &self.super_block)
            .field("block_size", &self.block_size)
            .finish_non_exhaustive()
    }
}

impl<R: ReadAt> Image<R> {
    /// Opens an image, validating the super block at offset 1024.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidSuperblock`] when the record is short, the magic
    /// number mismatches, or the block size bits fall outside `[9, 24]`.
    pub fn new(reader: R) -> Result<Self> {
        let mut sb_buf = [0u8; SuperBlock::SIZE];
        read_exact_at(&reader, &mut sb_buf, SUPER_BLOCK_OFFSET).map_err(|err| match err {
            Error::Io(err) => Error::Io(err),
            _ => Error::InvalidSuperblock("short read".to_string()),
        })?;
        let super_block = SuperBlock::read(&mut Cursor::new(&sb_buf[..]))
            .map_err(|err| Error::InvalidSuperblock(err.to_string()))?;

        if super_block.magic != MAGIC_NUMBER {
            return Err(Error::InvalidSuperblock(format!(
                "invalid magic number: 0x{:x}",
                super_block.magic
            )));
        }
        if !(9..=24).contains(&super_block.blk_size_bits) {
            return Err(Error::InvalidSuperblock(format!(
                "invalid block size bits: {}",
                super_block.blk_size_bits
            )));
        }

        let block_size = 1usize << super_block.blk_size_bits;
        debug!(
            block_size,
            root_nid = super_block.root_nid,
            inos = super_block.inos,
            "opened erofs image"
        );
        Ok(Self {
            reader: Arc::new(reader),
            super_block,
            block_size,
            pool: Arc::new(BlockPool::new(block_size)),
        })
    }

    /// The validated super block, for callers needing format-specific fields.
    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Resolves `path` and returns a handle to whatever it names.
    ///
    /// Absolute and relative paths are equivalent; empty and `"."`
    /// components are skipped, so `"/"` and `""` both name the root
    /// directory.
    pub fn open(&self, path: &str) -> Result<Node<R>> {
        let (name, nid, ftype) = self.resolve(path)?;
        debug!(path, nid, "resolved path");
        Ok(Node::new(self.clone(), name, nid, ftype))
    }

    /// Opens `path`, requiring it to be a regular file.
    pub fn open_file(&self, path: &str) -> Result<File<R>> {
        match self.open(path)? {
            Node::File(file) if file.file_type().is_file() => Ok(file),
            _ => Err(Error::NotAFile(path.to_string())),
        }
    }

    /// Opens `path`, requiring it to be a directory.
    pub fn open_dir(&self, path: &str) -> Result<Dir<R>> {
        match self.open(path)? {
            Node::Dir(dir) => Ok(dir),
            Node::File(_) => Err(Error::NotADirectory(path.to_string())),
        }
    }

    /// Recursively walks the tree rooted at `path`.
    pub fn walk_dir(&self, path: &str) -> Result<WalkDir<R>> {
        WalkDir::new(self.clone(), path)
    }

    /// Walks `path` component by component from the root nid. The dirent
    /// that led to each component supplies its file type.
    fn resolve(&self, path: &str) -> Result<(String, u64, DirentFileType)> {
        let mut nid = self.super_block.root_nid as u64;
        let mut ftype = DirentFileType::Directory;
        let mut name = String::from("/");

        for part in path.split('/').filter(|part| !part.is_empty() && *part != ".") {
            if !ftype.is_dir() {
                return Err(Error::NotADirectory(path.to_string()));
            }
            let inode = self.inode(nid)?;
            let (child_nid, child_ftype) = self
                .lookup(&inode, part)?
                .ok_or_else(|| Error::NotFound(path.to_string()))?;
            nid = child_nid;
            ftype = child_ftype;
            name = part.to_string();
        }
        Ok((name, nid, ftype))
    }

    /// Scans a directory's blocks for `name`, stopping at the first match.
    fn lookup(&self, inode: &Inode, name: &str) -> Result<Option<(u64, DirentFileType)>> {
        let size = inode.data_size();
        let mut pos = 0;
        while pos < size {
            let block = self.load_block(inode, pos)?;
            if let Some(found) = dirent::find_entry(block.bytes(), name)? {
                trace!(name, nid = found.0, "matched directory entry");
                return Ok(Some(found));
            }
            pos = (pos / self.block_size + 1) * self.block_size;
        }
        Ok(None)
    }

    /// Decodes the inode at `nid`. The record is read in two steps so that a
    /// compact inode whose tail slot falls outside the image still decodes.
    pub(crate) fn inode(&self, nid: u64) -> Result<Inode> {
        let offset = self.inode_offset(nid);
        let mut buf = [0u8; InodeExtended::SIZE];
        read_exact_at(self.reader.as_ref(), &mut buf[..InodeCompact::SIZE], offset)?;

        let mut format_bytes = &buf[..2];
        let format = format_bytes.get_u16_le();
        let inode = if Inode::is_compact_format(format) {
            let compact = InodeCompact::read(&mut Cursor::new(&buf[..InodeCompact::SIZE]))?;
            Inode::Compact((nid, compact))
        } else {
            read_exact_at(
                self.reader.as_ref(),
                &mut buf[InodeCompact::SIZE..],
                offset + InodeCompact::SIZE as u64,
            )?;
            let extended = InodeExtended::read(&mut Cursor::new(&buf[..]))?;
            Inode::Extended((nid, extended))
        };
        // reject unknown layout tags up front
        inode.layout()?;
        Ok(inode)
    }

    /// Loads the block containing logical byte `pos` of `inode`.
    ///
    /// The returned [`Block`] owns a pooled buffer; its `bytes()` are the
    /// valid bytes of the logical stream starting at `pos`. Fails with
    /// [`Error::Eof`] when `pos` is at or past the inode's size.
    pub(crate) fn load_block(&self, inode: &Inode, pos: usize) -> Result<Block<'_>> {
        let size = inode.data_size();
        if pos >= size {
            return Err(Error::Eof);
        }

        let bits = self.super_block.blk_size_bits;
        let block_size = self.block_size;
        let nblocks = size.div_ceil(block_size);
        let bn = pos >> bits;
        let mut offset = pos - (bn << bits);
        let mut max_size = block_size;
        let addr;

        match inode.layout()? {
            Layout::FlatPlain => {
                addr = (inode.raw_block_addr() as u64 + bn as u64) << bits;
                if bn == nblocks - 1 {
                    max_size = size - (bn << bits);
                }
            }
            Layout::FlatInline => {
                if bn == nblocks - 1 {
                    // The tail block lives right after the inode and its
                    // xattr body, inside the meta block holding the inode.
                    let inode_offset = self.inode_offset(inode.id());
                    addr = inode_offset & !(block_size as u64 - 1);
                    let inline_offset = (inode_offset as usize & (block_size - 1))
                        + inode.size()
                        + inode.xattr_size();
                    let tail_len = size - (bn << bits);
                    max_size = inline_offset + tail_len;
                    if max_size > block_size {
                        return Err(Error::Corrupted(format!(
                            "inline data crosses block boundary for nid {}",
                            inode.id()
                        )));
                    }
                    offset += inline_offset;
                } else {
                    addr = (inode.raw_block_addr() as u64 + bn as u64) << bits;
                }
            }
            Layout::ChunkBased => {
                return Err(Error::NotImplemented(format!(
                    "chunk-based layout for nid {}",
                    inode.id()
                )));
            }
            Layout::CompressedFull | Layout::CompressedCompact => {
                return Err(Error::NotImplemented(format!(
                    "compressed layout for nid {}",
                    inode.id()
                )));
            }
        }

        let mut buf = self.pool.get();
        read_exact_at(self.reader.as_ref(), &mut buf[..max_size], addr)?;
        trace!(
            nid = inode.id(),
            pos,
            addr,
            expected = max_size,
            "loaded block"
        );
        Ok(Block::new(buf, offset, max_size))
    }

    /// Reads raw bytes from the image, for decoders that address regions
    /// outside inode data, such as xattr bodies.
    pub(crate) fn read_exact(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        read_exact_at(self.reader.as_ref(), buf, offset)
    }

    /// Byte offset of the inode at `nid`. Compact inode size is the
    /// addressing unit regardless of the variant stored there.
    pub(crate) fn inode_offset(&self, nid: u64) -> u64 {
        self.block_offset(self.super_block.meta_blk_addr) + nid * InodeCompact::SIZE as u64
    }

    pub(crate) fn block_offset(&self, block: u32) -> u64 {
        (block as u64) << self.super_block.blk_size_bits
    }
}
