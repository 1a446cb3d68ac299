//! On-disk records of the EROFS format.
//!
//! All multi-byte integers are little-endian. Record sizes are fixed by the
//! format: the super block is 128 bytes, compact inodes 32, extended inodes
//! 64, and directory entries 12. Compact inode size is also the addressing
//! unit of the inode table regardless of which variant is stored.

use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::time::{Duration, SystemTime};

use binrw::BinRead;
use rustix::fs::FileType;

use crate::error::{Error, Result};

pub const MAGIC_NUMBER: u32 = 0xe0f5e1e2;
pub const SUPER_BLOCK_OFFSET: u64 = 1024;

/// The 128-byte record at offset 1024 describing the whole image.
#[repr(C)]
#[derive(Debug, Clone, Copy, BinRead)]
#[br(little)]
pub struct SuperBlock {
    pub magic: u32,
    pub checksum: u32,
    pub feature_compat: u32,
    pub blk_size_bits: u8,
    pub ext_slots: u8,
    pub root_nid: u16,
    pub inos: u64,
    pub build_time: u64,
    pub build_time_ns: u32,
    pub blocks: u32,
    pub meta_blk_addr: u32,
    pub xattr_blk_addr: u32,
    pub uuid: [u8; 16],
    pub volume_name: [u8; 16],
    pub feature_incompat: u32,
    pub compr_algs: u16,
    pub extra_devices: u16,
    pub devt_slot_off: u16,
    pub dir_blk_bits: u8,
    pub xattr_prefix_count: u8,
    pub xattr_prefix_start: u32,
    pub packed_nid: u64,
    pub xattr_filter_res: u8,
    pub reserved: [u8; 23],
}

impl SuperBlock {
    pub const SIZE: usize = 128;
}

/// Data layout of an inode, from bits 1..3 of the format word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Layout {
    FlatPlain = 0,
    CompressedFull = 1,
    FlatInline = 2,
    CompressedCompact = 3,
    ChunkBased = 4,
}

impl TryFrom<u8> for Layout {
    type Error = Error;
    fn try_from(x: u8) -> Result<Self> {
        use Layout::*;
        match x {
            0 => Ok(FlatPlain),
            1 => Ok(CompressedFull),
            2 => Ok(FlatInline),
            3 => Ok(CompressedCompact),
            4 => Ok(ChunkBased),
            x => Err(Error::InvalidLayout(x)),
        }
    }
}

bitflags::bitflags! {
    /// POSIX style type and permission bits as stored in the inode mode word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileMode: u16 {
        const READ = 0o400;
        const WRITE = 0o200;
        const EXEC = 0o100;
        const READ_GROUP = 0o040;
        const WRITE_GROUP = 0o020;
        const EXEC_GROUP = 0o010;
        const READ_OTHER = 0o004;
        const WRITE_OTHER = 0o002;
        const EXEC_OTHER = 0o001;
        const SETUID = 0o004000;
        const SETGID = 0o002000;
        const STICKY = 0o001000;
        const NAMED_PIPE = 0o010000;
        const CHAR_DEVICE = 0o020000;
        const DIR = 0o040000;
        const BLOCK_DEVICE = 0o060000;
        const REGULAR = 0o100000;
        const SYMLINK = 0o120000;
        const SOCKET = 0o140000;
    }
}

impl FileMode {
    /// Mask selecting the file type bits of a mode word.
    pub const TYPE_MASK: u16 = 0o170000;
    /// Mask selecting the permission bits, including setuid/setgid/sticky.
    pub const PERM_MASK: u16 = 0o007777;

    pub fn type_bits(self) -> u16 {
        self.bits() & Self::TYPE_MASK
    }

    pub fn is_dir(self) -> bool {
        self.type_bits() == Self::DIR.bits()
    }

    pub fn is_file(self) -> bool {
        self.type_bits() == Self::REGULAR.bits()
    }

    pub fn is_symlink(self) -> bool {
        self.type_bits() == Self::SYMLINK.bits()
    }
}

/// A decoded inode paired with its node id.
///
/// The two on-disk variants share this unified view; callers branch on the
/// accessors rather than on the variant.
#[derive(Debug, Clone, Copy)]
pub enum Inode {
    Compact((u64, InodeCompact)),
    Extended((u64, InodeExtended)),
}

impl Inode {
    /// Bit 0 of the format word selects extended (1) against compact (0).
    pub fn is_compact_format(format: u16) -> bool {
        (format & 0x01) == 0
    }

    /// The node id this inode was decoded from.
    pub fn id(&self) -> u64 {
        match self {
            Self::Compact((nid, _)) => *nid,
            Self::Extended((nid, _)) => *nid,
        }
    }

    /// The inode number recorded on disk, distinct from the node id.
    pub fn ino(&self) -> u64 {
        match self {
            Self::Compact((_, n)) => n.ino as u64,
            Self::Extended((_, n)) => n.ino as u64,
        }
    }

    pub fn layout(&self) -> Result<Layout> {
        let format = match self {
            Self::Compact((_, n)) => n.format,
            Self::Extended((_, n)) => n.format,
        };
        (((format & 0x0e) >> 1) as u8).try_into()
    }

    /// The on-disk size of this inode record, 32 or 64 bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::Compact(_) => InodeCompact::SIZE,
            Self::Extended(_) => InodeExtended::SIZE,
        }
    }

    /// The logical size in bytes of the data this inode addresses.
    #[inline]
    pub fn data_size(&self) -> usize {
        match self {
            Self::Compact((_, n)) => n.size as usize,
            Self::Extended((_, n)) => n.size as usize,
        }
    }

    pub fn raw_block_addr(&self) -> u32 {
        match self {
            Self::Compact((_, n)) => n.raw_block_addr,
            Self::Extended((_, n)) => n.raw_block_addr,
        }
    }

    pub fn xattr_count(&self) -> u16 {
        match self {
            Self::Compact((_, n)) => n.xattr_count,
            Self::Extended((_, n)) => n.xattr_count,
        }
    }

    /// Byte size of the inline xattr body that follows this inode on disk.
    pub fn xattr_size(&self) -> usize {
        let count = self.xattr_count();
        if count == 0 {
            0
        } else {
            XattrHeader::SIZE + (count - 1) as usize * XattrEntry::SIZE
        }
    }

    pub fn mode_raw(&self) -> u16 {
        match self {
            Self::Compact((_, n)) => n.mode,
            Self::Extended((_, n)) => n.mode,
        }
    }

    pub fn file_type(&self) -> FileType {
        FileType::from_raw_mode(self.mode_raw() as u32)
    }

    pub fn is_dir(&self) -> bool {
        self.file_type().is_dir()
    }

    pub fn is_file(&self) -> bool {
        self.file_type().is_file()
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type().is_symlink()
    }

    pub fn permissions(&self) -> Permissions {
        Permissions::from_mode(self.mode_raw() as u32)
    }

    /// Modification time. Compact inodes do not record one; their time is
    /// reported as zero through [`Inode::mtime_raw`] and as `None` here.
    pub fn modified(&self) -> Option<SystemTime> {
        match self {
            Self::Compact(_) => None,
            Self::Extended((_, n)) => Some(
                SystemTime::UNIX_EPOCH
                    + Duration::from_secs(n.mtime)
                    + Duration::from_nanos(n.mtime_ns as u64),
            ),
        }
    }

    /// Raw seconds and nanoseconds, zero for compact inodes.
    pub fn mtime_raw(&self) -> (u64, u32) {
        match self {
            Self::Compact(_) => (0, 0),
            Self::Extended((_, n)) => (n.mtime, n.mtime_ns),
        }
    }

    pub fn uid(&self) -> u32 {
        match self {
            Self::Compact((_, n)) => n.uid as u32,
            Self::Extended((_, n)) => n.uid,
        }
    }

    pub fn gid(&self) -> u32 {
        match self {
            Self::Compact((_, n)) => n.gid as u32,
            Self::Extended((_, n)) => n.gid,
        }
    }

    pub fn nlink(&self) -> u32 {
        match self {
            Self::Compact((_, n)) => n.nlink as u32,
            Self::Extended((_, n)) => n.nlink,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, BinRead)]
#[br(little)]
pub struct InodeCompact {
    pub format: u16,
    pub xattr_count: u16,
    pub mode: u16,
    pub nlink: u16,
    pub size: u32,
    pub reserved: u32,
    pub raw_block_addr: u32,
    pub ino: u32,
    pub uid: u16,
    pub gid: u16,
    pub reserved2: u32,
}

impl InodeCompact {
    pub const SIZE: usize = 32;
}

#[repr(C)]
#[derive(Debug, Clone, Copy, BinRead)]
#[br(little)]
pub struct InodeExtended {
    pub format: u16,
    pub xattr_count: u16,
    pub mode: u16,
    pub reserved: u16,
    pub size: u64,
    pub raw_block_addr: u32,
    pub ino: u32,
    pub uid: u32,
    pub gid: u32,
    pub mtime: u64,
    pub mtime_ns: u32,
    pub nlink: u32,
    pub reserved2: [u8; 16],
}

impl InodeExtended {
    pub const SIZE: usize = 64;
}

/// File type recorded in a directory entry.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DirentFileType {
    Unknown = 0,
    RegularFile = 1,
    Directory = 2,
    CharacterDevice = 3,
    BlockDevice = 4,
    Fifo = 5,
    Socket = 6,
    Symlink = 7,
}

impl DirentFileType {
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory)
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Self::RegularFile)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self, Self::Symlink)
    }

    /// The mode type bits equivalent to this entry type.
    pub fn mode_bits(&self) -> FileMode {
        match self {
            Self::Unknown => FileMode::empty(),
            Self::RegularFile => FileMode::REGULAR,
            Self::Directory => FileMode::DIR,
            Self::CharacterDevice => FileMode::CHAR_DEVICE,
            Self::BlockDevice => FileMode::BLOCK_DEVICE,
            Self::Fifo => FileMode::NAMED_PIPE,
            Self::Socket => FileMode::SOCKET,
            Self::Symlink => FileMode::SYMLINK,
        }
    }
}

impl TryFrom<u8> for DirentFileType {
    type Error = Error;
    fn try_from(x: u8) -> Result<Self> {
        use DirentFileType::*;
        match x {
            0 => Ok(Unknown),
            1 => Ok(RegularFile),
            2 => Ok(Directory),
            3 => Ok(CharacterDevice),
            4 => Ok(BlockDevice),
            5 => Ok(Fifo),
            6 => Ok(Socket),
            7 => Ok(Symlink),
            _ => Err(Error::InvalidDirentFileType(x)),
        }
    }
}

/// A 12-byte directory entry. Entries form a table at the start of each
/// directory block; the first entry's `name_off` doubles as the table size.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Default, BinRead)]
#[br(little)]
pub struct Dirent {
    pub nid: u64,
    pub name_off: u16,
    pub file_type: u8,
    pub reserved: u8,
}

impl Dirent {
    pub const SIZE: usize = 12;
}

/// Header of the inline xattr body following an inode.
///
/// The inline body spans `12 + (xattr_count - 1) * 4` bytes: this header,
/// `shared_count` u32 shared-attribute indices, then packed entries.
#[repr(C)]
#[derive(Debug, Clone, Copy, BinRead)]
#[br(little)]
pub struct XattrHeader {
    pub name_filter: u32,
    pub shared_count: u8,
    pub reserved: [u8; 7],
}

impl XattrHeader {
    pub const SIZE: usize = 12;
}

/// Fixed prefix of a single xattr entry; name and value bytes follow,
/// padded to 4-byte alignment.
#[repr(C)]
#[derive(Debug, Clone, Copy, BinRead)]
#[br(little)]
pub struct XattrEntry {
    pub name_len: u8,
    pub name_index: u8,
    pub value_len: u16,
}

impl XattrEntry {
    pub const SIZE: usize = 4;
}
