//! Extended attribute decoding.
//!
//! An inode with `xattr_count > 0` is followed on disk by an inline body of
//! `12 + (xattr_count - 1) * 4` bytes: a header, `shared_count` u32 indices
//! into the image-wide xattr block, then packed entries. Shared indices
//! address 4-byte slots from `xattr_blk_addr << blk_size_bits` and decode
//! with the same entry layout as inline ones.

use std::collections::BTreeMap;

use bytes::Buf;
use tracing::trace;

use crate::error::{Error, Result};
use crate::filesystem::Image;
use crate::reader::ReadAt;
use crate::types::{Inode, XattrEntry, XattrHeader};

const XATTR_ENTRY_ALIGN: usize = 4;

/// `name_index` values with this bit set refer to the image's user-defined
/// long prefix table.
const LONG_PREFIX_BIT: u8 = 0x80;

fn prefix(index: u8) -> Result<&'static str> {
    match index {
        0 => Ok(""),
        1 => Ok("user."),
        2 => Ok("system.posix_acl_access"),
        3 => Ok("system.posix_acl_default"),
        4 => Ok("trusted."),
        5 => Ok("lustre."),
        6 => Ok("security."),
        index => Err(Error::Corrupted(format!(
            "unknown xattr name prefix {index}"
        ))),
    }
}

/// Decodes every extended attribute of `inode` into a name to value map.
pub(crate) fn read_xattrs<R: ReadAt>(
    image: &Image<R>,
    inode: &Inode,
) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut xattrs = BTreeMap::new();
    let inline_size = inode.xattr_size();
    if inline_size == 0 {
        return Ok(xattrs);
    }

    let mut region = vec![0u8; inline_size];
    image.read_exact(
        &mut region,
        image.inode_offset(inode.id()) + inode.size() as u64,
    )?;
    let shared = parse_inline_body(&region, &mut xattrs)?;
    trace!(
        nid = inode.id(),
        inline = xattrs.len(),
        shared = shared.len(),
        "decoded inline xattr body"
    );

    for id in shared {
        read_shared(image, id, &mut xattrs)?;
    }
    Ok(xattrs)
}

/// Parses the inline body into `xattrs` and returns the shared indices.
fn parse_inline_body(region: &[u8], xattrs: &mut BTreeMap<String, Vec<u8>>) -> Result<Vec<u32>> {
    if region.len() < XattrHeader::SIZE {
        return Err(Error::Corrupted("xattr body shorter than header".to_string()));
    }
    let mut body = region;
    let _name_filter = body.get_u32_le();
    let shared_count = body.get_u8() as usize;
    body.advance(7);

    if body.remaining() < shared_count * 4 {
        return Err(Error::Corrupted(
            "xattr shared indices exceed inline body".to_string(),
        ));
    }
    let mut shared = Vec::with_capacity(shared_count);
    for _ in 0..shared_count {
        shared.push(body.get_u32_le());
    }

    let entries = body;
    let mut pos = 0;
    while pos + XattrEntry::SIZE <= entries.len() {
        let mut header = &entries[pos..pos + XattrEntry::SIZE];
        let name_len = header.get_u8() as usize;
        let name_index = header.get_u8();
        let value_len = header.get_u16_le() as usize;
        if name_len == 0 && value_len == 0 {
            break;
        }

        let name_start = pos + XattrEntry::SIZE;
        let end = name_start + name_len + value_len;
        if end > entries.len() {
            return Err(Error::Corrupted(
                "xattr entry exceeds inline body".to_string(),
            ));
        }
        insert_entry(
            xattrs,
            name_index,
            &entries[name_start..name_start + name_len],
            entries[name_start + name_len..end].to_vec(),
        )?;
        pos = end.next_multiple_of(XATTR_ENTRY_ALIGN);
    }
    Ok(shared)
}

fn read_shared<R: ReadAt>(
    image: &Image<R>,
    id: u32,
    xattrs: &mut BTreeMap<String, Vec<u8>>,
) -> Result<()> {
    let base = image.block_offset(image.super_block().xattr_blk_addr);
    let offset = base + id as u64 * XATTR_ENTRY_ALIGN as u64;

    let mut header = [0u8; XattrEntry::SIZE];
    image.read_exact(&mut header, offset)?;
    let mut buf = &header[..];
    let name_len = buf.get_u8() as usize;
    let name_index = buf.get_u8();
    let value_len = buf.get_u16_le() as usize;

    let mut body = vec![0u8; name_len + value_len];
    image.read_exact(&mut body, offset + XattrEntry::SIZE as u64)?;
    trace!(id, name_len, value_len, "decoded shared xattr");
    insert_entry(xattrs, name_index, &body[..name_len], body[name_len..].to_vec())
}

fn insert_entry(
    xattrs: &mut BTreeMap<String, Vec<u8>>,
    name_index: u8,
    name: &[u8],
    value: Vec<u8>,
) -> Result<()> {
    if name_index & LONG_PREFIX_BIT != 0 {
        return Err(Error::NotImplemented(
            "long xattr name prefixes".to_string(),
        ));
    }
    let name = format!("{}{}", prefix(name_index)?, String::from_utf8_lossy(name));
    xattrs.insert(name, value);
    Ok(())
}
