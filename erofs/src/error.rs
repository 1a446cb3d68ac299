use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while decoding an EROFS image.
///
/// Callers should branch on the category predicates (`is_invalid`,
/// `is_not_found`, ...) rather than on messages, which are free to change.
#[derive(Debug, Error)]
pub enum Error {
    /// The super block could not be validated. Returned immediately from
    /// [`Image::new`](crate::Image::new); all other corruption surfaces
    /// lazily as operations touch the affected region.
    #[error("invalid super block: {0}")]
    InvalidSuperblock(String),

    /// The inode format word carries a layout tag the format does not define.
    #[error("invalid layout: {0}")]
    InvalidLayout(u8),

    /// A directory entry carries a file type the format does not define.
    #[error("invalid dirent file type: {0}")]
    InvalidDirentFileType(u8),

    /// A structural inconsistency was found while decoding. Whether this is
    /// corruption or deliberately malformed input is up to the caller.
    #[error("corrupted data: {0}")]
    Corrupted(String),

    /// A decode would have read outside the bounds of its input.
    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    /// The image uses a documented feature this library does not handle yet,
    /// such as the chunk-based or compressed data layouts.
    #[error("{0}: not implemented")]
    NotImplemented(String),

    /// A path component did not exist.
    #[error("path not found: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("not a regular file: {0}")]
    NotAFile(String),

    /// A block was requested at or past the end of an inode's data.
    #[error("end of file")]
    Eof,

    /// The underlying reader failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn is_invalid_superblock(&self) -> bool {
        matches!(self, Self::InvalidSuperblock(_))
    }

    /// Structural inconsistency of any kind, excluding the super block.
    pub fn is_invalid(&self) -> bool {
        matches!(
            self,
            Self::InvalidLayout(_)
                | Self::InvalidDirentFileType(_)
                | Self::Corrupted(_)
                | Self::OutOfBounds(_)
        )
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_not_a_directory(&self) -> bool {
        matches!(self, Self::NotADirectory(_))
    }

    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }

    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

impl From<binrw::Error> for Error {
    fn from(err: binrw::Error) -> Self {
        Self::Corrupted(err.to_string())
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(inner) => inner,
            err @ Error::Eof => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            err @ Error::NotFound(_) => io::Error::new(io::ErrorKind::NotFound, err),
            err @ Error::NotADirectory(_) => io::Error::new(io::ErrorKind::NotADirectory, err),
            err => io::Error::other(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_match_their_category() {
        assert!(Error::InvalidSuperblock("x".into()).is_invalid_superblock());
        assert!(!Error::InvalidSuperblock("x".into()).is_invalid());
        assert!(Error::InvalidLayout(7).is_invalid());
        assert!(Error::Corrupted("x".into()).is_invalid());
        assert!(Error::OutOfBounds("x".into()).is_invalid());
        assert!(Error::NotImplemented("x".into()).is_not_implemented());
        assert!(Error::NotFound("x".into()).is_not_found());
        assert!(Error::NotADirectory("x".into()).is_not_a_directory());
        assert!(Error::Eof.is_eof());
        assert!(Error::Io(io::Error::other("x")).is_io());
    }

    #[test]
    fn io_conversion_keeps_the_kind() {
        let err: io::Error = Error::NotFound("/missing".into()).into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        let err: io::Error = Error::Eof.into();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
