//! A pure Rust library for reading EROFS (Enhanced Read-Only File System) images.
//!
//! EROFS is a read-only filesystem designed for performance and space efficiency,
//! commonly used in Android and other embedded systems. This crate decodes images
//! through any random-access byte source implementing [`ReadAt`]; no memory
//! mapping is performed by the library itself.
//!
//! # Example
//!
//! ```no_run
//! use std::io::Read;
//! use erofs_reader::Image;
//!
//! let file = std::fs::File::open("image.erofs").unwrap();
//! let fs = Image::new(file).unwrap();
//!
//! // Read a file
//! let mut file = fs.open_file("/etc/passwd").unwrap();
//! let mut content = String::new();
//! file.read_to_string(&mut content).unwrap();
//!
//! // List a directory
//! let mut dir = fs.open_dir("/etc").unwrap();
//! for entry in dir.read_dir(-1).unwrap() {
//!     println!("{}", entry.file_name());
//! }
//! ```

mod dirent;
mod error;
pub mod file;
pub mod filesystem;
mod pool;
pub mod reader;
pub mod types;
pub mod walkdir;
mod xattr;

pub use dirent::DirEntry;
pub use error::{Error, Result};
pub use file::{Dir, File, FileInfo, Node, Stat};
pub use filesystem::Image;
pub use reader::ReadAt;
pub use walkdir::{WalkDir, WalkDirEntry};
