//! Recursive directory traversal.

use crate::dirent::DirEntry;
use crate::error::Result;
use crate::file::{Dir, Node};
use crate::filesystem::Image;
use crate::reader::ReadAt;

/// An iterator walking a directory tree depth-first.
///
/// Created by [`Image::walk_dir`]. Entries of a directory are yielded in
/// on-disk order before descending into child directories.
pub struct WalkDir<R: ReadAt> {
    stack: Vec<(usize, String, Dir<R>)>,
    max_depth: usize,
}

/// A single entry yielded by [`WalkDir`].
pub struct WalkDirEntry<R: ReadAt> {
    /// Depth relative to the starting directory, 1 for immediate children.
    pub depth: usize,
    /// Full path of the entry inside the image.
    pub path: String,
    /// The directory entry itself.
    pub dir_entry: DirEntry<R>,
}

impl<R: ReadAt> WalkDir<R> {
    pub(crate) fn new(image: Image<R>, root: &str) -> Result<Self> {
        let dir = image.open_dir(root)?;
        let root = if root.is_empty() { "/" } else { root };
        Ok(Self {
            stack: vec![(1, root.to_string(), dir)],
            max_depth: 0,
        })
    }

    /// Sets the maximum depth to descend into subdirectories.
    ///
    /// A depth of 1 yields only immediate children; 0, the default, walks
    /// without limit.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    fn next_entry(&mut self) -> Option<Result<WalkDirEntry<R>>> {
        loop {
            let (depth, taken) = {
                let (depth, _, dir) = self.stack.last_mut()?;
                (*depth, dir.read_dir(1))
            };
            let entry = match taken {
                Err(err) => return Some(Err(err)),
                Ok(entries) => match entries.into_iter().next() {
                    Some(entry) => entry,
                    None => {
                        self.stack.pop();
                        continue;
                    }
                },
            };

            let parent = &self.stack.last()?.1;
            let path = if parent.ends_with('/') {
                format!("{parent}{}", entry.file_name())
            } else {
                format!("{parent}/{}", entry.file_name())
            };

            if entry.is_dir() && (self.max_depth == 0 || depth < self.max_depth) {
                if let Node::Dir(child) = entry.open() {
                    self.stack.push((depth + 1, path.clone(), child));
                }
            }

            return Some(Ok(WalkDirEntry {
                depth,
                path,
                dir_entry: entry,
            }));
        }
    }
}

impl<R: ReadAt> Iterator for WalkDir<R> {
    type Item = Result<WalkDirEntry<R>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry()
    }
}
