use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::CoreError;

/// A single entry in a [`FileList`]: either a leaf path or a nested list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileListItem {
    Path(PathBuf),
    List(FileList),
}

impl From<PathBuf> for FileListItem {
    fn from(p: PathBuf) -> Self {
        FileListItem::Path(p)
    }
}

impl From<&Path> for FileListItem {
    fn from(p: &Path) -> Self {
        FileListItem::Path(p.to_path_buf())
    }
}

impl From<&str> for FileListItem {
    fn from(s: &str) -> Self {
        FileListItem::Path(PathBuf::from(s))
    }
}

impl From<String> for FileListItem {
    fn from(s: String) -> Self {
        FileListItem::Path(PathBuf::from(s))
    }
}

impl From<FileList> for FileListItem {
    fn from(f: FileList) -> Self {
        FileListItem::List(f)
    }
}

/// Immutable, possibly-named, possibly-nested container of file paths.
///
/// Positional items occupy indices `0..positional_count`; named items are
/// looked up by key. Once built, a `FileList` is never mutated again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileList {
    positional: Vec<FileListItem>,
    named: Vec<(String, FileListItem)>,
    index: HashMap<String, usize>,
}

impl Default for FileList {
    fn default() -> Self {
        FileList::new()
    }
}

impl FileList {
    pub fn new() -> Self {
        FileList {
            positional: Vec::new(),
            named: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn from_positional<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<FileListItem>,
    {
        FileListBuilder::new().items(items).build()
    }

    pub fn single(item: impl Into<FileListItem>) -> Self {
        FileListBuilder::new().item(item).build()
    }

    pub fn builder() -> FileListBuilder {
        FileListBuilder::new()
    }

    pub fn positional_count(&self) -> usize {
        self.positional.len()
    }

    pub fn get(&self, i: usize) -> Result<&FileListItem, CoreError> {
        self.positional.get(i).ok_or(CoreError::IndexOutOfRange(i))
    }

    pub fn get_named(&self, name: &str) -> Result<&FileListItem, CoreError> {
        self.index
            .get(name)
            .map(|&i| &self.named[i].1)
            .ok_or_else(|| CoreError::UnknownKey(name.to_string()))
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.iter().any(|p| p == path)
    }

    /// Number of leaf paths reachable by flattened iteration.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Yields every leaf path, recursively flattening nested lists.
    pub fn iter(&self) -> FileListIter<'_> {
        FileListIter {
            stack: self
                .positional
                .iter()
                .chain(self.named.iter().map(|(_, item)| item))
                .rev()
                .collect(),
        }
    }

    fn push_item(&mut self, item: FileListItem) {
        self.positional.push(item);
    }

    fn push_named(&mut self, name: String, item: FileListItem) {
        let pos = self.named.len();
        self.named.push((name.clone(), item));
        self.index.insert(name, pos);
    }
}

pub struct FileListIter<'a> {
    stack: Vec<&'a FileListItem>,
}

impl<'a> Iterator for FileListIter<'a> {
    type Item = &'a Path;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let item = self.stack.pop()?;
            match item {
                FileListItem::Path(p) => return Some(p.as_path()),
                FileListItem::List(nested) => {
                    self.stack.extend(
                        nested
                            .positional
                            .iter()
                            .chain(nested.named.iter().map(|(_, item)| item))
                            .rev(),
                    );
                }
            }
        }
    }
}

pub struct FileListBuilder {
    list: FileList,
}

impl FileListBuilder {
    pub fn new() -> Self {
        FileListBuilder { list: FileList::new() }
    }

    pub fn item(mut self, item: impl Into<FileListItem>) -> Self {
        self.list.push_item(item.into());
        self
    }

    pub fn items<I, T>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<FileListItem>,
    {
        for item in items {
            self.list.push_item(item.into());
        }
        self
    }

    pub fn named(mut self, name: impl Into<String>, item: impl Into<FileListItem>) -> Self {
        self.list.push_named(name.into(), item.into());
        self
    }

    pub fn build(self) -> FileList {
        self.list
    }
}

impl Default for FileListBuilder {
    fn default() -> Self {
        FileListBuilder::new()
    }
}

/// Rust-idiomatic substitute for the source's runtime `from_any` conversion:
/// a trait implemented for every shape a `FileList` can be built from, so
/// call sites accept `impl IntoFileList` instead of a duck-typed union.
pub trait IntoFileList {
    fn into_file_list(self) -> FileList;
}

impl IntoFileList for FileList {
    fn into_file_list(self) -> FileList {
        self
    }
}

impl IntoFileList for PathBuf {
    fn into_file_list(self) -> FileList {
        FileList::single(self)
    }
}

impl IntoFileList for &Path {
    fn into_file_list(self) -> FileList {
        FileList::single(self)
    }
}

impl IntoFileList for &str {
    fn into_file_list(self) -> FileList {
        FileList::single(self)
    }
}

impl IntoFileList for String {
    fn into_file_list(self) -> FileList {
        FileList::single(self)
    }
}

impl<T: Into<FileListItem>> IntoFileList for Vec<T> {
    fn into_file_list(self) -> FileList {
        FileList::from_positional(self)
    }
}

impl<T: Into<FileListItem> + Clone> IntoFileList for &[T] {
    fn into_file_list(self) -> FileList {
        FileList::from_positional(self.to_vec())
    }
}

impl<T: Into<FileListItem>> IntoFileList for HashMap<String, T> {
    fn into_file_list(self) -> FileList {
        let mut builder = FileListBuilder::new();
        for (k, v) in self {
            builder = builder.named(k, v);
        }
        builder.build()
    }
}
