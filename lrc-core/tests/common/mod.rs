//! In-memory tree set standing in for git in coverage and attestation tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::RangeInclusive;

use lrc_core::identity::ContentIdentity;
use lrc_core::types::{FileEntry, HunkRange};
use lrc_core::{Error, Result};
use similar::{DiffTag, TextDiff};

type Tree = BTreeMap<String, String>;

#[derive(Default)]
pub struct MemoryTrees {
    trees: RefCell<HashMap<String, Tree>>,
    current: RefCell<String>,
    branch: RefCell<String>,
    failing: RefCell<BTreeSet<String>>,
    /// Paths passed to `diff_tree_file_hunks`, in call order.
    pub hunk_requests: RefCell<Vec<String>>,
}

impl MemoryTrees {
    pub fn new(branch: &str) -> Self {
        let trees = Self::default();
        trees.set_branch(branch);
        trees
    }

    pub fn add_tree(&self, hash: &str, files: &[(&str, String)]) {
        let tree = files
            .iter()
            .map(|(path, content)| (path.to_string(), content.clone()))
            .collect();
        self.trees.borrow_mut().insert(hash.to_owned(), tree);
    }

    pub fn set_current(&self, hash: &str) {
        *self.current.borrow_mut() = hash.to_owned();
    }

    pub fn set_branch(&self, branch: &str) {
        *self.branch.borrow_mut() = branch.to_owned();
    }

    /// Makes every diff whose old side is `hash` fail.
    pub fn fail_diffs_from(&self, hash: &str) {
        self.failing.borrow_mut().insert(hash.to_owned());
    }

    fn tree(&self, hash: &str) -> Result<Tree> {
        if self.failing.borrow().contains(hash) {
            return Err(Error::UnknownTree(hash.to_owned()));
        }
        self.trees
            .borrow()
            .get(hash)
            .cloned()
            .ok_or_else(|| Error::UnknownTree(hash.to_owned()))
    }
}

impl ContentIdentity for MemoryTrees {
    fn current_tree_hash(&self) -> Result<String> {
        Ok(self.current.borrow().clone())
    }

    fn diff_tree_files(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let (old, new) = (self.tree(from)?, self.tree(to)?);
        let paths: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
        Ok(paths
            .into_iter()
            .filter(|path| old.get(*path) != new.get(*path))
            .cloned()
            .collect())
    }

    fn diff_tree_file_hunks(&self, from: &str, to: &str, path: &str) -> Result<Vec<HunkRange>> {
        self.hunk_requests.borrow_mut().push(path.to_owned());
        let (old, new) = (self.tree(from)?, self.tree(to)?);
        let empty = String::new();
        let old_text = old.get(path).unwrap_or(&empty);
        let new_text = new.get(path).unwrap_or(&empty);
        Ok(line_hunks(old_text, new_text))
    }

    fn current_branch(&self) -> String {
        self.branch.borrow().clone()
    }
}

/// Zero-context line hunks between two texts, 1-based like a diff header.
pub fn line_hunks(old: &str, new: &str) -> Vec<HunkRange> {
    let diff = TextDiff::from_lines(old, new);
    diff.grouped_ops(0)
        .iter()
        .filter_map(|group| {
            let changes: Vec<_> = group.iter().filter(|op| op.tag() != DiffTag::Equal).collect();
            let (first, last) = (changes.first()?, changes.last()?);
            let (old_start, old_end) = (first.old_range().start, last.old_range().end);
            let (new_start, new_end) = (first.new_range().start, last.new_range().end);
            Some(HunkRange::new(
                old_start as u32 + 1,
                (old_end - old_start) as u32,
                new_start as u32 + 1,
                (new_end - new_start) as u32,
            ))
        })
        .collect()
}

/// File text with one line per number: `"{prefix} {n}\n"`.
pub fn lines(prefix: &str, numbers: RangeInclusive<u32>) -> String {
    numbers.map(|n| format!("{prefix} {n}\n")).collect()
}

/// A diff entry for a brand new file of `count` lines (`@@ -0,0 +1,count @@`).
pub fn new_file(path: &str, count: u32) -> FileEntry {
    FileEntry::new(path, vec![HunkRange::new(0, 0, 1, count)])
}
