// src/ignore.rs

use crate::error::{IgnoreError, Result};
use crate::fs_utils;
use crate::logging::Reporter;
use crate::paths::join_paths;
use crate::report;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub const LOCAL_IGNORE_FILE: &str = ".stow-local-ignore";
pub const GLOBAL_IGNORE_FILE: &str = ".stow-global-ignore";

/// Built-in ignore list, used when neither a package-local nor a global
/// ignore file exists. Same format as an ignore file.
const DEFAULT_IGNORE_LIST: &str = r"
# Comments and blank lines are allowed.

RCS
.+,v

CVS
\.\#.+       # CVS conflict files / emacs lock files
\.cvsignore

\.svn
_darcs
\.hg

\.git
\.gitignore
\.gitmodules

.+~          # emacs backup files
\#.*\#       # emacs autosave files

^/README.*
^/LICENSE.*
^/COPYING
";

/// Compiled form of one ignore list.
///
/// Patterns containing a `/` go into the path matcher, which is searched in
/// `/<target path>` and must line up with segment boundaries. The rest go
/// into the segment matcher, which must match a node's basename entirely.
#[derive(Debug, Clone, Default)]
pub struct IgnorePatterns {
    path: Option<Regex>,
    segment: Option<Regex>,
}

impl IgnorePatterns {
    pub fn compile<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut segment_patterns: Vec<String> = Vec::new();
        let mut path_patterns: Vec<String> = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            if pattern.contains('/') {
                path_patterns.push(pattern.to_string());
            } else {
                segment_patterns.push(pattern.to_string());
            }
        }

        let segment = if segment_patterns.is_empty() {
            None
        } else {
            Some(
                Regex::new(&format!("^({})$", segment_patterns.join("|")))
                    .map_err(IgnoreError::from)?,
            )
        };
        let path = if path_patterns.is_empty() {
            None
        } else {
            Some(
                Regex::new(&format!("(^|/)({})(/|$)", path_patterns.join("|")))
                    .map_err(IgnoreError::from)?,
            )
        };

        Ok(Self { path, segment })
    }

    /// `target_path` is relative to the target root, without a leading `/`.
    pub fn matches_path(&self, target_path: &str) -> bool {
        self.path
            .as_ref()
            .is_some_and(|re| re.is_match(&format!("/{}", target_path)))
    }

    pub fn matches_segment(&self, basename: &str) -> bool {
        self.segment.as_ref().is_some_and(|re| re.is_match(basename))
    }

    pub fn path_regex(&self) -> Option<&str> {
        self.path.as_ref().map(Regex::as_str)
    }

    pub fn segment_regex(&self) -> Option<&str> {
        self.segment.as_ref().map(Regex::as_str)
    }
}

/// Extracts patterns from ignore-file text.
///
/// Full-line `#` comments and blank lines are skipped, trailing
/// whitespace-plus-`#` comments are stripped and `\#` decodes to `#`. The
/// local ignore file itself is always added.
pub fn parse_ignore_list(content: &str) -> BTreeSet<String> {
    let mut patterns: BTreeSet<String> = BTreeSet::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = strip_inline_comment(line);
        patterns.insert(line.replace("\\#", "#"));
    }

    patterns.insert(format!("^/{}$", regex::escape(LOCAL_IGNORE_FILE)));
    patterns
}

/// Removes the first run of whitespace followed by `#` and at least one
/// more character, along with everything after it.
fn strip_inline_comment(line: &str) -> String {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() {
            let mut j = i;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            if j + 1 < bytes.len() && bytes[j] == b'#' {
                return line[..i].to_string();
            }
            i = j;
        } else {
            i += 1;
        }
    }
    line.to_string()
}

/// Read-through cache of compiled ignore lists, keyed by ignore file path.
///
/// Files are parsed at most once per cache lifetime; call
/// [`IgnoreCache::invalidate`] after editing one.
#[derive(Debug, Default)]
pub struct IgnoreCache {
    home_dir: Option<PathBuf>,
    by_file: HashMap<String, Rc<IgnorePatterns>>,
    defaults: Option<Rc<IgnorePatterns>>,
}

impl IgnoreCache {
    /// `home_dir` locates the global ignore file.
    pub fn new(home_dir: Option<PathBuf>) -> Self {
        Self {
            home_dir,
            by_file: HashMap::new(),
            defaults: None,
        }
    }

    /// Ignore list for a package directory, tried in order: the package's
    /// local ignore file, the global ignore file, the built-in list.
    pub fn for_package(&mut self, package_dir: &str, reporter: &Reporter) -> Result<Rc<IgnorePatterns>> {
        let local = join_paths(&[package_dir, LOCAL_IGNORE_FILE]);
        let home = self
            .home_dir
            .as_deref()
            .and_then(Path::to_str)
            .unwrap_or_default()
            .to_string();
        let global = join_paths(&[&home, GLOBAL_IGNORE_FILE]);

        for file in [local, global] {
            if fs_utils::path_exists(&file) {
                report!(reporter, 5, 1, "Using ignore file: {}", file);
                return self.from_file(&file);
            }
            report!(reporter, 5, 1, "{} didn't exist", file);
        }

        report!(reporter, 4, 1, "Using built-in ignore list");
        self.defaults()
    }

    fn from_file(&mut self, file: &str) -> Result<Rc<IgnorePatterns>> {
        if let Some(cached) = self.by_file.get(file) {
            return Ok(Rc::clone(cached));
        }
        // An unreadable file ignores nothing.
        let compiled = match fs::read_to_string(file) {
            Ok(content) => IgnorePatterns::compile(parse_ignore_list(&content))?,
            Err(_) => IgnorePatterns::default(),
        };
        let compiled = Rc::new(compiled);
        self.by_file.insert(file.to_string(), Rc::clone(&compiled));
        Ok(compiled)
    }

    fn defaults(&mut self) -> Result<Rc<IgnorePatterns>> {
        if let Some(defaults) = &self.defaults {
            return Ok(Rc::clone(defaults));
        }
        let compiled = Rc::new(default_ignore_patterns()?);
        self.defaults = Some(Rc::clone(&compiled));
        Ok(compiled)
    }

    pub fn invalidate(&mut self, file: &str) {
        self.by_file.remove(file);
    }

    pub fn clear(&mut self) {
        self.by_file.clear();
        self.defaults = None;
    }

    pub fn cached_files(&self) -> usize {
        self.by_file.len()
    }
}

pub fn default_ignore_patterns() -> Result<IgnorePatterns> {
    IgnorePatterns::compile(parse_ignore_list(DEFAULT_IGNORE_LIST))
}
