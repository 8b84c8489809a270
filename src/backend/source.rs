//! Kernel source loading and entry-point discovery.

use crate::util::{TileSearchError, TileSearchResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Entry point of the Generator Stage kernel.
pub const GENERATOR_ENTRY: &str = "generate_image";

/// Entry point of the Search Stage kernel.
pub const SEARCH_ENTRY: &str = "find_image";

const GENERATOR_FILE: &str = "generate_image.cl";
const SEARCH_FILE: &str = "find_image.cl";

const BUILTIN_GENERATOR: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/kernels/generate_image.cl"));
const BUILTIN_SEARCH: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/kernels/find_image.cl"));

/// Locations of the two kernel programs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelPaths {
    pub generator: PathBuf,
    pub search: PathBuf,
}

impl KernelPaths {
    /// Standard file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            generator: dir.join(GENERATOR_FILE),
            search: dir.join(SEARCH_FILE),
        }
    }

    pub fn load_generator(&self) -> TileSearchResult<KernelSource> {
        KernelSource::load(&self.generator)
    }

    pub fn load_search(&self) -> TileSearchResult<KernelSource> {
        KernelSource::load(&self.search)
    }
}

impl Default for KernelPaths {
    fn default() -> Self {
        Self::in_dir("kernels")
    }
}

/// Where the harness obtains its two kernel programs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KernelSet {
    /// Sources compiled into the crate.
    Builtin,
    /// Sources read from disk at setup.
    Files(KernelPaths),
}

impl KernelSet {
    /// Returns `(generator, search)` sources.
    pub fn load(&self) -> TileSearchResult<(KernelSource, KernelSource)> {
        match self {
            KernelSet::Builtin => Ok((
                KernelSource::builtin_generator(),
                KernelSource::builtin_search(),
            )),
            KernelSet::Files(paths) => Ok((paths.load_generator()?, paths.load_search()?)),
        }
    }
}

impl Default for KernelSet {
    fn default() -> Self {
        KernelSet::Files(KernelPaths::default())
    }
}

/// Device program text plus the name it is reported under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelSource {
    origin: String,
    text: String,
}

/// A `__kernel` function declared in a source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryPoint {
    pub name: String,
    pub params: usize,
}

impl KernelSource {
    /// Wraps source text.
    pub fn new(origin: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            text: text.into(),
        }
    }

    /// Reads a source file.
    pub fn load(path: &Path) -> TileSearchResult<Self> {
        let text = fs::read_to_string(path).map_err(|err| TileSearchError::KernelSourceIo {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        Ok(Self::new(path.display().to_string(), text))
    }

    /// The Generator Stage program shipped with the crate.
    pub fn builtin_generator() -> Self {
        Self::new("builtin:generate_image.cl", BUILTIN_GENERATOR)
    }

    /// The Search Stage program shipped with the crate.
    pub fn builtin_search() -> Self {
        Self::new("builtin:find_image.cl", BUILTIN_SEARCH)
    }

    /// File path or builtin tag the source came from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Lists `__kernel void name(...)` declarations with their parameter count.
    pub fn entry_points(&self) -> Vec<EntryPoint> {
        let code = strip_comments(&self.text);
        let tokens = tokenize(&code);
        let mut out = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            let is_qualifier = tokens[i] == "__kernel" || tokens[i] == "kernel";
            if is_qualifier && tokens.get(i + 1) == Some(&"void") {
                if let (Some(name), Some(&"(")) = (tokens.get(i + 2), tokens.get(i + 3)) {
                    let (params, next) = count_params(&tokens, i + 4);
                    out.push(EntryPoint {
                        name: (*name).to_string(),
                        params,
                    });
                    i = next;
                    continue;
                }
            }
            i += 1;
        }
        out
    }
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        let next = chars.peek().copied();
        match (c, next) {
            ('/', Some('/')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

fn tokenize(code: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (idx, c) in code.char_indices() {
        if c.is_alphanumeric() || c == '_' {
            start.get_or_insert(idx);
            continue;
        }
        if let Some(s) = start.take() {
            tokens.push(&code[s..idx]);
        }
        if !c.is_whitespace() {
            tokens.push(&code[idx..idx + c.len_utf8()]);
        }
    }
    if let Some(s) = start {
        tokens.push(&code[s..]);
    }
    tokens
}

/// Counts top-level parameters starting just after `(`; returns the count and
/// the index following the closing `)`.
fn count_params(tokens: &[&str], mut i: usize) -> (usize, usize) {
    let mut depth = 0usize;
    let mut commas = 0usize;
    let mut saw_token = false;
    let mut only_void = true;
    while i < tokens.len() {
        match tokens[i] {
            "(" => depth += 1,
            ")" if depth == 0 => {
                let params = if !saw_token || only_void { 0 } else { commas + 1 };
                return (params, i + 1);
            }
            ")" => depth -= 1,
            "," if depth == 0 => commas += 1,
            token => {
                saw_token = true;
                if token != "void" {
                    only_void = false;
                }
            }
        }
        i += 1;
    }
    (0, i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_sources_declare_expected_entries() {
        let generator = KernelSource::builtin_generator().entry_points();
        assert_eq!(
            generator,
            vec![EntryPoint {
                name: GENERATOR_ENTRY.into(),
                params: 5,
            }]
        );

        let search = KernelSource::builtin_search().entry_points();
        assert_eq!(
            search,
            vec![EntryPoint {
                name: SEARCH_ENTRY.into(),
                params: 6,
            }]
        );
    }

    #[test]
    fn comments_hide_declarations() {
        let src = KernelSource::new(
            "inline",
            "// __kernel void hidden(int a)\n/* kernel void also_hidden() */\nkernel void shown(void) {}",
        );
        assert_eq!(
            src.entry_points(),
            vec![EntryPoint {
                name: "shown".into(),
                params: 0,
            }]
        );
    }

    #[test]
    fn missing_file_is_environment_error() {
        let err = KernelSource::load(Path::new("does/not/exist.cl")).unwrap_err();
        assert!(matches!(err, TileSearchError::KernelSourceIo { .. }));
    }

    #[test]
    fn builtin_set_loads_both_programs() {
        let (generator, search) = KernelSet::Builtin.load().unwrap();
        assert!(generator.text().contains("generate_image"));
        assert!(search.text().contains("find_image"));
    }

    #[test]
    fn paths_join_standard_names() {
        let paths = KernelPaths::in_dir("/opt/k");
        assert_eq!(paths.generator, PathBuf::from("/opt/k/generate_image.cl"));
        assert_eq!(paths.search, PathBuf::from("/opt/k/find_image.cl"));
    }
}
