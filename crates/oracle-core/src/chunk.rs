//! Language-aware recursive text splitter.
//!
//! Files are classified by extension into [`ContentType::Code`] (with a
//! language tag) or [`ContentType::Text`]; anything else is rejected. Both
//! kinds are cut into windows of at most `chunk_size` characters that
//! overlap by up to `chunk_overlap` characters. The only difference between
//! them is the separator ladder used to find cut points: code prefers
//! top-level declarations (`\nclass `, `\nfn `, …) before falling back to
//! blank lines, lines, words and finally single characters.
//!
//! # Algorithm
//!
//! 1. Pick the first separator in the ladder that occurs in the text.
//! 2. Split on it, keeping each separator attached to the piece after it.
//! 3. Greedily merge consecutive pieces into windows up to `chunk_size`;
//!    when a window is emitted, drop pieces from its front until at most
//!    `chunk_overlap` characters remain, and continue from there.
//! 4. Pieces that alone reach `chunk_size` are split recursively with the
//!    rest of the ladder.
//! 5. Each emitted window is located in the original text to record its
//!    `start_index`.
//!
//! # Example
//!
//! ```rust
//! use oracle_core::chunk::ChunkingPolicy;
//!
//! let policy = ChunkingPolicy::default();
//! let chunks = policy
//!     .chunk("notes/readme.md", "Hello world.", "h1", "2025-01-01T00:00:00Z")
//!     .unwrap();
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].metadata.language, "text");
//! ```

use std::collections::VecDeque;
use std::path::Path;

use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{ChunkMetadata, ChunkRecord, ContentType};

pub const DEFAULT_CHUNK_SIZE: usize = 1500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

const CODE_LANGUAGES: &[(&str, &str)] = &[
    ("py", "python"),
    ("js", "js"),
    ("jsx", "js"),
    ("ts", "ts"),
    ("tsx", "ts"),
    ("java", "java"),
    ("c", "c"),
    ("cpp", "cpp"),
    ("cc", "cpp"),
    ("cxx", "cpp"),
    ("h", "cpp"),
    ("hpp", "cpp"),
    ("cs", "csharp"),
    ("go", "go"),
    ("rs", "rust"),
    ("rb", "ruby"),
    ("php", "php"),
    ("swift", "swift"),
    ("kt", "kotlin"),
    ("scala", "scala"),
    ("lua", "lua"),
    ("pl", "perl"),
    ("sol", "sol"),
    ("proto", "proto"),
    ("ex", "elixir"),
    ("exs", "elixir"),
    ("cob", "cobol"),
];

const TEXT_EXTENSIONS: &[&str] = &["md", "markdown", "txt", "rst", "tex", "html", "htm"];

/// Result of classifying a file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileKind {
    pub content_type: ContentType,
    pub language: &'static str,
}

/// Classify a path by extension.
///
/// Returns [`CoreError::UnsupportedFile`] for extensions that are neither
/// a known code language nor a text format.
pub fn classify(path: &Path) -> Result<FileKind, CoreError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if let Some((_, lang)) = CODE_LANGUAGES.iter().find(|(e, _)| *e == ext) {
        return Ok(FileKind {
            content_type: ContentType::Code,
            language: lang,
        });
    }
    if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        return Ok(FileKind {
            content_type: ContentType::Text,
            language: "text",
        });
    }

    let shown = if ext.is_empty() {
        path.display().to_string()
    } else {
        format!(".{}", ext)
    };
    Err(CoreError::UnsupportedFile(shown))
}

/// Whether `path` would be accepted by [`classify`].
pub fn is_supported(path: &Path) -> bool {
    classify(path).is_ok()
}

fn separators_for(language: &str) -> &'static [&'static str] {
    match language {
        "python" => &["\nclass ", "\ndef ", "\n\tdef ", "\n\n", "\n", " ", ""],
        "js" => &[
            "\nfunction ", "\nconst ", "\nlet ", "\nvar ", "\nclass ", "\nif ", "\nfor ",
            "\nwhile ", "\nswitch ", "\ncase ", "\ndefault ", "\n\n", "\n", " ", "",
        ],
        "ts" => &[
            "\nenum ", "\ninterface ", "\nnamespace ", "\ntype ", "\nclass ", "\nfunction ",
            "\nconst ", "\nlet ", "\nvar ", "\nif ", "\nfor ", "\nwhile ", "\nswitch ",
            "\ncase ", "\ndefault ", "\n\n", "\n", " ", "",
        ],
        "java" | "csharp" | "kotlin" | "scala" => &[
            "\nclass ", "\npublic ", "\nprotected ", "\nprivate ", "\nstatic ", "\nif ",
            "\nfor ", "\nwhile ", "\nswitch ", "\ncase ", "\n\n", "\n", " ", "",
        ],
        "c" | "cpp" => &[
            "\nclass ", "\nvoid ", "\nint ", "\nfloat ", "\ndouble ", "\nif ", "\nfor ",
            "\nwhile ", "\nswitch ", "\ncase ", "\n\n", "\n", " ", "",
        ],
        "go" => &[
            "\nfunc ", "\nvar ", "\nconst ", "\ntype ", "\nif ", "\nfor ", "\nswitch ",
            "\ncase ", "\n\n", "\n", " ", "",
        ],
        "rust" => &[
            "\nfn ", "\nconst ", "\nlet ", "\nif ", "\nwhile ", "\nfor ", "\nloop ",
            "\nmatch ", "\n\n", "\n", " ", "",
        ],
        "ruby" => &[
            "\ndef ", "\nclass ", "\nif ", "\nunless ", "\nwhile ", "\nfor ", "\ndo ",
            "\nbegin ", "\nrescue ", "\n\n", "\n", " ", "",
        ],
        "php" => &[
            "\nfunction ", "\nclass ", "\nif ", "\nforeach ", "\nwhile ", "\ndo ",
            "\nswitch ", "\ncase ", "\n\n", "\n", " ", "",
        ],
        "lua" => &[
            "\nlocal ", "\nfunction ", "\nif ", "\nfor ", "\nwhile ", "\nrepeat ", "\n\n",
            "\n", " ", "",
        ],
        "elixir" => &[
            "\ndefmodule ", "\ndef ", "\ndefp ", "\nif ", "\ncase ", "\n\n", "\n", " ", "",
        ],
        _ => &["\n\n", "\n", " ", ""],
    }
}

/// One window produced by [`TextSplitter::split`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub text: String,
    /// Character offset in the source text.
    pub start_index: usize,
}

/// Fixed-size, overlapping window splitter driven by a separator ladder.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &'static [&'static str],
}

impl TextSplitter {
    pub fn for_language(language: &str, chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators: separators_for(language),
        }
    }

    /// Split `text` into windows, recording where each one starts.
    pub fn split(&self, text: &str) -> Vec<Split> {
        let pieces = self.split_recursive(text, self.separators);

        let mut splits = Vec::with_capacity(pieces.len());
        let mut index_byte = 0usize;
        let mut previous_len = 0usize;
        for piece in pieces {
            let hint = snap_to_char_boundary(
                text,
                (index_byte + previous_len).saturating_sub(self.chunk_overlap),
            );
            let found = text[hint..]
                .find(piece.as_str())
                .map(|pos| hint + pos)
                .or_else(|| text.find(piece.as_str()))
                .unwrap_or(index_byte);
            index_byte = found;
            previous_len = piece.len();
            splits.push(Split {
                start_index: text[..found].chars().count(),
                text: piece,
            });
        }
        splits
    }

    fn split_recursive(&self, text: &str, separators: &[&'static str]) -> Vec<String> {
        let mut separator = separators.last().copied().unwrap_or("");
        let mut remaining: &[&'static str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                break;
            }
            if text.contains(sep) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut good: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                chunks.extend(self.merge_splits(&good));
                good.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }
        if !good.is_empty() {
            chunks.extend(self.merge_splits(&good));
        }
        chunks
    }

    /// Greedy window merge. Separators are already attached to the pieces,
    /// so pieces are concatenated directly.
    fn merge_splits(&self, pieces: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                if let Some(doc) = join_window(&window) {
                    docs.push(doc);
                }
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(first) => total = total.saturating_sub(char_len(first)),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }

        if let Some(doc) = join_window(&window) {
            docs.push(doc);
        }
        docs
    }
}

fn join_window(window: &VecDeque<&str>) -> Option<String> {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Split on `sep`, attaching each separator to the start of the piece that
/// follows it. An empty separator splits into single characters.
fn split_keeping_separator<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    if sep.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut last = 0;
    for (idx, _) in text.match_indices(sep) {
        if idx > last {
            pieces.push(&text[last..idx]);
        }
        last = idx;
    }
    pieces.push(&text[last..]);
    pieces.retain(|p| !p.is_empty());
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Chunking parameters applied to every indexed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingPolicy {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingPolicy {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingPolicy {
    /// Classify `source`, split `text`, and stamp each window with a fresh
    /// id and full provenance metadata.
    pub fn chunk(
        &self,
        source: &str,
        text: &str,
        content_hash: &str,
        indexed_at: &str,
    ) -> Result<Vec<ChunkRecord>, CoreError> {
        let kind = classify(Path::new(source))?;
        let splitter = TextSplitter::for_language(kind.language, self.chunk_size, self.chunk_overlap);

        Ok(splitter
            .split(text)
            .into_iter()
            .map(|split| ChunkRecord {
                id: Uuid::new_v4().to_string(),
                text: split.text,
                metadata: ChunkMetadata {
                    source: source.to_string(),
                    content_hash: content_hash.to_string(),
                    indexed_at: indexed_at.to_string(),
                    content_type: kind.content_type,
                    language: kind.language.to_string(),
                    start_index: split.start_index,
                },
            })
            .collect())
    }
}
