//! File-operation extraction from agent output.
//!
//! Turns the free text of a response into typed [`FileOperation`]s. The
//! pipeline is a fixed, ordered rule list and does no I/O:
//!
//! 1. **Segment** the text into fenced code blocks; when there are none, fall
//!    back to indentation-delimited blocks.
//! 2. **Name** each block from the text preceding it (ordered path patterns,
//!    last match wins), then from a class signature in the code, then from the
//!    language extension plus keyword guesses, then `code_N`.
//! 3. **Classify** the operation from keyword families in the preceding text.
//!
//! ## Example
//!
//! ```
//! use quorum::extract::{extract_operations, FileOperationKind};
//!
//! let ops = extract_operations("File: foo.py\n```python\ndef f(): pass\n```");
//! assert_eq!(ops.len(), 1);
//! assert_eq!(ops[0].kind, FileOperationKind::Create);
//! assert_eq!(ops[0].path, "foo.py");
//! assert_eq!(ops[0].language.as_deref(), Some("python"));
//! assert_eq!(ops[0].content.as_deref(), Some("def f(): pass"));
//! ```

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Fenced block with an optional language tag on the opening fence.
static FENCED_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(\w*)\n(.*?)```").expect("valid fenced block regex"));

/// Path-recognizing patterns, tried in order. The first pattern with any match
/// decides, and within it the last match wins.
static PATH_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // "File: x.py", "📄 x.py", "→ x.py", optionally quoted
        r#"(?im)(?:File:|📄|→)\s*[`"']?([^\s:`"']+\.[a-z]+)"#,
        // "create file `x.py`", "update x.py"
        r#"(?im)(?:create|modify|delete|update)\s+(?:file\s+)?[`"']?([^\s`"']+\.[a-z]+)[`"']?"#,
        // Windows paths, starting a token so URL schemes don't match
        r#"(?im)(?:^|[\s(`"'])([a-z]:[/\\][^\s`"')]+\.[a-z]+)"#,
        // Unix absolute or home-relative paths, starting a token
        r#"(?im)(?:^|[\s(`"'])([~/][^\s`"')]+\.[a-z]+)"#,
        // Relative paths with at least one directory
        r"(?im)([\w.-]+(?:/[\w.-]+)+\.[a-z]+)",
        // Bare filenames at the start of a line, optionally after a comment marker
        r"(?im)^\s*#?\s*([a-z_][a-z0-9_]*\.[a-z]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid path pattern"))
    .collect()
});

static PYTHON_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^class\s+(\w+)").expect("valid python class regex"));

static JS_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"class\s+(\w+)").expect("valid js class regex"));

static JAVA_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"public\s+class\s+(\w+)").expect("valid java class regex"));

/// Explicit create phrasing. Checked first.
const CREATE_KEYWORDS: &[&str] = &["create", "new file", "add file", "write to"];
const MODIFY_KEYWORDS: &[&str] = &["modify", "update", "change", "edit", "refactor"];
const DELETE_KEYWORDS: &[&str] = &["delete", "remove"];

const LANGUAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("python", "py"),
    ("javascript", "js"),
    ("typescript", "ts"),
    ("java", "java"),
    ("go", "go"),
    ("rust", "rs"),
    ("c", "c"),
    ("cpp", "cpp"),
    ("html", "html"),
    ("css", "css"),
    ("json", "json"),
    ("yaml", "yaml"),
    ("yml", "yml"),
];

/// Tag given to blocks that carry no language.
const PLAIN_TEXT: &str = "text";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileOperationKind {
    Create,
    Modify,
    Delete,
    Unknown,
}

impl FileOperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileOperationKind::Create => "create",
            FileOperationKind::Modify => "modify",
            FileOperationKind::Delete => "delete",
            FileOperationKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileOperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOperation {
    pub kind: FileOperationKind,
    pub path: String,
    pub content: Option<String>,
    pub language: Option<String>,
}

/// A segment of code found in the text, before naming and classification.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CodeBlock {
    language: String,
    code: String,
}

/// Extract every file operation from a response, in discovery order.
pub fn extract_operations(text: &str) -> Vec<FileOperation> {
    code_blocks(text)
        .into_iter()
        .enumerate()
        .map(|(idx, block)| operation_for_block(text, block, idx))
        .collect()
}

fn code_blocks(text: &str) -> Vec<CodeBlock> {
    let fenced: Vec<CodeBlock> = FENCED_BLOCK_RE
        .captures_iter(text)
        .map(|caps| {
            let tag = caps.get(1).map_or("", |m| m.as_str());
            CodeBlock {
                language: if tag.is_empty() { PLAIN_TEXT } else { tag }.to_string(),
                code: caps.get(2).map_or("", |m| m.as_str()).trim().to_string(),
            }
        })
        .collect();

    if fenced.is_empty() {
        indented_blocks(text)
    } else {
        fenced
    }
}

/// A block opens on a line indented by four spaces or a tab and runs until
/// the next blank line. Lines inside keep their indentation.
fn indented_blocks(text: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        if line.starts_with("    ") || line.starts_with('\t') {
            current.push(line);
        } else if !current.is_empty() {
            if line.trim().is_empty() {
                blocks.push(text_block(&current));
                current.clear();
            } else {
                current.push(line);
            }
        }
    }
    if !current.is_empty() {
        blocks.push(text_block(&current));
    }
    blocks
}

fn text_block(lines: &[&str]) -> CodeBlock {
    CodeBlock {
        language: PLAIN_TEXT.to_string(),
        code: lines.join("\n"),
    }
}

fn operation_for_block(text: &str, block: CodeBlock, idx: usize) -> FileOperation {
    // Only the text before the block's first occurrence is considered.
    let before = text.find(&block.code).map_or("", |pos| &text[..pos]);

    let path = path_from_text(before)
        .or_else(|| path_from_code(&block.code, &block.language))
        .unwrap_or_else(|| default_filename(&block.code, &block.language, idx));

    FileOperation {
        kind: classify(before),
        path,
        language: (block.language != PLAIN_TEXT).then(|| block.language.clone()),
        content: Some(block.code),
    }
}

fn path_from_text(before: &str) -> Option<String> {
    PATH_PATTERNS.iter().find_map(|re| {
        re.captures_iter(before)
            .filter_map(|caps| caps.get(1))
            .last()
            .map(|m| m.as_str().trim().to_string())
    })
}

fn path_from_code(code: &str, language: &str) -> Option<String> {
    let capture = |re: &Regex| {
        re.captures(code)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    };

    match language {
        "python" => capture(&PYTHON_CLASS_RE).map(|name| format!("{}.py", name.to_lowercase())),
        "javascript" | "typescript" => capture(&JS_CLASS_RE)
            .map(|name| format!("{}.{}", name.to_lowercase(), extension_for(language))),
        // Java requires the file to match the public class name exactly.
        "java" => capture(&JAVA_CLASS_RE).map(|name| format!("{}.java", name)),
        _ => None,
    }
}

fn extension_for(language: &str) -> &'static str {
    LANGUAGE_EXTENSIONS
        .iter()
        .find(|(lang, _)| *lang == language)
        .map_or("txt", |(_, ext)| *ext)
}

fn default_filename(code: &str, language: &str, idx: usize) -> String {
    let ext = extension_for(language);
    let lower = code.to_lowercase();

    let stem = if lower.contains("binary_search") || lower.contains("binary search") {
        "binary_search".to_string()
    } else if lower.contains("main") {
        "main".to_string()
    } else if lower.contains("utils") {
        "utils".to_string()
    } else if lower.contains("test") {
        "test".to_string()
    } else {
        format!("code_{}", idx + 1)
    };
    format!("{}.{}", stem, ext)
}

/// Best-effort operation kind from the text before a block.
fn classify(before: &str) -> FileOperationKind {
    let lower = before.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if mentions(CREATE_KEYWORDS) {
        FileOperationKind::Create
    } else if mentions(MODIFY_KEYWORDS) {
        FileOperationKind::Modify
    } else if mentions(DELETE_KEYWORDS) {
        FileOperationKind::Delete
    } else {
        // "implement", "add", "write" or no hint at all.
        FileOperationKind::Create
    }
}
