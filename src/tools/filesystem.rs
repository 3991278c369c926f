//! Filesystem tools for Omni Agent
//!
//! `load_file` reads a document and `search_files` finds files. Both operate
//! only beneath the home directory carried by the [`ToolContext`]; relative
//! paths are resolved against it and anything resolving outside it is
//! rejected.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde_json::{json, Value};

use crate::error::{OmniError, Result};
use crate::session::ToolArgs;
use crate::utils::string::clip_chars;

use super::{Tool, ToolContext};

/// Files larger than this are refused by `load_file`.
const MAX_FILE_BYTES: u64 = 25 * 1024 * 1024;
/// Default cap on extracted characters for `load_file`.
const DEFAULT_MAX_CHARS: usize = 100_000;
/// Default cap on `search_files` results.
const DEFAULT_MAX_RESULTS: usize = 50;
/// Bytes read per file when matching `contains`.
const CONTAINS_SCAN_BYTES: u64 = 200_000;
/// Extensions `contains` is allowed to scan.
const SCANNABLE_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "json", "csv", "py", "rs", "html", "htm", "log",
];

static SCRIPT_STYLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)\s*>")
        .expect("static regex")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));
static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static regex"));
static BLANK_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("static regex"));

/// Resolve `path` against the home directory and make sure the target stays
/// beneath it. The target must exist.
fn resolve_in_home(path: &str, ctx: &ToolContext) -> Result<PathBuf> {
    let home = ctx.home_dir().ok_or_else(|| {
        OmniError::SecurityViolation(
            "home directory not set; use /home-dir to set it".to_string(),
        )
    })?;
    let home = home
        .canonicalize()
        .map_err(|_| OmniError::NotFound(format!("home directory {}", home.display())))?;

    let requested = Path::new(path);
    let joined = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        home.join(requested)
    };
    let resolved = joined
        .canonicalize()
        .map_err(|_| OmniError::NotFound(format!("file not found: {}", joined.display())))?;

    if !resolved.starts_with(&home) {
        return Err(OmniError::SecurityViolation(format!(
            "path outside of home directory: {}",
            path
        )));
    }
    Ok(resolved)
}

fn file_meta(path: &Path, metadata: &std::fs::Metadata) -> Value {
    json!({
        "path": path.display().to_string(),
        "size_bytes": metadata.len(),
        "modified": metadata.modified().ok().map(format_time),
    })
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time).to_rfc3339()
}

fn tidy_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n");
    let trimmed: Vec<&str> = unified.lines().map(str::trim_end).collect();
    BLANK_RUN_RE
        .replace_all(&trimmed.join("\n"), "\n\n")
        .trim()
        .to_string()
}

fn html_to_text(html: &str) -> String {
    let without_scripts = SCRIPT_STYLE_RE.replace_all(html, "");
    let text = TAG_RE.replace_all(&without_scripts, "\n");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    lines.join("\n")
}

fn usize_arg(args: &ToolArgs, key: &str, default: usize) -> usize {
    args.get(key)
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(default)
}

fn bool_arg(args: &ToolArgs, key: &str) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn str_arg<'a>(args: &'a ToolArgs, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

// ============================================================================
// load_file
// ============================================================================

/// Tool for loading a local document as text.
///
/// HTML is reduced to its visible text; everything else is decoded as UTF-8
/// (lossy).
///
/// # Parameters
/// - `path`: file path, relative to the home directory or absolute within it (required)
/// - `max_chars`: cap on returned content characters (default 100000)
#[derive(Debug, Default)]
pub struct LoadFileTool;

impl LoadFileTool {
    /// Create the tool.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for LoadFileTool {
    fn name(&self) -> &str {
        "load_file"
    }

    fn description(&self) -> &str {
        "Load a local file (.txt/.md/.html/...) from the home directory and return its text and metadata."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file, relative to the home directory."
                },
                "max_chars": {
                    "type": "integer",
                    "description": "Cap on extracted content characters (default 100000)."
                }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: ToolArgs, ctx: &ToolContext) -> Result<Value> {
        let path = str_arg(&args, "path")
            .ok_or_else(|| OmniError::Tool("path must be a non-empty string".into()))?;
        let max_chars = usize_arg(&args, "max_chars", DEFAULT_MAX_CHARS);

        let resolved = resolve_in_home(path, ctx)?;
        let metadata = tokio::fs::metadata(&resolved).await?;
        if !metadata.is_file() {
            return Err(OmniError::NotFound(format!(
                "not a file: {}",
                resolved.display()
            )));
        }
        if metadata.len() > MAX_FILE_BYTES {
            return Err(OmniError::Tool(format!(
                "file too large: {} bytes (limit 25MB)",
                metadata.len()
            )));
        }

        let bytes = tokio::fs::read(&resolved).await?;
        let raw = String::from_utf8_lossy(&bytes);
        let file_name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let ext = resolved
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let (kind, title, text) = match ext.as_str() {
            "html" | "htm" | "xhtml" => {
                let title = TITLE_RE
                    .captures(&raw)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| file_name.clone());
                ("html", title, html_to_text(&raw))
            }
            _ => ("text", file_name.clone(), raw.to_string()),
        };

        let content = tidy_text(&text);
        Ok(json!({
            "status": "ok",
            "kind": kind,
            "title": title,
            "content": clip_chars(&content, max_chars),
            "meta": file_meta(&resolved, &metadata),
        }))
    }
}

// ============================================================================
// search_files
// ============================================================================

/// Filters for one `search_files` call.
struct SearchFilter {
    name: Option<Regex>,
    ext: Option<String>,
    contains: Option<String>,
    case_sensitive: bool,
    max_results: usize,
}

impl SearchFilter {
    fn from_args(args: &ToolArgs) -> Result<Self> {
        let case_sensitive = bool_arg(args, "case_sensitive");
        let name = match str_arg(args, "name") {
            Some(pattern) => {
                let source = if bool_arg(args, "regex") {
                    pattern.to_string()
                } else {
                    regex::escape(pattern)
                };
                let re = RegexBuilder::new(&source)
                    .case_insensitive(!case_sensitive)
                    .build()
                    .map_err(|e| OmniError::Tool(format!("invalid name pattern: {}", e)))?;
                Some(re)
            }
            None => None,
        };
        let ext = str_arg(args, "ext").map(|e| e.trim_start_matches('.').to_lowercase());
        let contains = str_arg(args, "contains").map(|c| {
            if case_sensitive {
                c.to_string()
            } else {
                c.to_lowercase()
            }
        });

        Ok(Self {
            name,
            ext,
            contains,
            case_sensitive,
            max_results: usize_arg(args, "max_results", DEFAULT_MAX_RESULTS),
        })
    }

    fn matches(&self, path: &Path) -> bool {
        let base = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if let Some(re) = &self.name {
            if !re.is_match(&base) {
                return false;
            }
        }
        if let Some(wanted) = &self.ext {
            if &ext != wanted {
                return false;
            }
        }
        if let Some(needle) = &self.contains {
            if !SCANNABLE_EXTENSIONS.contains(&ext.as_str()) {
                return false;
            }
            return self.file_contains(path, needle);
        }
        true
    }

    fn file_contains(&self, path: &Path, needle: &str) -> bool {
        let Ok(file) = std::fs::File::open(path) else {
            return false;
        };
        let mut buf = Vec::new();
        if file.take(CONTAINS_SCAN_BYTES).read_to_end(&mut buf).is_err() {
            return false;
        }
        let text = String::from_utf8_lossy(&buf);
        if self.case_sensitive {
            text.contains(needle)
        } else {
            text.to_lowercase().contains(needle)
        }
    }
}

fn walk_home(home: &Path, filter: &SearchFilter) -> Result<Vec<Value>> {
    let pattern = format!(
        "{}/**/*",
        glob::Pattern::escape(&home.to_string_lossy())
    );
    let entries =
        glob::glob(&pattern).map_err(|e| OmniError::Tool(format!("bad search root: {}", e)))?;

    let mut results = Vec::new();
    for path in entries.flatten() {
        if results.len() >= filter.max_results {
            break;
        }
        let Ok(metadata) = std::fs::metadata(&path) else {
            continue;
        };
        if !metadata.is_file() || !filter.matches(&path) {
            continue;
        }
        results.push(file_meta(&path, &metadata));
    }
    Ok(results)
}

/// Tool for finding files under the home directory.
///
/// # Parameters
/// - `name`: substring (or regex with `regex: true`) matched against the file name
/// - `ext`: extension such as `md` or `.md`
/// - `contains`: text to look for inside text-like files
/// - `case_sensitive`: default false
/// - `max_results`: default 50
#[derive(Debug, Default)]
pub struct SearchFilesTool;

impl SearchFilesTool {
    /// Create the tool.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Search files under the home directory by name, extension or contained text."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Substring or regex matched against the file name."},
                "ext": {"type": "string", "description": "File extension, e.g. 'md'."},
                "contains": {"type": "string", "description": "Text to search for inside text files."},
                "case_sensitive": {"type": "boolean", "description": "Match case (default false)."},
                "regex": {"type": "boolean", "description": "Treat 'name' as a regular expression."},
                "max_results": {"type": "integer", "description": "Maximum results (default 50)."}
            },
            "required": [],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: ToolArgs, ctx: &ToolContext) -> Result<Value> {
        let home = resolve_in_home(".", ctx)?;
        let filter = SearchFilter::from_args(&args)?;

        let results = tokio::task::spawn_blocking(move || walk_home(&home, &filter))
            .await
            .map_err(|e| OmniError::Tool(format!("search aborted: {}", e)))??;

        Ok(json!({
            "status": "ok",
            "count": results.len(),
            "results": results,
        }))
    }
}
