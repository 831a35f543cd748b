//! Corefile block scanning and rendering.
//!
//! A Corefile is a sequence of top-level blocks `<keys> { ... }` with nested
//! directive blocks. Zone entries are located by brace depth so that matching
//! always covers a whole server block, never a substring of a neighbour.

use std::ops::Range;
use std::path::Path;

/// Placement of a zone entry inside the Corefile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    /// Snippet imported by every zone block
    pub snippet: String,
    /// Directory holding zone files as seen by the nameserver
    pub zone_dir: String,
    /// Poll interval of the `file` plugin's `reload` directive
    pub reload_interval: String,
}

impl Default for BlockLayout {
    fn default() -> Self {
        Self {
            snippet: "snip_base".to_string(),
            zone_dir: "/etc/coredns".to_string(),
            reload_interval: "5s".to_string(),
        }
    }
}

impl BlockLayout {
    /// Server block for `zone` on `port`, prefixed by a newline
    pub fn render(&self, zone: &str, port: u16) -> String {
        format!(
            "\n{zone}:{port} {{\n    import {snippet}\n    file {dir}/{zone}.db {{\n        reload {interval}\n    }}\n}}",
            zone = zone,
            port = port,
            snippet = self.snippet,
            dir = self.zone_dir.trim_end_matches('/'),
            interval = self.reload_interval,
        )
    }
}

/// A top-level block of a Corefile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block<'a> {
    /// Server keys preceding the opening brace
    pub keys: Vec<&'a str>,
    /// Directives between the outer braces
    pub body: &'a str,
    /// Byte range from the start of the keys to just past the closing brace
    pub span: Range<usize>,
}

impl Block<'_> {
    /// Whether this is the block of exactly one server key `key`
    pub fn is_single_key(&self, key: &str) -> bool {
        self.keys.len() == 1 && self.keys[0] == key
    }

    /// Path argument of the first `file` directive in the body
    pub fn file_directive(&self) -> Option<&str> {
        let mut tokens = self.body.lines().flat_map(|line| {
            let line = line.split('#').next().unwrap_or("");
            line.split_whitespace()
        });

        while let Some(token) = tokens.next() {
            if token == "file" {
                return tokens.next();
            }
        }
        None
    }

    /// Zone name and port when this block is a zone entry: a single
    /// `<zone>:<port>` key whose `file` directive points at `<zone>.db`
    pub fn zone_entry(&self) -> Option<(String, u16)> {
        if self.keys.len() != 1 {
            return None;
        }

        let (zone, port) = self.keys[0].rsplit_once(':')?;
        let port: u16 = port.parse().ok()?;
        if zone.is_empty() || zone == "." {
            return None;
        }

        let file = Path::new(self.file_directive()?).file_name()?.to_str()?;
        if file != format!("{}.db", zone) {
            return None;
        }

        Some((zone.to_string(), port))
    }
}

/// Split a Corefile into its top-level blocks.
///
/// `#` starts a comment running to the end of the line. Quoted strings are
/// opaque, with `\"` escaping a quote inside them. Text between blocks
/// (snippet references, blank lines) is not part of any block.
pub fn scan_blocks(text: &str) -> Result<Vec<Block<'_>>, String> {
    let mut blocks = Vec::new();
    let mut depth = 0usize;
    let mut in_comment = false;
    let mut in_quote = false;
    let mut escaped = false;
    let mut line = 1usize;
    // Start of the text that may hold the next block's keys
    let mut keys_start = 0usize;
    let mut open = 0usize;
    let mut block_start = 0usize;
    let mut keys: Vec<&str> = Vec::new();

    for (i, c) in text.char_indices() {
        if in_comment {
            if c == '\n' {
                in_comment = false;
                line += 1;
                if depth == 0 {
                    keys_start = i + 1;
                }
            }
            continue;
        }

        if in_quote {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_quote = false,
                '\n' => line += 1,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_quote = true,
            '#' => in_comment = true,
            '\n' => {
                line += 1;
                if depth == 0 {
                    keys_start = i + 1;
                }
            }
            '{' => {
                if depth == 0 {
                    let header = &text[keys_start..i];
                    let leading = header.len() - header.trim_start().len();
                    block_start = keys_start + leading;
                    keys = header.split_whitespace().collect();
                    if keys.is_empty() {
                        return Err(format!("line {}: block without server keys", line));
                    }
                    open = i;
                }
                depth += 1;
            }
            '}' => {
                if depth == 0 {
                    return Err(format!("line {}: unexpected '}}'", line));
                }
                depth -= 1;
                if depth == 0 {
                    blocks.push(Block {
                        keys: std::mem::take(&mut keys),
                        body: &text[open + 1..i],
                        span: block_start..i + 1,
                    });
                    keys_start = i + 1;
                }
            }
            _ => {}
        }
    }

    if in_quote {
        return Err(format!("line {}: unterminated quoted string", line));
    }

    if depth != 0 {
        return Err(format!("unclosed block starting at byte {}", block_start));
    }

    Ok(blocks)
}

/// Remove every block whose only server key is `key`, together with the
/// newline that introduced it. Returns `None` when no block matched.
pub fn remove_blocks(text: &str, key: &str) -> Result<Option<String>, String> {
    let spans: Vec<Range<usize>> = scan_blocks(text)?
        .into_iter()
        .filter(|block| block.is_single_key(key))
        .map(|block| block.span)
        .collect();

    if spans.is_empty() {
        return Ok(None);
    }

    let mut out = text.to_string();
    for span in spans.into_iter().rev() {
        let start = if span.start > 0 && text.as_bytes()[span.start - 1] == b'\n' {
            span.start - 1
        } else {
            span.start
        };
        out.replace_range(start..span.end, "");
    }

    Ok(Some(out))
}
