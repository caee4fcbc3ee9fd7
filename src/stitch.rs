//! Merge several migrated fragments of one class into a single target file.
//!
//! The first fragment with a type declaration supplies the package and the
//! class header (Javadoc, annotations, `extends`/`implements`). Imports are
//! unioned in first-seen order. Class members are kept in fragment order and
//! deduplicated, first occurrence wins:
//!
//! * methods and constructors by name and parameter count,
//! * fields by variable name,
//! * nested types by name.
//!
//! Initializer blocks are always kept.

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use crate::heuristics::{import_statements, mask_non_code, matching_brace};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StitchOutcome {
    pub target: String,
    pub fragments_used: Vec<String>,
    /// Fragments that do not exist under the migrated root.
    pub missing: Vec<String>,
    /// Fragments without a type declaration.
    pub unparsed: Vec<String>,
    pub imports: usize,
    pub members: usize,
    /// Members dropped because an earlier fragment already had them.
    pub duplicates: usize,
}

#[derive(Debug)]
struct Member {
    key: Option<String>,
    text: String,
}

#[derive(Debug)]
struct Fragment {
    package: Option<String>,
    imports: Vec<String>,
    header: String,
    members: Vec<Member>,
}

fn type_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:class|interface|enum|record)\s+\w+[^{;]*\{").unwrap())
}

fn prelude_stmt_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*(?:package|import)\s[^;]*;").unwrap())
}

fn package_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*package\s+([\w.]+)\s*;").unwrap())
}

fn annotation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@[\w.]+(?:\s*\([^)]*\))?").unwrap())
}

fn nested_type_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:class|interface|enum|record)\s+(\w+)").unwrap())
}

fn call_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\w+)\s*\(").unwrap())
}

fn last_ident_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\w+)(?:\s*\[\s*\])*\s*$").unwrap())
}

/// Parameter count of a `(...)` list body, ignoring commas inside generics.
fn arity(params: &str) -> usize {
    if params.trim().is_empty() {
        return 0;
    }
    let mut angle = 0i32;
    let mut commas = 0;
    for ch in params.chars() {
        match ch {
            '<' => angle += 1,
            '>' => angle -= 1,
            ',' if angle == 0 => commas += 1,
            _ => {}
        }
    }
    commas + 1
}

/// Dedup key for one member, computed on masked text. `None` for initializer blocks.
fn member_key(masked: &str, is_block: bool) -> Option<String> {
    let plain = annotation_re().replace_all(masked, "");
    let sig = if is_block {
        plain.split('{').next().unwrap_or("")
    } else {
        plain.trim_end().trim_end_matches(';')
    };
    if let Some(cap) = nested_type_re().captures(sig) {
        return Some(format!("type:{}", &cap[1]));
    }

    let before_init = sig.split('=').next().unwrap_or(sig);
    if let Some(cap) = call_open_re().captures(before_init) {
        let name = cap.get(1)?;
        let open = cap.get(0)?.end();
        let params = before_init[open..].split(')').next().unwrap_or("");
        return Some(format!("method:{}/{}", name.as_str(), arity(params)));
    }
    if is_block {
        return None;
    }
    let cap = last_ident_re().captures(before_init.trim_end())?;
    Some(format!("field:{}", &cap[1]))
}

/// Member text from `start` on, starting at the first non-blank line.
fn member_text(text: &str, start: usize, end: usize) -> Option<String> {
    let slice = &text[start..end];
    let first = slice.find(|c: char| !c.is_whitespace())?;
    let line_start = slice[..first].rfind('\n').map(|i| i + 1).unwrap_or(0);
    Some(slice[line_start..].trim_end().to_string())
}

/// Split a class body (`body_start..body_end` of `text`) into members.
fn split_members(text: &str, masked: &str, body_start: usize, body_end: usize) -> Vec<Member> {
    let bytes = masked.as_bytes();
    let mut members = Vec::new();
    let mut seg_start = body_start;
    let mut parens = 0i32;
    let mut initializer = false;
    let mut i = body_start;

    let mut push = |seg_start: usize, end: usize, is_block: bool| {
        let seg = &masked[seg_start..end];
        if seg.trim().trim_matches(';').trim().is_empty() {
            return;
        }
        if let Some(text) = member_text(text, seg_start, end) {
            members.push(Member {
                key: member_key(seg, is_block),
                text,
            });
        }
    };

    while i < body_end {
        match bytes[i] {
            b'(' => parens += 1,
            b')' => parens -= 1,
            b'=' if parens == 0 => initializer = true,
            b';' if parens == 0 => {
                push(seg_start, i + 1, false);
                seg_start = i + 1;
                initializer = false;
            }
            b'{' => {
                let Some(close) = matching_brace(masked, i) else { break };
                if parens == 0 && !initializer {
                    push(seg_start, close + 1, true);
                    seg_start = close + 1;
                }
                i = close;
            }
            _ => {}
        }
        i += 1;
    }
    members
}

fn parse_fragment(text: &str) -> Option<Fragment> {
    let masked = mask_non_code(text);
    let open = type_open_re().find(&masked)?;
    let close = matching_brace(&masked, open.end() - 1)?;
    let prelude = &masked[..open.start()];

    let header_start = prelude_stmt_re().find_iter(prelude).last().map(|m| m.end()).unwrap_or(0);
    Some(Fragment {
        package: package_re().captures(prelude).map(|c| c[1].to_string()),
        imports: import_statements(prelude),
        header: text[header_start..open.end()].trim().to_string(),
        members: split_members(text, &masked, open.end(), close),
    })
}

/// Stitch `fragments` (relative to `migrated_root`) into `target`.
///
/// Fails without writing when no fragment has a type declaration.
pub fn stitch_fragments(migrated_root: &Path, target: &str, fragments: &[String]) -> Result<StitchOutcome> {
    let mut outcome = StitchOutcome {
        target: target.to_string(),
        ..Default::default()
    };
    let mut package: Option<String> = None;
    let mut header: Option<String> = None;
    let mut imports: Vec<String> = Vec::new();
    let mut members: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for rel in fragments {
        let path = migrated_root.join(rel);
        if !path.is_file() {
            log::warn!("stitch: fragment {rel} not found");
            outcome.missing.push(rel.clone());
            continue;
        }
        let text = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let Some(fragment) = parse_fragment(&text) else {
            log::warn!("stitch: no type declaration in {rel}");
            outcome.unparsed.push(rel.clone());
            continue;
        };

        if let Some(p) = fragment.package {
            if package.is_none() {
                package = Some(p);
            } else if package.as_deref() != Some(p.as_str()) {
                log::warn!("stitch: {rel} declares package {p}, keeping {}", package.as_deref().unwrap_or_default());
            }
        }
        if header.is_none() {
            header = Some(fragment.header);
        }
        for import in fragment.imports {
            if !imports.contains(&import) {
                imports.push(import);
            }
        }
        for member in fragment.members {
            if let Some(key) = member.key {
                if !seen.insert(key) {
                    outcome.duplicates += 1;
                    continue;
                }
            }
            members.push(member.text);
        }
        outcome.fragments_used.push(rel.clone());
    }

    let Some(header) = header else {
        bail!("No usable fragments for {target}");
    };

    let mut out = String::new();
    if let Some(p) = &package {
        out.push_str(&format!("package {p};\n\n"));
    }
    for import in &imports {
        out.push_str(import);
        out.push('\n');
    }
    if !imports.is_empty() {
        out.push('\n');
    }
    out.push_str(&header);
    out.push('\n');
    for (i, member) in members.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(member);
        out.push('\n');
    }
    out.push_str("}\n");

    let dest = migrated_root.join(target);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&dest, out).with_context(|| format!("Failed to write {}", dest.display()))?;

    outcome.imports = imports.len();
    outcome.members = members.len();
    log::info!(
        "stitched {} fragments into {target} ({} members, {} duplicates dropped)",
        outcome.fragments_used.len(),
        outcome.members,
        outcome.duplicates
    );
    Ok(outcome)
}
