//! Cleanup of free-text oracle output before it replaces a file.
//!
//! Generated text often arrives wrapped in markdown fences or behind a short
//! chat preamble. Only those two artifacts are removed; everything else is
//! taken literally.

/// Lines starting with one of these (case-insensitive, after trimming) are
/// treated as chat preamble when they appear before the first code line.
pub const REJECTED_PREAMBLE_PREFIXES: &[&str] = &[
    "here is",
    "here's",
    "below is",
    "the updated",
    "the corrected",
    "the fixed",
    "the complete",
    "sure",
    "certainly",
    "i have",
    "i've",
    "this is the",
    "updated code",
    "corrected code",
    "fixed code",
];

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

fn is_preamble(line: &str) -> bool {
    let lower = line.trim().to_ascii_lowercase();
    REJECTED_PREAMBLE_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Strip code fences and leading chat preamble.
///
/// When the text contains a fenced block, the first block's body is returned.
/// Otherwise leading blank/preamble lines and stray fence lines are dropped.
pub fn sanitize_generated(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();

    if let Some(open) = lines.iter().position(|l| is_fence(l)) {
        let close = lines[open + 1..]
            .iter()
            .position(|l| is_fence(l))
            .map(|i| open + 1 + i)
            .unwrap_or(lines.len());
        let body = lines[open + 1..close].join("\n");
        if !body.trim().is_empty() {
            return finish(&body);
        }
    }

    let kept: Vec<&str> = lines
        .iter()
        .copied()
        .skip_while(|l| l.trim().is_empty() || is_preamble(l))
        .filter(|l| !is_fence(l))
        .collect();
    finish(&kept.join("\n"))
}

fn finish(body: &str) -> String {
    let trimmed = body.trim_matches('\n').trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_body_and_drops_preamble() {
        let raw = "Here is the corrected file:\n\n```java\npackage a;\n\nclass B {}\n```\nLet me know if you need more.";
        assert_eq!(sanitize_generated(raw), "package a;\n\nclass B {}\n");
    }

    #[test]
    fn plain_code_passes_through() {
        let raw = "package a;\nclass B {\n    // here is a comment\n}";
        assert_eq!(sanitize_generated(raw), "package a;\nclass B {\n    // here is a comment\n}\n");
    }

    #[test]
    fn preamble_without_fences_is_removed() {
        let raw = "Sure! The updated code follows.\n\nimport x.Y;\nclass B {}";
        assert_eq!(sanitize_generated(raw), "import x.Y;\nclass B {}\n");
    }

    #[test]
    fn unterminated_fence_keeps_the_rest() {
        assert_eq!(sanitize_generated("```java\nclass B {}"), "class B {}\n");
    }

    #[test]
    fn empty_or_fence_only_output_becomes_empty() {
        assert_eq!(sanitize_generated(""), "");
        assert_eq!(sanitize_generated("```\n```"), "");
        assert_eq!(sanitize_generated("Here is the code:"), "");
    }
}
