//! Best-effort structural fixes over Java source text.
//!
//! This is a pattern matcher, not a parser. The grammar subset it understands:
//!
//! * **Injected field**: `@Autowired|@Inject|@Resource [modifiers] Type name;` or
//!   `private|protected final Type name;` (constructor injection). Generic
//!   arguments after `Type` are allowed.
//! * **Public method set** of a type: every `public ... ReturnType name(` in the
//!   type's file, annotations allowed among the modifiers; for an `interface`,
//!   every method signature in the file. Types
//!   whose declaration `extends` something are skipped since inherited methods
//!   are invisible.
//! * **Call site**: `field.method(`.
//! * **Field reference**: a lowerCamel receiver `name.method(` that is not itself
//!   part of a dotted chain and has no declaration (`Type name` followed by
//!   `; = , ) :`, or a lambda parameter) anywhere in the file.
//!
//! Call-site resolution only fires when the receiver is a declared injected field
//! and the called method is absent from that field's type's public method set.
//!
//! Comments and string literal contents are blanked out (see [`mask_non_code`])
//! before any structural match, so Javadoc never produces fields or methods.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::config::HeuristicsConfig;
use crate::scanner::{scan_tree, ScanOptions};

/// Minimum name similarity (0..=1) for a method substitution.
const MIN_METHOD_SIMILARITY: f64 = 0.5;

const JAVA_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "return", "catch", "super", "this", "new", "throw", "else", "do", "try",
    "synchronized", "assert", "case", "default", "instanceof", "class", "null", "true", "false",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppliedFix {
    /// `field.from(` rewritten to `field.to(` because `from` is not on `class`.
    MethodRenamed {
        field: String,
        class: String,
        from: String,
        to: String,
    },
    /// Declaration synthesized for a field that was used but never declared.
    FieldInjected { field: String, type_name: String },
}

impl AppliedFix {
    /// Short category name recorded in the fix history.
    pub fn fix_type(&self) -> &'static str {
        match self {
            AppliedFix::MethodRenamed { .. } => "method_name_mismatch",
            AppliedFix::FieldInjected { .. } => "missing_field_injection",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeuristicOutcome {
    pub text: String,
    pub fixes: Vec<AppliedFix>,
}

impl HeuristicOutcome {
    pub fn changed(&self) -> bool {
        !self.fixes.is_empty()
    }
}

/// Where a type's source text comes from.
pub trait TypeSource {
    fn type_source(&self, type_name: &str) -> Option<String>;
}

/// `Type -> file` index of `.java` files under a set of roots (first root wins).
/// Files are read lazily so in-place rewrites during a run are seen.
#[derive(Debug, Default)]
pub struct TypeCatalog {
    files: HashMap<String, PathBuf>,
}

impl TypeCatalog {
    pub fn scan(roots: &[PathBuf]) -> Self {
        let mut files = HashMap::new();
        for root in roots {
            let entries = match scan_tree(&ScanOptions::new(root, &[".java"])) {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("type catalog: cannot scan {}: {e:#}", root.display());
                    continue;
                }
            };
            for entry in entries {
                let Some(stem) = entry.abs_path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                files.entry(stem.to_string()).or_insert(entry.abs_path);
            }
        }
        Self { files }
    }

}

impl TypeSource for TypeCatalog {
    fn type_source(&self, type_name: &str) -> Option<String> {
        let path = self.files.get(type_name)?;
        std::fs::read_to_string(path).ok()
    }
}

impl TypeSource for HashMap<String, String> {
    fn type_source(&self, type_name: &str) -> Option<String> {
        self.get(type_name).cloned()
    }
}

fn injected_annotated_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"@(?:Autowired|Inject|Resource)(?:\([^)]*\))?\s+(?:(?:private|protected|public|final|static)\s+)*([A-Z]\w*)(?:\s*<[^;{}()]*>)?\s+([a-z_]\w*)\s*;",
        )
        .unwrap()
    })
}

fn injected_final_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:private|protected)\s+final\s+([A-Z]\w*)(?:\s*<[^;{}()]*>)?\s+([a-z_]\w*)\s*;").unwrap()
    })
}

fn public_method_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\bpublic\s+(?:(?:static|final|synchronized|abstract|default|native|@[\w.]+(?:\([^)]*\))?)\s+)*(?:<[^>]*>\s*)?[\w.$]+(?:\s*<[^;{}()]*>)?(?:\s*\[\s*\])*\s+(\w+)\s*\(",
        )
        .unwrap()
    })
}

fn signature_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^\s*(?:(?:public|static|default|abstract|@[\w.]+(?:\([^)]*\))?)\s+)*(?:<[^>]*>\s*)?([\w.$]+)(?:\s*<[^;{}()]*>)?(?:\s*\[\s*\])*\s+(\w+)\s*\([^;{]*\)\s*(?:throws\s+[\w.,\s]+)?[;{]",
        )
        .unwrap()
    })
}

fn receiver_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([a-z_]\w*)\s*\.\s*\w+\s*\(").unwrap())
}

fn call_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\w+)\s*\(").unwrap())
}

fn class_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:class|enum|record)\s+\w+[^{;]*\{").unwrap())
}

fn package_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*package\s+[\w.]+\s*;[ \t]*\n?").unwrap())
}

fn import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*import\s+(?:static\s+)?([\w.]+)(?:\.\*)?\s*;").unwrap())
}

/// Copy of `text` with comments and the contents of string and char literals
/// replaced by spaces. Newlines and byte offsets are preserved, so a match in
/// the mask can be sliced out of `text` directly.
pub fn mask_non_code(text: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        LineComment,
        BlockComment,
        Literal(char),
    }

    fn blank(out: &mut String, ch: char) {
        if ch == '\n' {
            out.push('\n');
        } else {
            out.extend(std::iter::repeat(' ').take(ch.len_utf8()));
        }
    }

    let mut out = String::with_capacity(text.len());
    let mut state = State::Code;
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match state {
            State::Code => match (ch, chars.peek().copied()) {
                ('/', Some('/')) => {
                    state = State::LineComment;
                    blank(&mut out, ch);
                }
                ('/', Some('*')) => {
                    chars.next();
                    state = State::BlockComment;
                    out.push_str("  ");
                }
                ('"' | '\'', _) => {
                    state = State::Literal(ch);
                    out.push(ch);
                }
                _ => out.push(ch),
            },
            State::LineComment => {
                if ch == '\n' {
                    state = State::Code;
                }
                blank(&mut out, ch);
            }
            State::BlockComment => {
                if ch == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Code;
                    out.push_str("  ");
                } else {
                    blank(&mut out, ch);
                }
            }
            State::Literal(quote) => {
                if ch == '\\' {
                    blank(&mut out, ch);
                    if let Some(escaped) = chars.next() {
                        blank(&mut out, escaped);
                    }
                } else if ch == quote {
                    state = State::Code;
                    out.push(ch);
                } else if ch == '\n' {
                    // Unterminated literal; resync at the line end.
                    state = State::Code;
                    out.push(ch);
                } else {
                    blank(&mut out, ch);
                }
            }
        }
    }
    out
}

/// `(type, field)` pairs for every injected field declared in `text`, in order.
pub fn injected_fields(text: &str) -> Vec<(String, String)> {
    let mut out: Vec<(usize, String, String)> = Vec::new();
    for re in [injected_annotated_re(), injected_final_re()] {
        for cap in re.captures_iter(text) {
            let pos = cap.get(0).map(|m| m.start()).unwrap_or(0);
            let ty = cap[1].to_string();
            let field = cap[2].to_string();
            if !out.iter().any(|(_, _, f)| *f == field) {
                out.push((pos, ty, field));
            }
        }
    }
    out.sort_by_key(|(pos, _, _)| *pos);
    out.into_iter().map(|(_, ty, f)| (ty, f)).collect()
}

/// Public method names of `type_name` as declared in `source`, or `None` when the
/// type is not declared there or inherits from something.
pub fn public_methods(source: &str, type_name: &str) -> Option<BTreeSet<String>> {
    let source = mask_non_code(source);
    let source = source.as_str();
    let header_re = Regex::new(&format!(r"\b(class|interface|enum|record)\s+{}\b([^{{]*)\{{", regex::escape(type_name))).ok()?;
    let header = header_re.captures(source)?;
    if header[2].contains("extends") {
        return None;
    }
    let is_interface = &header[1] == "interface";

    let mut names: BTreeSet<String> = public_method_re()
        .captures_iter(source)
        .map(|c| c[1].to_string())
        .collect();
    if is_interface {
        for cap in signature_re().captures_iter(source) {
            if JAVA_KEYWORDS.contains(&&cap[1]) || JAVA_KEYWORDS.contains(&&cap[2]) {
                continue;
            }
            names.insert(cap[2].to_string());
        }
    }
    Some(names)
}

/// Method names invoked anywhere in `text` (keywords excluded), sorted.
pub fn called_method_names(text: &str) -> BTreeSet<String> {
    call_name_re()
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .filter(|m| !JAVA_KEYWORDS.contains(&m.as_str()))
        .collect()
}

/// Full declarations (signature + balanced body) of the named methods in `source`.
pub fn extract_method_declarations(source: &str, names: &BTreeSet<String>) -> Vec<String> {
    let masked = mask_non_code(source);
    let mut out: Vec<(usize, String)> = Vec::new();
    for name in names {
        let pattern = format!(
            r"(?m)^[ \t]*(?:(?:public|protected|private|static|final|synchronized|abstract)\s+)*(?:<[^>]*>\s*)?[\w.$]+(?:\s*<[^;{{}}()]*>)?(?:\s*\[\s*\])*\s+{}\s*\([^)]*\)\s*(?:throws\s+[\w.,\s]+)?\{{",
            regex::escape(name)
        );
        let Ok(re) = Regex::new(&pattern) else { continue };
        for m in re.find_iter(&masked) {
            if let Some(end) = matching_brace(&masked, m.end() - 1) {
                out.push((m.start(), source[m.start()..=end].trim().to_string()));
            }
        }
    }
    out.sort_by_key(|(pos, _)| *pos);
    out.into_iter().map(|(_, s)| s).collect()
}

/// Byte index of the `}` closing the `{` at `open`.
pub(crate) fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, ch) in text[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Imported type paths (`a.b.C`), in file order.
pub fn imports(text: &str) -> Vec<String> {
    import_re().captures_iter(text).map(|c| c[1].to_string()).collect()
}

/// Whole `import ...;` statements with whitespace collapsed, in file order.
pub fn import_statements(text: &str) -> Vec<String> {
    import_re()
        .find_iter(text)
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
        .collect()
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        cur[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            cur[j] = (prev[j] + 1).min(cur[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

fn name_similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (a.to_ascii_lowercase(), b.to_ascii_lowercase());
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

/// Closest method name in `candidates`, if any is similar enough. Ties keep set order.
pub fn best_method_match<'a>(missing: &str, candidates: &'a BTreeSet<String>) -> Option<&'a str> {
    let mut best: Option<(&str, f64)> = None;
    for c in candidates {
        let score = name_similarity(missing, c);
        if score >= MIN_METHOD_SIMILARITY && best.map_or(true, |(_, s)| score > s) {
            best = Some((c.as_str(), score));
        }
    }
    best.map(|(name, _)| name)
}

/// Rewrite calls on injected fields whose method does not exist on the field's type.
pub fn resolve_call_sites(text: &str, types: &dyn TypeSource) -> HeuristicOutcome {
    let mut out = text.to_string();
    let mut fixes = Vec::new();

    for (type_name, field) in injected_fields(text) {
        let Some(source) = types.type_source(&type_name) else { continue };
        let Some(methods) = public_methods(&source, &type_name) else { continue };
        if methods.is_empty() {
            continue;
        }

        let Ok(call_re) = Regex::new(&format!(r"\b{}\s*\.\s*(\w+)\s*\(", regex::escape(&field))) else {
            continue;
        };
        let called: BTreeSet<String> = call_re.captures_iter(&out).map(|c| c[1].to_string()).collect();

        for missing in called.iter().filter(|m| !methods.contains(*m)) {
            let Some(best) = best_method_match(missing, &methods) else {
                log::debug!("no substitute for {field}.{missing}() on {type_name}");
                continue;
            };
            let Ok(site_re) = Regex::new(&format!(
                r"(\b{}\s*\.\s*){}(\s*\()",
                regex::escape(&field),
                regex::escape(missing)
            )) else {
                continue;
            };
            out = site_re.replace_all(&out, format!("${{1}}{best}${{2}}")).into_owned();
            fixes.push(AppliedFix::MethodRenamed {
                field: field.clone(),
                class: type_name.clone(),
                from: missing.clone(),
                to: best.to_string(),
            });
        }
    }

    HeuristicOutcome { text: out, fixes }
}

fn is_declared(text: &str, name: &str) -> bool {
    let n = regex::escape(name);
    let decl = format!(
        r"\b(?:[A-Z][\w.]*|int|long|double|float|boolean|char|byte|short|var)(?:\s*<[^;(){{}}]*>)?(?:\s*\[\s*\])*\s+{n}\s*[;=,):]"
    );
    let lambda_single = format!(r"\b{n}\s*->");
    let lambda_multi = format!(r"\(\s*[\w\s,]*\b{n}\b[\w\s,]*\)\s*->");
    [decl, lambda_single, lambda_multi]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .any(|re| re.is_match(text))
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Receivers used as `name.method(` that have no declaration in `text`, in first-use order.
pub fn undeclared_receivers(text: &str) -> Vec<String> {
    let masked = mask_non_code(text);
    let mut seen: Vec<String> = Vec::new();
    for line in masked.lines() {
        let t = line.trim_start();
        if t.starts_with("import ") || t.starts_with("package ") {
            continue;
        }
        for cap in receiver_call_re().captures_iter(line) {
            let Some(m) = cap.get(1) else { continue };
            // Part of a dotted chain (a.b.c()) or a qualified name.
            if line[..m.start()].trim_end().ends_with('.') {
                continue;
            }
            let name = m.as_str();
            if JAVA_KEYWORDS.contains(&name) || seen.iter().any(|s| s == name) {
                continue;
            }
            seen.push(name.to_string());
        }
    }
    seen.retain(|name| !is_declared(&masked, name));
    seen
}

/// Add a declaration plus injection marker for every undeclared field reference.
/// The type is guessed by capitalizing the field name.
pub fn inject_missing_fields(text: &str, cfg: &HeuristicsConfig) -> HeuristicOutcome {
    let missing = undeclared_receivers(text);
    if missing.is_empty() {
        return HeuristicOutcome { text: text.to_string(), fixes: vec![] };
    }
    let masked = mask_non_code(text);
    let Some(open) = class_open_re().find(&masked) else {
        return HeuristicOutcome { text: text.to_string(), fixes: vec![] };
    };

    let mut block = String::new();
    let mut fixes = Vec::new();
    for field in missing {
        let type_name = capitalize(&field);
        block.push('\n');
        if !cfg.injection_annotation.trim().is_empty() {
            block.push_str("    ");
            block.push_str(cfg.injection_annotation.trim());
            block.push('\n');
        }
        block.push_str(&format!("    private {type_name} {field};\n"));
        fixes.push(AppliedFix::FieldInjected { field, type_name });
    }

    let mut out = String::with_capacity(text.len() + block.len() + 80);
    out.push_str(&text[..open.end()]);
    out.push_str(&block);
    out.push_str(&text[open.end()..]);

    let import = cfg.injection_import.trim();
    if !import.is_empty() && !imports(&out).iter().any(|i| i == import) {
        let line = format!("import {import};\n");
        out = match package_line_re().find(&out) {
            Some(pkg) => format!("{}\n{}{}", &out[..pkg.end()], line, &out[pkg.end()..]),
            None => format!("{line}{out}"),
        };
    }

    HeuristicOutcome { text: out, fixes }
}

/// Run both heuristics: call-site resolution first, then missing-field injection.
pub fn apply_local_fixes(text: &str, types: &dyn TypeSource, cfg: &HeuristicsConfig) -> HeuristicOutcome {
    let resolved = resolve_call_sites(text, types);
    let injected = inject_missing_fields(&resolved.text, cfg);
    let mut fixes = resolved.fixes;
    fixes.extend(injected.fixes);
    HeuristicOutcome {
        text: injected.text,
        fixes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER_SERVICE: &str = r#"package com.acme.user;

public class UserService {
    public User findUserById(long id) { return null; }
    public void saveUser(User u) { }
    private void audit() { }
}
"#;

    fn types() -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert("UserService".to_string(), USER_SERVICE.to_string());
        m.insert(
            "OrderGateway".to_string(),
            "public interface OrderGateway {\n    Order placeOrder(Order o);\n    void cancel(long id);\n}\n".to_string(),
        );
        m.insert(
            "UserRepository".to_string(),
            "public interface UserRepository extends JpaRepository<User, Long> {\n}\n".to_string(),
        );
        m
    }

    #[test]
    fn injected_fields_cover_annotation_and_final_forms() {
        let text = "class C {\n    @Autowired\n    private UserService userService;\n    private final OrderGateway gateway;\n    private final Map<String, Long> cache;\n}";
        assert_eq!(
            injected_fields(text),
            vec![
                ("UserService".to_string(), "userService".to_string()),
                ("OrderGateway".to_string(), "gateway".to_string()),
                ("Map".to_string(), "cache".to_string()),
            ]
        );
    }

    #[test]
    fn public_method_sets() {
        let svc = public_methods(USER_SERVICE, "UserService").unwrap();
        assert!(svc.contains("findUserById"));
        assert!(svc.contains("saveUser"));
        assert!(!svc.contains("audit"));

        let gw = public_methods(&types()["OrderGateway"], "OrderGateway").unwrap();
        assert_eq!(gw.into_iter().collect::<Vec<_>>(), vec!["cancel", "placeOrder"]);

        assert!(public_methods(&types()["UserRepository"], "UserRepository").is_none());
        assert!(public_methods(USER_SERVICE, "Missing").is_none());
    }

    #[test]
    fn resolves_missing_method_on_injected_field() {
        let text = "class C {\n    @Autowired\n    private UserService userService;\n    void run() {\n        userService.findUser(1);\n        userService.saveUser(u);\n        other.findUser(1);\n    }\n}";
        let out = resolve_call_sites(text, &types());
        assert!(out.text.contains("userService.findUserById(1);"));
        assert!(out.text.contains("userService.saveUser(u);"));
        assert!(out.text.contains("other.findUser(1);"), "non-injected receivers are untouched");
        assert_eq!(
            out.fixes,
            vec![AppliedFix::MethodRenamed {
                field: "userService".into(),
                class: "UserService".into(),
                from: "findUser".into(),
                to: "findUserById".into(),
            }]
        );
    }

    #[test]
    fn no_resolution_for_unknown_or_inheriting_types() {
        let text = "class C {\n    private final UserRepository repo;\n    @Inject Mystery mystery;\n    void run() { repo.findByEmail(e); mystery.go(); }\n}";
        let out = resolve_call_sites(text, &types());
        assert_eq!(out.text, text);
        assert!(out.fixes.is_empty());
    }

    #[test]
    fn dissimilar_names_are_left_alone() {
        let text = "class C {\n    @Autowired private UserService userService;\n    void run() { userService.zzz(); }\n}";
        let out = resolve_call_sites(text, &types());
        assert!(out.fixes.is_empty());
    }

    #[test]
    fn injects_undeclared_fields() {
        let text = "package com.acme;\n\nimport java.util.List;\n\npublic class OrderController {\n    public List<Order> list(String id) {\n        audit.record(id);\n        for (Order o : orders) { o.touch(); }\n        items.forEach(x -> x.go());\n        return orderService.findAll();\n    }\n}\n";
        let out = inject_missing_fields(text, &HeuristicsConfig::default());
        assert_eq!(
            out.fixes,
            vec![
                AppliedFix::FieldInjected { field: "audit".into(), type_name: "Audit".into() },
                AppliedFix::FieldInjected { field: "items".into(), type_name: "Items".into() },
                AppliedFix::FieldInjected { field: "orderService".into(), type_name: "OrderService".into() },
            ]
        );
        assert!(out.text.contains("public class OrderController {\n    @Autowired\n    private Audit audit;\n"));
        assert!(out.text.contains("private OrderService orderService;"));
        assert!(out
            .text
            .starts_with("package com.acme;\n\nimport org.springframework.beans.factory.annotation.Autowired;\n"));
    }

    #[test]
    fn declared_names_and_chains_are_not_injected() {
        let text = "import a.b.C;\nclass K {\n    private Repo repo;\n    void f(Service svc) {\n        repo.save(x);\n        svc.call();\n        System.out.println(1);\n        java.util.Objects.hash(1);\n        this.repo.save(y);\n    }\n}";
        let out = inject_missing_fields(text, &HeuristicsConfig::default());
        assert!(out.fixes.is_empty(), "{:?}", out.fixes);
        assert_eq!(out.text, text);
    }

    #[test]
    fn no_class_means_no_injection() {
        let out = inject_missing_fields("foo.bar();", &HeuristicsConfig::default());
        assert!(out.fixes.is_empty());
        assert_eq!(out.text, "foo.bar();");
    }

    #[test]
    fn extracts_called_legacy_methods_with_nested_bodies() {
        let legacy = "public class Legacy {\n    public int total(int a) {\n        if (a > 0) { return a; }\n        return 0;\n    }\n\n    private void unused() { }\n}\n";
        let names = called_method_names("int t = legacy.total(3);");
        assert!(names.contains("total"));
        let decls = extract_method_declarations(legacy, &names);
        assert_eq!(decls.len(), 1);
        assert!(decls[0].starts_with("public int total(int a) {"));
        assert!(decls[0].ends_with("return 0;\n    }"));
    }

    #[test]
    fn best_match_prefers_closest_name() {
        let cands: BTreeSet<String> = ["findUserById", "findAll", "saveUser"].iter().map(|s| s.to_string()).collect();
        assert_eq!(best_method_match("findUser", &cands), Some("findUserById"));
        assert_eq!(best_method_match("saveUsers", &cands), Some("saveUser"));
        assert_eq!(best_method_match("qqq", &cands), None);
    }

    #[test]
    fn annotated_methods_count_as_present() {
        let svc = "public class UserService {\n    public @Nullable User find(long id) { return null; }\n    public List<User> findAll() { return null; }\n}\n";
        let gw = "public interface UserGateway {\n    @Nullable\n    User find(long id);\n    @Deprecated(since = \"2\") List<User> findAll();\n}\n";
        let mut types = HashMap::new();
        types.insert("UserService".to_string(), svc.to_string());
        types.insert("UserGateway".to_string(), gw.to_string());

        assert!(public_methods(svc, "UserService").unwrap().contains("find"));
        let gw_methods = public_methods(gw, "UserGateway").unwrap();
        assert!(gw_methods.contains("find") && gw_methods.contains("findAll"));

        let text = "class C {\n    @Autowired private UserService userService;\n    @Autowired private UserGateway gateway;\n    void run() { userService.find(1); gateway.find(2); }\n}";
        let out = resolve_call_sites(text, &types);
        assert!(out.fixes.is_empty(), "{:?}", out.fixes);
        assert_eq!(out.text, text);
    }

    #[test]
    fn javadoc_never_receives_injected_fields() {
        let text = "/** The class Foo is {@link Bar} */\npublic class Foo {\n    void f() { client.send(x); }\n}\n";
        let out = inject_missing_fields(text, &HeuristicsConfig { injection_import: String::new(), ..Default::default() });
        assert_eq!(out.fixes.len(), 1);
        assert!(out.text.starts_with("/** The class Foo is {@link Bar} */\npublic class Foo {\n    @Autowired\n    private Client client;\n"));
    }

    #[test]
    fn receivers_in_comments_and_strings_are_ignored() {
        let text = "public class Foo {\n    /** Calls client.send(x) on startup. */\n    /* audit.log(y) */\n    void f() { log(\"see user.name() docs\"); } // cache.clear()\n}\n";
        assert!(undeclared_receivers(text).is_empty());
        let out = inject_missing_fields(text, &HeuristicsConfig::default());
        assert!(out.fixes.is_empty());
        assert_eq!(out.text, text);
    }

    #[test]
    fn mask_keeps_offsets_and_quotes() {
        let text = "a /* é */ b // c\n\"x{y}\" '}' 'q' \"esc\\\"d\" e";
        let masked = mask_non_code(text);
        assert_eq!(masked.len(), text.len());
        assert_eq!(masked, "a          b     \n\"    \" ' ' ' ' \"      \" e");
    }
}
