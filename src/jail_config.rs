//! Line-oriented parsing and mutation of fail2ban INI files.
//!
//! Everything in here is a pure function over text. The rules they share:
//! - a header is a line whose trimmed form is `[name]`, optionally followed
//!   by a `#` or `;` comment
//! - a key line is a non-indented `key = value` line
//! - indented non-blank lines continue the previous value, unless they are
//!   comments
//! - every line a function does not explicitly touch is copied verbatim
//!
//! Output always ends with exactly the newline structure of the input plus a
//! trailing `\n`.

use crate::validation::is_reserved_section;

/// Prefix of the line that marks a file as generated by jailctl.
pub const MANAGED_MARKER_PREFIX: &str = "# jailctl:managed v";

/// Current version of the managed marker.
pub const MANAGED_MARKER_VERSION: u32 = 1;

/// The marker line written at the top of every managed file.
pub fn managed_marker() -> String {
    format!("{}{}", MANAGED_MARKER_PREFIX, MANAGED_MARKER_VERSION)
}

/// Version of the managed marker present in `content`, if any.
pub fn marker_version(content: &str) -> Option<u32> {
    content.lines().find_map(|line| {
        let rest = line.trim().strip_prefix(MANAGED_MARKER_PREFIX)?;
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    })
}

/// Section name if `line` is a `[section]` header.
///
/// A trailing comment is allowed: `[sshd]  # web` is the `sshd` header.
pub fn parse_header(line: &str) -> Option<&str> {
    let t = line.trim();
    let inner = t.strip_prefix('[')?;
    let close = inner.find(']')?;
    let rest = inner[close + 1..].trim_start();
    if !(rest.is_empty() || is_comment(rest)) {
        return None;
    }
    let name = &inner[..close];
    if name.contains('[') {
        return None;
    }
    Some(name.trim())
}

/// Section name if `line` is a commented-out header such as `#[apache]`.
pub fn parse_commented_header(line: &str) -> Option<&str> {
    let t = line.trim_start();
    if !is_comment(t) {
        return None;
    }
    let uncommented = t.trim_start_matches(['#', ';']);
    parse_header(uncommented)
}

fn is_comment(trimmed: &str) -> bool {
    trimmed.starts_with('#') || trimmed.starts_with(';')
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
}

/// Split a `key = value` fragment. Works on already-trimmed text.
fn split_key_value(trimmed: &str) -> Option<(&str, &str)> {
    if trimmed.is_empty() || is_comment(trimmed) {
        return None;
    }
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || !key.chars().all(is_key_char) {
        return None;
    }
    Some((key, value.trim()))
}

/// `(key, value)` if `line` is a non-indented key line.
pub fn parse_key_line(line: &str) -> Option<(&str, &str)> {
    if line.starts_with([' ', '\t']) {
        return None;
    }
    split_key_value(line.trim_end())
}

fn is_continuation(line: &str) -> bool {
    let trimmed = line.trim();
    line.starts_with([' ', '\t']) && !trimmed.is_empty() && !is_comment(trimmed)
}

fn finish(lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Interpret a fail2ban boolean.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "1" | "on"
    )
}

/// Minimal content for a jail with no configuration yet.
pub fn jail_skeleton(name: &str) -> String {
    format!("[{}]\n", name)
}

/// Force `content` to carry exactly one `[name]` header.
///
/// The first `[name]` header is kept; if there is none, the first header of
/// any name is turned into `[name]`; if there are no headers at all,
/// `[name]` is prepended. Every other header line is dropped while the body
/// lines below it stay, so a pasted second section cannot become a second
/// active jail.
pub fn normalize_jail_header(name: &str, content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let canonical = format!("[{}]", name);

    let headers: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| parse_header(l).is_some())
        .map(|(i, _)| i)
        .collect();

    let keep = headers
        .iter()
        .copied()
        .find(|&i| parse_header(lines[i]) == Some(name))
        .or_else(|| headers.first().copied());

    let mut out = Vec::with_capacity(lines.len() + 1);
    match keep {
        Some(keep) => {
            for (i, line) in lines.iter().enumerate() {
                if i == keep {
                    out.push(canonical.clone());
                } else if parse_header(line).is_none() {
                    out.push(line.to_string());
                }
            }
        }
        None => {
            out.push(canonical);
            out.extend(lines.iter().map(|l| l.to_string()));
        }
    }
    finish(out)
}

/// Set `key = value` inside `[section]` only.
///
/// An existing key line (and any continuation lines of its old value) is
/// replaced in place; otherwise the line is inserted after the last
/// non-blank line of the section, so it never lands above an indented line
/// it could capture. A missing section is appended at the end of the
/// document. Every other line is kept as is.
pub fn set_key_in_section(content: &str, section: &str, key: &str, value: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let new_line = if value.is_empty() {
        format!("{} =", key)
    } else {
        format!("{} = {}", key, value)
    };

    let Some(start) = lines.iter().position(|l| parse_header(l) == Some(section)) else {
        let mut out: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
        if out.last().is_some_and(|l| !l.trim().is_empty()) {
            out.push(String::new());
        }
        out.push(format!("[{}]", section));
        out.push(new_line);
        return finish(out);
    };

    let end = lines[start + 1..]
        .iter()
        .position(|l| parse_header(l).is_some())
        .map_or(lines.len(), |p| start + 1 + p);

    let existing = (start + 1..end).find(|&i| parse_key_line(lines[i]).is_some_and(|(k, _)| k == key));

    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 1);
    match existing {
        Some(i) => {
            let mut j = i + 1;
            while j < end && is_continuation(lines[j]) {
                j += 1;
            }
            out.extend(lines[..i].iter().map(|l| l.to_string()));
            out.push(new_line);
            out.extend(lines[j..].iter().map(|l| l.to_string()));
        }
        None => {
            let at = (start..end)
                .rev()
                .find(|&i| !lines[i].trim().is_empty())
                .unwrap_or(start);
            out.extend(lines[..=at].iter().map(|l| l.to_string()));
            out.push(new_line);
            out.extend(lines[at + 1..].iter().map(|l| l.to_string()));
        }
    }
    finish(out)
}

/// Set `enabled = <bool>` inside the jail's own section.
pub fn set_jail_enabled(content: &str, jail: &str, enabled: bool) -> String {
    set_key_in_section(content, jail, "enabled", if enabled { "true" } else { "false" })
}

/// Filter name referenced by a jail, without inline arguments.
///
/// `filter = nginx-limit-req[mode=aggressive]` yields `nginx-limit-req`.
/// Returns an empty string when the jail sets no filter.
pub fn extract_filter_from_jail_config(content: &str) -> String {
    content
        .lines()
        .filter_map(parse_key_line)
        .find(|(k, _)| *k == "filter")
        .map(|(_, v)| v.split('[').next().unwrap_or("").trim().to_string())
        .unwrap_or_default()
}

/// Log paths of a jail, one per line.
///
/// A `logpath =` value may continue over the following non-blank lines; the
/// continuation ends at a blank line, a comment, a header, or the next
/// `key = value` line. Every line may hold several whitespace-separated
/// paths.
pub fn extract_logpath_from_jail_config(content: &str) -> String {
    let mut paths: Vec<String> = Vec::new();
    let mut in_logpath = false;

    for line in content.lines() {
        let trimmed = line.trim();
        if in_logpath {
            if trimmed.is_empty()
                || is_comment(trimmed)
                || parse_header(line).is_some()
                || split_key_value(trimmed).is_some()
            {
                break;
            }
            paths.extend(trimmed.split_whitespace().map(String::from));
            continue;
        }
        if let Some(("logpath", value)) = split_key_value(trimmed) {
            paths.extend(value.split_whitespace().map(String::from));
            in_logpath = true;
        }
    }

    paths.join("\n")
}

/// A jail section found in a config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JailSection {
    pub name: String,
    pub enabled: bool,
}

/// Jail sections of a document in file order, with their `enabled` flag.
/// `DEFAULT` and `INCLUDES` are never reported.
pub fn parse_jail_sections(content: &str) -> Vec<JailSection> {
    let mut sections: Vec<JailSection> = Vec::new();
    let mut current: Option<usize> = None;

    for line in content.lines() {
        if let Some(name) = parse_header(line) {
            if is_reserved_section(name) || name.is_empty() {
                current = None;
            } else {
                sections.push(JailSection {
                    name: name.to_string(),
                    enabled: false,
                });
                current = Some(sections.len() - 1);
            }
            continue;
        }
        if let (Some(idx), Some(("enabled", value))) = (current, parse_key_line(line)) {
            sections[idx].enabled = parse_bool(value);
        }
    }
    sections
}

/// True if the document contains a `[section]` header.
pub fn has_section(content: &str, section: &str) -> bool {
    content.lines().any(|l| parse_header(l) == Some(section))
}

/// `key = value` pairs of one section in order. Continuation lines are
/// joined to their value with `\n`; comments are skipped.
pub fn section_values(content: &str, section: &str) -> Vec<(String, String)> {
    let mut values: Vec<(String, String)> = Vec::new();
    let mut inside = false;

    for line in content.lines() {
        if let Some(name) = parse_header(line) {
            inside = name == section;
            continue;
        }
        if !inside {
            continue;
        }
        if let Some((key, value)) = parse_key_line(line) {
            values.push((key.to_string(), value.to_string()));
        } else if is_continuation(line) {
            if let Some((_, value)) = values.last_mut() {
                if !value.is_empty() {
                    value.push('\n');
                }
                value.push_str(line.trim());
            }
        }
    }
    values
}

/// What a block of a legacy monolithic jail file is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    /// Lines before the first header
    Preamble,
    /// An active section (`[name]`), including `DEFAULT` and `INCLUDES`
    Section(String),
    /// A commented-out section (`#[name]`)
    Commented(String),
}

/// A contiguous run of lines owned by one section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub lines: Vec<String>,
}

impl Block {
    /// Lines with trailing blank lines removed, newline-terminated.
    pub fn text(&self) -> String {
        let mut lines = self.lines.clone();
        while lines.last().is_some_and(|l| l.trim().is_empty()) {
            lines.pop();
        }
        finish(lines)
    }
}

/// Split a document into preamble, active and commented sections.
///
/// A commented header starts its own block, but a real key or continuation
/// line found inside it still belongs to the enclosing active section, the
/// same way fail2ban would read it.
pub fn split_blocks(content: &str) -> Vec<Block> {
    let mut blocks = vec![Block {
        kind: BlockKind::Preamble,
        lines: Vec::new(),
    }];
    let mut active: Option<usize> = None;

    for line in content.lines() {
        if let Some(name) = parse_header(line) {
            blocks.push(Block {
                kind: BlockKind::Section(name.to_string()),
                lines: vec![line.to_string()],
            });
            active = Some(blocks.len() - 1);
            continue;
        }
        if let Some(name) = parse_commented_header(line) {
            blocks.push(Block {
                kind: BlockKind::Commented(name.to_string()),
                lines: vec![line.to_string()],
            });
            continue;
        }

        let last = blocks.len() - 1;
        let trimmed = line.trim();
        let is_setting = !trimmed.is_empty() && !is_comment(trimmed);
        let target = match (&blocks[last].kind, active) {
            (BlockKind::Commented(_), Some(owner)) if is_setting => owner,
            _ => last,
        };
        blocks[target].lines.push(line.to_string());
    }

    if blocks[0].lines.is_empty() {
        blocks.remove(0);
    }
    blocks
}

/// Render blocks back into a document.
pub fn join_blocks(blocks: &[Block]) -> String {
    let lines: Vec<String> = blocks.iter().flat_map(|b| b.lines.iter().cloned()).collect();
    if lines.is_empty() {
        return String::new();
    }
    finish(lines)
}

/// Prefix every non-blank line with `# `.
pub fn comment_out(block: &Block) -> Block {
    let name = match &block.kind {
        BlockKind::Section(name) | BlockKind::Commented(name) => name.clone(),
        BlockKind::Preamble => String::new(),
    };
    Block {
        kind: BlockKind::Commented(name),
        lines: block
            .lines
            .iter()
            .map(|l| {
                if l.trim().is_empty() {
                    l.clone()
                } else {
                    format!("# {}", l)
                }
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header("[sshd]"), Some("sshd"));
        assert_eq!(parse_header("  [ nginx ]  "), Some("nginx"));
        assert_eq!(parse_header("# [sshd]"), None);
        assert_eq!(parse_header("enabled = true"), None);
        assert_eq!(parse_commented_header("#[apache]"), Some("apache"));
        assert_eq!(parse_commented_header("; [apache]"), Some("apache"));
        assert_eq!(parse_commented_header("# just a comment"), None);
    }

    #[test]
    fn test_parse_key_line() {
        assert_eq!(parse_key_line("enabled = true"), Some(("enabled", "true")));
        assert_eq!(parse_key_line("bantime=1h"), Some(("bantime", "1h")));
        assert_eq!(parse_key_line("   /var/log/secure"), None);
        assert_eq!(parse_key_line("    maxretry = 3"), None);
        assert_eq!(parse_key_line("# enabled = true"), None);
        assert_eq!(parse_key_line("/var/log/a=b"), None);
    }

    #[test]
    fn test_marker_version() {
        assert_eq!(marker_version(&format!("{}\n[sshd]\n", managed_marker())), Some(1));
        assert_eq!(marker_version("# jailctl:managed v7 extra\n"), Some(7));
        assert_eq!(marker_version("[sshd]\nenabled = true\n"), None);
    }

    #[test]
    fn test_normalize_keeps_matching_header_and_drops_others() {
        let content = "[sshd]\nenabled = true\n[nginx]\nport = http\n";
        assert_eq!(
            normalize_jail_header("sshd", content),
            "[sshd]\nenabled = true\nport = http\n"
        );
    }

    #[test]
    fn test_normalize_matching_header_not_first() {
        let content = "# note\n[other]\nfoo = 1\n[sshd]\nbar = 2\n";
        assert_eq!(
            normalize_jail_header("sshd", content),
            "# note\nfoo = 1\n[sshd]\nbar = 2\n"
        );
    }

    #[test]
    fn test_normalize_replaces_first_mismatched_header() {
        let content = "[ssh]\nenabled = true\n[extra]\nmaxretry = 3";
        assert_eq!(
            normalize_jail_header("sshd", content),
            "[sshd]\nenabled = true\nmaxretry = 3\n"
        );
    }

    #[test]
    fn test_normalize_prepends_missing_header() {
        assert_eq!(
            normalize_jail_header("sshd", "enabled = true\nport = ssh\n"),
            "[sshd]\nenabled = true\nport = ssh\n"
        );
        assert_eq!(normalize_jail_header("sshd", ""), "[sshd]\n");
    }

    #[test]
    fn test_normalize_duplicate_matching_headers() {
        let content = "[sshd]\na = 1\n[sshd]\nb = 2\n";
        assert_eq!(normalize_jail_header("sshd", content), "[sshd]\na = 1\nb = 2\n");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let content = "[x]\n  continued\n\n# c\n[y]\nk = v\n";
        let once = normalize_jail_header("sshd", content);
        assert_eq!(normalize_jail_header("sshd", &once), once);
    }

    #[test]
    fn test_set_enabled_appends_to_section() {
        let content = "[sshd]\nport = ssh\nlogpath = %(sshd_log)s\n";
        assert_eq!(
            set_jail_enabled(content, "sshd", true),
            "[sshd]\nport = ssh\nlogpath = %(sshd_log)s\nenabled = true\n"
        );
        assert_eq!(set_jail_enabled("[sshd]\n", "sshd", false), "[sshd]\nenabled = false\n");
    }

    #[test]
    fn test_set_enabled_keeps_indented_comment() {
        let original = "[sshd]\n    # reviewed by ops, keep strict\nport = ssh\n";
        let enabled = set_jail_enabled(original, "sshd", true);
        assert_eq!(
            enabled,
            "[sshd]\n    # reviewed by ops, keep strict\nport = ssh\nenabled = true\n"
        );
        let disabled = set_jail_enabled(&enabled, "sshd", false);
        assert_eq!(
            disabled,
            "[sshd]\n    # reviewed by ops, keep strict\nport = ssh\nenabled = false\n"
        );
    }

    #[test]
    fn test_set_enabled_replace_keeps_comment_below_key() {
        let content = "[sshd]\nenabled = true\n  ; disabled during audit\n\nport = ssh\n";
        assert_eq!(
            set_jail_enabled(content, "sshd", false),
            "[sshd]\nenabled = false\n  ; disabled during audit\n\nport = ssh\n"
        );
    }

    #[test]
    fn test_set_enabled_never_captures_indented_line() {
        // A leading indented line stays where it is across toggles
        let content = "[a]\n  a\n";
        let off = set_jail_enabled(content, "a", false);
        assert_eq!(off, "[a]\n  a\nenabled = false\n");
        assert_eq!(set_jail_enabled(&off, "a", false), off);
        assert_eq!(set_jail_enabled(&off, "a", true), "[a]\n  a\nenabled = true\n");
    }

    #[test]
    fn test_set_enabled_round_trip_preserves_other_lines() {
        let content = "\
# top comment
[sshd]
# why this jail exists

port = ssh
logpath = /var/log/auth.log
          /var/log/secure
    # old path: /var/log/messages

[nginx]
port = http
";
        let on = set_jail_enabled(content, "sshd", true);
        let off = set_jail_enabled(&on, "sshd", false);
        let others = |text: &str| -> Vec<String> {
            text.lines()
                .filter(|l| !l.starts_with("enabled ="))
                .map(String::from)
                .collect()
        };
        assert_eq!(others(&on), others(content));
        assert_eq!(others(&off), others(content));
        assert_eq!(on.lines().filter(|l| l.starts_with("enabled =")).count(), 1);
        assert!(off.contains("    # old path: /var/log/messages\nenabled = false\n\n[nginx]"));
    }

    #[test]
    fn test_parse_header_with_trailing_comment() {
        assert_eq!(parse_header("[sshd]  # web"), Some("sshd"));
        assert_eq!(parse_header("[sshd] ; see [notes]"), Some("sshd"));
        assert_eq!(parse_header("[sshd] extra"), None);
        assert_eq!(parse_header("[a[b]"), None);
        assert_eq!(
            parse_jail_sections("[sshd]  # web\nenabled = true\n"),
            vec![JailSection { name: "sshd".to_string(), enabled: true }]
        );
        assert_eq!(
            normalize_jail_header("sshd", "[sshd] # web\nport = ssh\n"),
            "[sshd]\nport = ssh\n"
        );
    }

    #[test]
    fn test_set_enabled_replaces_existing_line_only() {
        let content = "[sshd]\nport = ssh\nenabled = false\nmaxretry = 3\n";
        assert_eq!(
            set_jail_enabled(content, "sshd", true),
            "[sshd]\nport = ssh\nenabled = true\nmaxretry = 3\n"
        );
    }

    #[test]
    fn test_set_enabled_scoped_to_section() {
        let content = "[DEFAULT]\nenabled = false\n\n[sshd]\nport = ssh\n\n[nginx]\nenabled = false\n";
        let out = set_jail_enabled(content, "sshd", true);
        assert_eq!(
            out,
            "[DEFAULT]\nenabled = false\n\n[sshd]\nport = ssh\nenabled = true\n\n[nginx]\nenabled = false\n"
        );
    }

    #[test]
    fn test_set_key_replaces_multiline_value() {
        let content = "[DEFAULT]\nignoreip = 127.0.0.1/8\n           10.0.0.0/8\nbantime = 1h\n";
        assert_eq!(
            set_key_in_section(content, "DEFAULT", "ignoreip", "127.0.0.1/8 ::1"),
            "[DEFAULT]\nignoreip = 127.0.0.1/8 ::1\nbantime = 1h\n"
        );
    }

    #[test]
    fn test_set_key_appends_missing_section() {
        assert_eq!(
            set_key_in_section("# header\n", "DEFAULT", "bantime", "1h"),
            "# header\n\n[DEFAULT]\nbantime = 1h\n"
        );
        assert_eq!(set_key_in_section("", "DEFAULT", "bantime", "1h"), "[DEFAULT]\nbantime = 1h\n");
    }

    #[test]
    fn test_extract_filter() {
        assert_eq!(extract_filter_from_jail_config("[sshd]\nfilter = sshd\n"), "sshd");
        assert_eq!(
            extract_filter_from_jail_config("[x]\nfilter = nginx-limit-req[mode=aggressive]\n"),
            "nginx-limit-req"
        );
        assert_eq!(extract_filter_from_jail_config("[x]\n# filter = nope\n"), "");
    }

    #[test]
    fn test_extract_logpath_multiline() {
        let content = "[sshd]\nlogpath = /var/log/auth.log\n          /var/log/secure\nmaxretry = 3\n";
        assert_eq!(
            extract_logpath_from_jail_config(content),
            "/var/log/auth.log\n/var/log/secure"
        );
    }

    #[test]
    fn test_extract_logpath_terminators() {
        let blank = "logpath = /a.log\n  /b.log\n\n  /c.log\n";
        assert_eq!(extract_logpath_from_jail_config(blank), "/a.log\n/b.log");

        let comment = "logpath = /a.log\n# /b.log\n  /c.log\n";
        assert_eq!(extract_logpath_from_jail_config(comment), "/a.log");

        let several = "logpath = /a.log /b.log\n  /c.log /d.log\n[next]\n";
        assert_eq!(
            extract_logpath_from_jail_config(several),
            "/a.log\n/b.log\n/c.log\n/d.log"
        );

        let empty_first = "logpath =\n    /var/log/nginx/access.log\nport = http\n";
        assert_eq!(
            extract_logpath_from_jail_config(empty_first),
            "/var/log/nginx/access.log"
        );

        assert_eq!(extract_logpath_from_jail_config("[sshd]\nport = ssh\n"), "");
    }

    #[test]
    fn test_parse_jail_sections() {
        let content = "[DEFAULT]\nenabled = true\n[sshd]\nenabled = yes\n[nginx]\nport = http\n[INCLUDES]\nbefore = paths-debian.conf\n";
        assert_eq!(
            parse_jail_sections(content),
            vec![
                JailSection { name: "sshd".to_string(), enabled: true },
                JailSection { name: "nginx".to_string(), enabled: false },
            ]
        );
    }

    #[test]
    fn test_section_values_with_continuation() {
        let content = "[INCLUDES]\nbefore = paths-debian.conf\n[DEFAULT]\nsshd_log = %(syslog_authpriv)s\nlogs = /a\n       /b\n";
        assert_eq!(
            section_values(content, "INCLUDES"),
            vec![("before".to_string(), "paths-debian.conf".to_string())]
        );
        assert_eq!(
            section_values(content, "DEFAULT"),
            vec![
                ("sshd_log".to_string(), "%(syslog_authpriv)s".to_string()),
                ("logs".to_string(), "/a\n/b".to_string()),
            ]
        );
    }

    #[test]
    fn test_split_blocks() {
        let content = "# top\n[DEFAULT]\nbantime = 1h\n\n[sshd]\nenabled = true\n\n#[apache]\n#enabled = true\n\n[nginx]\nenabled = true\n";
        let blocks = split_blocks(content);
        let kinds: Vec<BlockKind> = blocks.iter().map(|b| b.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::Preamble,
                BlockKind::Section("DEFAULT".to_string()),
                BlockKind::Section("sshd".to_string()),
                BlockKind::Commented("apache".to_string()),
                BlockKind::Section("nginx".to_string()),
            ]
        );
        assert_eq!(join_blocks(&blocks), content);
        assert_eq!(blocks[2].text(), "[sshd]\nenabled = true\n");
    }

    #[test]
    fn test_split_blocks_settings_after_commented_header_stay_with_section() {
        let content = "[sshd]\nenabled = true\n#[old]\nport = ssh\n";
        let blocks = split_blocks(content);
        assert_eq!(blocks[0].lines, vec!["[sshd]", "enabled = true", "port = ssh"]);
        assert_eq!(blocks[1].lines, vec!["#[old]"]);
    }

    #[test]
    fn test_comment_out() {
        let block = Block {
            kind: BlockKind::Section("sshd".to_string()),
            lines: vec!["[sshd]".to_string(), "enabled = true".to_string(), String::new()],
        };
        let commented = comment_out(&block);
        assert_eq!(commented.kind, BlockKind::Commented("sshd".to_string()));
        assert_eq!(commented.lines, vec!["# [sshd]", "# enabled = true", ""]);
    }

    fn body_line() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-z]{1,8} = [a-z0-9/]{0,10}",
            "  [a-z0-9/]{1,12}",
            "# [a-z ]{0,12}",
            Just(String::new()),
        ]
    }

    fn document() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(
            prop_oneof![3 => body_line(), 1 => "\\[[a-z]{1,6}\\]"],
            0..20,
        )
    }

    proptest! {
        #[test]
        fn prop_normalize_single_header_and_body_preserved(lines in document()) {
            let content = lines.join("\n");
            let out = normalize_jail_header("sshd", &content);

            let headers: Vec<&str> = out.lines().filter_map(parse_header).collect();
            prop_assert_eq!(headers, vec!["sshd"]);

            let body_in: Vec<&str> = content.lines().filter(|l| parse_header(l).is_none()).collect();
            let body_out: Vec<&str> = out.lines().filter(|l| parse_header(l).is_none()).collect();
            prop_assert_eq!(body_in, body_out);
        }

        #[test]
        fn prop_set_enabled_touches_one_line(lines in prop::collection::vec(body_line(), 0..10), flag: bool) {
            let content = format!("[other]\nenabled = maybe\n[sshd]\n{}", lines.join("\n"));
            let out = set_jail_enabled(&content, "sshd", flag);
            let expected = if flag { "enabled = true" } else { "enabled = false" };
            prop_assert!(out.lines().any(|l| l == expected));
            prop_assert!(out.starts_with("[other]\nenabled = maybe\n[sshd]\n"));
        }
    }
}
