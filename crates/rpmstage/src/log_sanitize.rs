use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

const MAX_LOG_CHARS: usize = 4096;

fn escape_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"\x1b\[[0-?]*[ -/]*[@-~]",          // CSI
            r"|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)", // OSC
            r"|\x1b[PX^_][^\x1b]*\x1b\\",         // DCS/SOS/PM/APC
            r"|\x1b.?",
        ))
        .expect("escape regex")
    })
}

fn is_bidi_control(c: char) -> bool {
    matches!(c, '\u{061C}' | '\u{200E}' | '\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}')
}

/// Makes one line of packager output safe to put in a log record.
pub fn sanitize_log_line(input: &str) -> String {
    let stripped = escape_re().replace_all(input, "");
    let mut out = String::with_capacity(stripped.len().min(MAX_LOG_CHARS));
    let mut count = 0usize;
    for c in stripped.chars() {
        let c = if c == '\t' { ' ' } else { c };
        if c.is_control() || is_bidi_control(c) {
            continue;
        }
        if count == MAX_LOG_CHARS {
            out.push_str(" ...[truncated]");
            break;
        }
        out.push(c);
        count += 1;
    }
    out
}

pub fn tail_lines(path: &Path, n: usize) -> Vec<String> {
    let Ok(bytes) = fs::read(path) else {
        return Vec::new();
    };
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<String> = text
        .lines()
        .map(sanitize_log_line)
        .filter(|l| !l.trim().is_empty())
        .collect();
    let skip = lines.len().saturating_sub(n);
    lines.into_iter().skip(skip).collect()
}
