use once_cell::sync::Lazy;
use regex::Regex;

static ANSI_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1B\[[0-?]*[ -/]*[@-~]").expect("valid ansi escape regex"));

pub fn strip_terminal_escapes(line: &str) -> String {
    if !line.contains('\x1B') {
        return line.to_string();
    }
    ANSI_ESCAPE_RE.replace_all(line, "").into_owned()
}
