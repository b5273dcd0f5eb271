//! Keep log records on one line.
//!
//! Group names, property names and gateway lines come from files a user
//! edits or from another process. They are escaped before they reach a log
//! record so an embedded newline cannot forge a second record.

use std::fmt::Write;

const MAX_PREVIEW: usize = 200;

/// Escape control characters and cap the length at 200 characters.
pub fn escape_log(s: &str) -> String {
    escape_log_limited(s, MAX_PREVIEW)
}

pub fn escape_log_limited(s: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(s.len().min(max_chars) + 4);
    for (count, ch) in s.chars().enumerate() {
        if count == max_chars {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{{{:x}}}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_characters_are_escaped() {
        assert_eq!(escape_log("temp\nerature"), "temp\\nerature");
        assert_eq!(escape_log("a\\b\t"), "a\\\\b\\t");
        assert_eq!(escape_log("bell\u{7}"), "bell\\u{7}");
    }

    #[test]
    fn long_values_are_truncated() {
        let long = "x".repeat(500);
        let out = escape_log(&long);
        assert_eq!(out.chars().count(), MAX_PREVIEW + 1);
        assert!(out.ends_with('…'));
        assert_eq!(escape_log_limited("abcdef", 3), "abc…");
        assert_eq!(escape_log_limited("abc", 3), "abc");
    }
}
