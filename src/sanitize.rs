//! Deterministic text normalization applied between categorize and summarize.
//!
//! [`sanitize`] is idempotent: applying it to its own output returns the
//! output unchanged. Table cell delimiters (`" ; "`) survive untouched.

use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

fn isolated_punctuation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `;` is excluded so extracted table rows keep their delimiter.
    RE.get_or_init(|| Regex::new(r"\s+([,.:!?])").unwrap())
}

/// Normalize `text` to its sanitized fixed point.
pub fn sanitize(text: &str) -> String {
    let mut current = sanitize_pass(text);
    loop {
        let next = sanitize_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn sanitize_pass(text: &str) -> String {
    let normalized: String = text
        .nfkc()
        .filter(|c| !is_invisible(*c))
        .collect();

    let collapsed = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    let attached = isolated_punctuation().replace_all(&collapsed, "$1");
    collapse_repeated_punctuation(&attached)
}

fn is_invisible(c: char) -> bool {
    (c.is_control() && !c.is_whitespace())
        || matches!(c, '\u{FFFD}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}')
}

/// `,,` → `,` (likewise `;:!?`); `..` → `.`; three or more dots → `...`.
fn collapse_repeated_punctuation(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                let mut run = 1;
                while chars.peek() == Some(&'.') {
                    chars.next();
                    run += 1;
                }
                out.push_str(if run >= 3 { "..." } else { "." });
            }
            ',' | ';' | ':' | '!' | '?' => {
                out.push(c);
                while chars.peek() == Some(&c) {
                    chars.next();
                }
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_trims() {
        assert_eq!(sanitize("  Article\t1\n\n  Scope  "), "Article 1 Scope");
    }

    #[test]
    fn applies_compatibility_normalization() {
        assert_eq!(sanitize("ﬁnal\u{00A0}text"), "final text");
    }

    #[test]
    fn strips_control_and_replacement_characters() {
        assert_eq!(sanitize("Reg\u{0}ula\u{7}tion\u{FFFD} (EU)\u{200B}"), "Regulation (EU)");
    }

    #[test]
    fn attaches_isolated_punctuation() {
        assert_eq!(
            sanitize("Member States , the Commission . Done !"),
            "Member States, the Commission. Done!"
        );
    }

    #[test]
    fn punctuation_pattern_matches_only_spaced_marks() {
        let re = isolated_punctuation();
        assert!(re.is_match("word ,"));
        assert!(re.is_match("end\t."));
        assert!(!re.is_match("cell ; cell"));
        assert!(!re.is_match("tight,"));
    }

    #[test]
    fn collapses_duplicated_punctuation() {
        assert_eq!(sanitize("Yes,, no;; why?? stop.. more....."), "Yes, no; why? stop. more...");
    }

    #[test]
    fn keeps_table_delimiters() {
        assert_eq!(
            sanitize("Code ; Description\n0101 ; Live horses"),
            "Code ; Description 0101 ; Live horses"
        );
    }

    #[test]
    fn is_idempotent() {
        let samples = [
            "word .. , ! text",
            " . . . ",
            "a , , b",
            "x \u{2026} y",
            "Annex I ; ; Part A ,. end",
            "",
        ];
        for s in samples {
            let once = sanitize(s);
            assert_eq!(sanitize(&once), once, "not idempotent for {:?}", s);
        }
    }
}
