//! Deterministic cleanup of model-generated Markdown.
//!
//! Models ignore parts of their prompt often enough that each page reply is
//! normalised before assembly:
//!
//! 1. unwrap a ```` ```markdown ```` fence around the whole reply;
//! 2. LF line endings, no trailing whitespace, no zero-width characters;
//! 3. at most one blank line in a row, and one before every heading;
//! 4. GFM tables get exactly one separator row, right after the header;
//! 5. image references survive only when they name a cropped region of this
//!    page or an absolute http(s) URL; anything else becomes its italic alt
//!    text, or disappears when the alt text is empty;
//! 6. exactly one trailing newline.
//!
//! Every rule is a `&str -> String` function so the order above is the only
//! coupling between them.

use crate::pipeline::headings::lines_outside_code;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Clean one page reply. `region_images` are the file names announced to the
/// model for this page.
pub fn clean_page(input: &str, region_images: &[String]) -> String {
    let s = unwrap_fence(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = space_headings(&s);
    let s = collapse_blank_lines(&s);
    let s = repair_tables(&s);
    let s = filter_images(&s, region_images);
    ensure_final_newline(&s)
}

/// Final pass over the assembled document.
pub fn finish_document(input: &str) -> String {
    ensure_final_newline(&collapse_blank_lines(input))
}

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\r?\n(.*?)\r?\n```$").expect("valid regex"));

fn unwrap_fence(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCE.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}'],
        "",
    )
}

fn trim_trailing_whitespace(input: &str) -> String {
    input.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n").into_owned()
}

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6} \S").expect("valid regex"));

/// Insert a blank line before headings that directly follow text. Fenced
/// code is left alone.
fn space_headings(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for (line, prose) in lines_outside_code(input) {
        let needs_gap =
            prose && RE_HEADING.is_match(line) && out.last().is_some_and(|prev| !prev.is_empty());
        if needs_gap {
            out.push("");
        }
        out.push(line);
    }
    out.join("\n")
}

fn is_table_row(line: &str) -> bool {
    let t = line.trim();
    t.len() > 2 && t.starts_with('|') && t.ends_with('|')
}

fn is_separator_row(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|')
        && t.contains('-')
        && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// One separator row per table, directly after the header. Tables inside
/// fenced code are not tables.
fn repair_tables(input: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut row_in_table = 0usize;

    for (line, prose) in lines_outside_code(input) {
        if !prose || !is_table_row(line) {
            row_in_table = 0;
            out.push(line.to_string());
            continue;
        }
        row_in_table += 1;
        let separator = is_separator_row(line);
        match (row_in_table, separator) {
            (1, true) => row_in_table = 0,
            (1, false) | (2, true) => out.push(line.to_string()),
            (2, false) => {
                let header = out.last().map(String::as_str).unwrap_or(line);
                out.push(separator_for(header));
                out.push(line.to_string());
                row_in_table = 3;
            }
            (_, true) => row_in_table -= 1,
            (_, false) => out.push(line.to_string()),
        }
    }
    out.join("\n")
}

fn separator_for(header: &str) -> String {
    let cols = header.trim().matches('|').count().saturating_sub(1).max(1);
    let mut sep = String::from("|");
    for _ in 0..cols {
        sep.push_str(" --- |");
    }
    sep
}

static RE_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)\s]*)(?:\s+[^)]*)?\)").expect("valid regex"));

const PLACEHOLDER_HOSTS: &[&str] = &[
    "example.com",
    "placeholder.com",
    "placehold.it",
    "dummyimage.com",
    "lorempixel.com",
    "picsum.photos",
];

fn is_remote_image(url: &str) -> bool {
    (url.starts_with("http://") || url.starts_with("https://"))
        && !PLACEHOLDER_HOSTS.iter().any(|host| url.contains(host))
}

fn filter_images(input: &str, region_images: &[String]) -> String {
    RE_IMAGE
        .replace_all(input, |caps: &Captures<'_>| {
            let url = caps[2].trim();
            if region_images.iter().any(|name| name == url) || is_remote_image(url) {
                return caps[0].to_string();
            }
            match caps[1].trim() {
                "" => String::new(),
                alt => format!("*{alt}*"),
            }
        })
        .into_owned()
}

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{trimmed}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_is_unwrapped() {
        assert_eq!(unwrap_fence("```markdown\n# Hi\nthere\n```"), "# Hi\nthere");
        assert_eq!(unwrap_fence("```\nplain\n```\n"), "plain");
        assert_eq!(unwrap_fence("# Hi\n```rust\nfn x() {}\n```"), "# Hi\n```rust\nfn x() {}\n```");
    }

    #[test]
    fn whitespace_rules() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
        assert_eq!(trim_trailing_whitespace("a  \n b\t"), "a\n b");
        assert_eq!(collapse_blank_lines("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(remove_invisible_chars("x\u{200B}y\u{FEFF}z"), "xyz");
    }

    #[test]
    fn heading_gets_blank_line() {
        assert_eq!(space_headings("text\n## H\nbody"), "text\n\n## H\nbody");
        assert_eq!(space_headings("# Top\n\n## Next"), "# Top\n\n## Next");
        assert_eq!(space_headings("#hashtag"), "#hashtag");
    }

    #[test]
    fn code_blocks_are_not_reformatted() {
        let input = "Install:\n\n```bash\npip install x\n# then run\nx --help\n```";
        assert_eq!(space_headings(input), input);

        let ascii = "```\n| A | B |\n| 1 | 2 |\n```";
        assert_eq!(repair_tables(ascii), ascii);
    }

    #[test]
    fn missing_table_separator_is_inserted() {
        let out = repair_tables("| A | B |\n| 1 | 2 |");
        assert_eq!(out, "| A | B |\n| --- | --- |\n| 1 | 2 |");
    }

    #[test]
    fn extra_table_separators_are_dropped() {
        let input = "| A | B |\n| --- | --- |\n| 1 | 2 |\n|---|---|\n| 3 | 4 |";
        assert_eq!(repair_tables(input), "| A | B |\n| --- | --- |\n| 1 | 2 |\n| 3 | 4 |");
    }

    #[test]
    fn well_formed_table_is_untouched() {
        let input = "intro\n\n| H |\n|:-:|\n| x |\n\nafter";
        assert_eq!(repair_tables(input), input);
    }

    #[test]
    fn announced_region_images_are_kept() {
        let known = vec!["page_2_0.png".to_string()];
        let out = filter_images("![](page_2_0.png)\n![Plot](page_2_9.png)\n![](fig.png)", &known);
        assert_eq!(out, "![](page_2_0.png)\n*Plot*\n");
    }

    #[test]
    fn remote_images_survive_unless_placeholder() {
        let out = filter_images(
            "![a](https://arxiv.org/f.png) ![b](https://example.com/x.png)",
            &[],
        );
        assert_eq!(out, "![a](https://arxiv.org/f.png) *b*");
    }

    #[test]
    fn clean_page_end_to_end() {
        let raw = "```markdown\r\n# Title\r\nText  \r\n\r\n\r\n\r\n## Part\r\n| A | B |\r\n| 1 | 2 |\r\n![](ghost.png)\r\n```";
        let out = clean_page(raw, &[]);
        assert_eq!(out, "# Title\nText\n\n## Part\n| A | B |\n| --- | --- |\n| 1 | 2 |\n");
    }

    #[test]
    fn empty_reply_becomes_single_newline() {
        assert_eq!(clean_page("   \n\n", &[]), "\n");
    }

    #[test]
    fn finish_document_collapses_page_joins() {
        assert_eq!(finish_document("a\n\n\n\nb\n\n"), "a\n\nb\n");
    }
}
