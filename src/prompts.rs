//! Prompts sent to the vision model.
//!
//! Prompt wording is configuration data; the pipeline only relies on two
//! contracts: region image names are announced in the page prompt, and the
//! heading prompt asks for the revised outline inside a fenced block.

/// Default prompt for converting a whole page image to Markdown.
pub const PAGE_PROMPT: &str = r#"You are an expert document converter. Convert the PDF page image to clean, well-structured Markdown.

1. Preserve ALL text in human reading order.
2. Use # for headings, with depth matching the visual hierarchy.
3. Convert tables to GFM pipe tables; use HTML tables only when pipes cannot express them.
4. Render formulas with LaTeX: $inline$ and $$display$$.
5. Ignore page numbers, running headers and footers.
6. Output ONLY the Markdown, without ```markdown fences or commentary."#;

/// Extra instructions when figure/table regions were cropped from the page.
///
/// `{regions}` is replaced with one `![](name)` line per region, top to bottom.
pub const REGION_SUFFIX: &str = r#"

7. The page contains the following figure or table regions, listed top to bottom:
{regions}
   Insert each reference above exactly once, at the place where the region appears on the page.
   Do not transcribe text that lies inside a region; the image replaces it.
   Never invent image references that are not listed."#;

/// Outline correction request. `{outline}` is replaced with the heading lines.
pub const HEADING_PROMPT: &str = r#"Below is the heading outline of a document, one Markdown heading per line. Page-by-page recognition may have given some headings the wrong depth.

Fix the depth (number of #) so that:
- headings with the same numbering style (e.g. "1.", "2.", or "Chapter 1", "Chapter 2") are siblings at the same depth;
- numeric sub-prefixes nest under their parent (e.g. "2.1" one level below "2");
- headings that are clearly not part of the document structure are removed.

Keep the heading text exactly as given. Return the corrected outline inside a single ```markdown fenced block and nothing else.

{outline}"#;

/// Page prompt for the given configuration.
pub fn page_prompt(custom: Option<&str>, region_names: &[String]) -> String {
    let mut prompt = custom.unwrap_or(PAGE_PROMPT).to_string();
    if !region_names.is_empty() {
        let list = region_names
            .iter()
            .map(|name| format!("   ![]({name})"))
            .collect::<Vec<_>>()
            .join("\n");
        prompt.push_str(&REGION_SUFFIX.replace("{regions}", &list));
    }
    prompt
}

pub fn heading_prompt(outline: &str) -> String {
    HEADING_PROMPT.replace("{outline}", outline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_prompt_without_regions_is_base_prompt() {
        assert_eq!(page_prompt(None, &[]), PAGE_PROMPT);
        assert_eq!(page_prompt(Some("custom"), &[]), "custom");
    }

    #[test]
    fn page_prompt_lists_regions_in_order() {
        let names = vec!["p1_0.png".to_string(), "p1_1.png".to_string()];
        let prompt = page_prompt(None, &names);
        let first = prompt.find("![](p1_0.png)").unwrap();
        let second = prompt.find("![](p1_1.png)").unwrap();
        assert!(first < second);
        assert!(!prompt.contains("{regions}"));
    }

    #[test]
    fn heading_prompt_embeds_outline() {
        let p = heading_prompt("# A\n## B");
        assert!(p.ends_with("# A\n## B"));
        assert!(p.contains("```markdown"));
    }
}
