//! Table-of-contents generation.

use pulldown_cmark_escape::escape_html;
use serde::{Deserialize, Serialize};

/// A heading extracted from a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// Heading level, 1 to 6.
    pub level: u8,
    /// Plain text of the heading.
    pub text: String,
    /// Anchor id assigned to the heading.
    pub id: String,
}

/// Check whether heading text asks for an inline table of contents.
pub fn is_toc_heading(text: &str) -> bool {
    let normalized = text.trim().to_lowercase().replace('-', " ");
    matches!(
        normalized.as_str(),
        "table of contents" | "table of content" | "contents" | "content" | "toc"
    )
}

/// List flavour for [`toc_html`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TocStyle {
    /// `<ul>` without classes, inserted below a "Table of Contents" heading.
    Inline,
    /// Classed `<ol>` prepended to the whole document.
    Document,
}

/// Render headings as a nested list of anchor links.
///
/// Deeper headings nest inside the preceding shallower one. A heading that
/// lands between two open levels (an `h2` after `h1`, `h3`) joins the deeper
/// list rather than closing it. Returns an empty string when `headings` is
/// empty.
pub fn toc_html(headings: &[Heading], style: TocStyle) -> String {
    let mut out = String::new();
    let mut open: Vec<u8> = Vec::new();

    for heading in headings {
        match open.last().copied() {
            None => {
                open_list(&mut out, style, 1);
                open.push(heading.level);
            }
            Some(top) if heading.level > top => {
                open_list(&mut out, style, open.len() + 1);
                open.push(heading.level);
            }
            Some(_) => {
                while open.len() > 1 && heading.level <= open[open.len() - 2] {
                    out.push_str("</li>");
                    close_list(&mut out, style);
                    open.pop();
                }
                out.push_str("</li>");
                if let Some(top) = open.last_mut() {
                    *top = (*top).min(heading.level);
                }
            }
        }
        push_item(&mut out, style, heading);
    }

    while open.pop().is_some() {
        out.push_str("</li>");
        close_list(&mut out, style);
    }
    out
}

fn open_list(out: &mut String, style: TocStyle, depth: usize) {
    match style {
        TocStyle::Inline => out.push_str("<ul>"),
        TocStyle::Document => {
            out.push_str(&format!("<ol class=\"toc toc-level toc-level-{depth}\">"));
        }
    }
}

fn close_list(out: &mut String, style: TocStyle) {
    match style {
        TocStyle::Inline => out.push_str("</ul>"),
        TocStyle::Document => out.push_str("</ol>"),
    }
}

fn push_item(out: &mut String, style: TocStyle, heading: &Heading) {
    let mut href = String::with_capacity(heading.id.len());
    let mut text = String::with_capacity(heading.text.len());
    // Writing into a String cannot fail. The anchor is escaped as plain
    // attribute text so it matches the heading's `id` byte for byte.
    let _ = escape_html(&mut href, &heading.id);
    let _ = escape_html(&mut text, &heading.text);
    match style {
        TocStyle::Inline => {
            out.push_str(&format!("<li><a href=\"#{href}\">{text}</a>"));
        }
        TocStyle::Document => {
            let level = heading.level;
            out.push_str(&format!(
                "<li class=\"toc-item toc-item-h{level}\">\
                 <a class=\"toc-link toc-link-h{level}\" href=\"#{href}\">{text}</a>"
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(level: u8, text: &str) -> Heading {
        Heading {
            level,
            text: text.to_string(),
            id: text.to_lowercase(),
        }
    }

    #[test]
    fn test_is_toc_heading() {
        assert!(is_toc_heading("Table of Contents"));
        assert!(is_toc_heading("table-of-contents"));
        assert!(is_toc_heading("TOC"));
        assert!(!is_toc_heading("Contents of the box"));
    }

    #[test]
    fn test_flat_list() {
        let html = toc_html(&[h(2, "a"), h(2, "b")], TocStyle::Inline);
        assert_eq!(
            html,
            "<ul><li><a href=\"#a\">a</a></li><li><a href=\"#b\">b</a></li></ul>"
        );
    }

    #[test]
    fn test_nested_list() {
        let html = toc_html(&[h(1, "a"), h(2, "b"), h(3, "c"), h(1, "d")], TocStyle::Inline);
        assert_eq!(
            html,
            "<ul><li><a href=\"#a\">a</a>\
             <ul><li><a href=\"#b\">b</a>\
             <ul><li><a href=\"#c\">c</a></li></ul></li></ul></li>\
             <li><a href=\"#d\">d</a></li></ul>"
        );
    }

    #[test]
    fn test_skipped_level_nests_under_parent() {
        let html = toc_html(&[h(1, "a"), h(3, "c"), h(2, "b")], TocStyle::Inline);
        assert_eq!(
            html,
            "<ul><li><a href=\"#a\">a</a>\
             <ul><li><a href=\"#c\">c</a></li>\
             <li><a href=\"#b\">b</a></li></ul></li></ul>"
        );
    }

    #[test]
    fn test_skipped_level_then_deeper_again() {
        let html = toc_html(
            &[h(1, "a"), h(3, "c"), h(2, "b"), h(3, "d"), h(1, "e")],
            TocStyle::Document,
        );
        // `d` nests under `b`, `e` returns to the top list.
        assert_eq!(html.matches("<ol").count(), 3);
        assert_eq!(html.matches("</ol>").count(), 3);
        let b = html.find("#b").unwrap();
        let d = html.find("#d").unwrap();
        let e = html.find("#e").unwrap();
        assert!(html[b..d].contains("toc-level-3"));
        assert!(html[d..e].ends_with("</li></ol></li></ol></li><li class=\"toc-item toc-item-h1\"><a class=\"toc-link toc-link-h1\" href=\""));
    }

    #[test]
    fn test_document_style_classes() {
        let html = toc_html(&[h(1, "a"), h(2, "b")], TocStyle::Document);
        assert!(html.starts_with("<ol class=\"toc toc-level toc-level-1\">"));
        assert!(html.contains("toc-level-2"));
        assert!(html.contains("toc-link toc-link-h2"));
    }

    #[test]
    fn test_unicode_anchor_matches_id() {
        let html = toc_html(&[h(2, "Café")], TocStyle::Inline);
        assert!(html.contains("href=\"#café\""));
    }

    #[test]
    fn test_empty_and_escaping() {
        assert_eq!(toc_html(&[], TocStyle::Document), "");
        let html = toc_html(&[h(1, "<b>&")], TocStyle::Inline);
        assert!(html.contains("&lt;b&gt;&amp;"));
    }
}
