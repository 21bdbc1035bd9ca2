//! Markdown to HTML rendering.

use derive_builder::Builder;
use pulldown_cmark::{CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd, html};
use serde::{Deserialize, Serialize};

use crate::slug::SlugRegistry;
use crate::toc::{Heading, TocStyle, is_toc_heading, toc_html};

/// Options controlling the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
pub struct RenderOptions {
    /// Enable tables, strikethrough, task lists and footnotes.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub gfm: bool,

    /// Insert a list of following headings below a "Table of Contents" heading.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub inline_toc: bool,

    /// Prepend a table of contents for the whole document.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub document_toc: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            gfm: true,
            inline_toc: true,
            document_toc: true,
        }
    }
}

impl RenderOptions {
    /// Create a new options builder.
    pub fn builder() -> RenderOptionsBuilder {
        RenderOptionsBuilder::default()
    }

    fn parser_options(&self) -> Options {
        let mut options = Options::ENABLE_HEADING_ATTRIBUTES;
        if self.gfm {
            options |= Options::ENABLE_TABLES
                | Options::ENABLE_STRIKETHROUGH
                | Options::ENABLE_TASKLISTS
                | Options::ENABLE_FOOTNOTES;
        }
        options
    }
}

/// Output of rendering one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    /// Rendered HTML.
    pub html: String,
    /// Headings in document order, with their assigned ids.
    pub headings: Vec<Heading>,
}

/// Markdown renderer.
///
/// Rendering is pure: the same input and options always give the same HTML.
#[derive(Debug, Clone, Copy, Default)]
pub struct Renderer {
    options: RenderOptions,
}

impl Renderer {
    /// Create a renderer with the given options.
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    /// Options in use.
    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Render Markdown text to HTML.
    pub fn render(&self, markdown: &str) -> String {
        self.render_document(markdown).html
    }

    /// Render Markdown text and return the heading outline alongside the HTML.
    pub fn render_document(&self, markdown: &str) -> RenderedDocument {
        let mut events: Vec<Event<'_>> =
            Parser::new_ext(markdown, self.options.parser_options()).collect();
        let headings = assign_heading_ids(&mut events);

        if self.options.inline_toc {
            insert_inline_toc(&mut events, &headings);
        }

        let mut body = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut body, events.into_iter());

        let html = if self.options.document_toc && !headings.is_empty() {
            let mut out = toc_html(&headings, TocStyle::Document);
            out.push_str(&body);
            out
        } else {
            body
        };

        RenderedDocument { html, headings }
    }
}

/// Render Markdown with default options.
pub fn render(markdown: &str) -> String {
    Renderer::default().render(markdown)
}

/// Give every heading an id and collect the outline.
///
/// Explicit `{#id}` attributes are kept and reserved first so generated ids
/// never shadow them.
fn assign_heading_ids(events: &mut [Event<'_>]) -> Vec<Heading> {
    let mut registry = SlugRegistry::new();
    for event in events.iter() {
        if let Event::Start(Tag::Heading { id: Some(id), .. }) = event {
            registry.reserve(id);
        }
    }

    let mut headings = Vec::new();
    let mut open: Option<(usize, String)> = None;

    for index in 0..events.len() {
        match &events[index] {
            Event::Start(Tag::Heading { .. }) => open = Some((index, String::new())),
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, buf)) = open.as_mut() {
                    buf.push_str(text);
                }
            }
            Event::End(TagEnd::Heading(level)) => {
                let level = *level;
                if let Some((start, text)) = open.take() {
                    if let Event::Start(Tag::Heading { id, .. }) = &mut events[start] {
                        let assigned = match id {
                            Some(existing) => existing.to_string(),
                            None => {
                                let generated = registry.unique(&text);
                                *id = Some(CowStr::from(generated.clone()));
                                generated
                            }
                        };
                        headings.push(Heading {
                            level: heading_level(level),
                            text: text.trim().to_string(),
                            id: assigned,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    headings
}

/// Insert a list of the following headings right after the first
/// "Table of Contents" heading, if there is one.
fn insert_inline_toc(events: &mut Vec<Event<'_>>, headings: &[Heading]) {
    let Some(position) = headings.iter().position(|h| is_toc_heading(&h.text)) else {
        return;
    };
    let following = &headings[position + 1..];
    if following.is_empty() {
        return;
    }

    let Some(end_index) = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, Event::End(TagEnd::Heading(_))))
        .nth(position)
        .map(|(i, _)| i)
    else {
        return;
    };

    let list = toc_html(following, TocStyle::Inline);
    events.insert(end_index + 1, Event::Html(CowStr::from(list)));
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare() -> Renderer {
        Renderer::new(RenderOptions {
            document_toc: false,
            inline_toc: false,
            ..RenderOptions::default()
        })
    }

    #[test]
    fn test_heading_ids() {
        let html = bare().render("# Hello World\n\n## Hello World\n");
        assert!(html.contains("<h1 id=\"hello-world\">Hello World</h1>"));
        assert!(html.contains("<h2 id=\"hello-world-1\">Hello World</h2>"));
    }

    #[test]
    fn test_explicit_id_kept() {
        let doc = bare().render_document("# Intro {#start}\n\n# Start\n");
        assert_eq!(doc.headings[0].id, "start");
        assert_eq!(doc.headings[1].id, "start-1");
        assert!(doc.html.contains("id=\"start\""));
    }

    #[test]
    fn test_heading_text_includes_code() {
        let doc = bare().render_document("## The `render` call\n");
        assert_eq!(doc.headings[0].text, "The render call");
        assert_eq!(doc.headings[0].id, "the-render-call");
    }

    #[test]
    fn test_tables() {
        let html = bare().render("| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>1</td>"));
    }

    #[test]
    fn test_gfm_can_be_disabled() {
        let renderer = Renderer::new(RenderOptions {
            gfm: false,
            ..RenderOptions::default()
        });
        assert!(!renderer.render("| a |\n|---|\n| 1 |\n").contains("<table>"));
    }

    #[test]
    fn test_inline_toc() {
        let renderer = Renderer::new(RenderOptions {
            document_toc: false,
            ..RenderOptions::default()
        });
        let html = renderer.render("# Guide\n\n## Table of Contents\n\n## Install\n\n## Use\n");
        let toc_end = html.find("</h2>").unwrap();
        let list = html.find("<ul><li><a href=\"#install\">Install</a>").unwrap();
        assert!(list > toc_end);
        assert!(html.contains("<a href=\"#use\">Use</a>"));
        assert!(!html.contains("<a href=\"#guide\">"));
    }

    #[test]
    fn test_document_toc_prepended() {
        let html = render("# A\n\ntext\n\n## B\n");
        assert!(html.starts_with("<ol class=\"toc toc-level toc-level-1\">"));
        assert!(html.contains("href=\"#b\""));
        assert!(html.contains("<h1 id=\"a\">A</h1>"));
    }

    #[test]
    fn test_no_headings_no_toc() {
        assert_eq!(render("just text\n"), "<p>just text</p>\n");
        assert_eq!(render(""), "");
    }

    #[test]
    fn test_deterministic() {
        let input = "# A\n\n## A\n\n| x |\n|---|\n| y |\n\n## Table of Contents\n\n### C\n";
        assert_eq!(render(input), render(input));
    }
}
