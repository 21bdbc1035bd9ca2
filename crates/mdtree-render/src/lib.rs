//! Markdown to HTML transform for mdtree.
//!
//! Rendering is delegated to `pulldown-cmark` with GitHub-flavoured
//! extensions. On top of that this crate assigns stable anchor ids to every
//! heading and augments the output with tables of contents.
//!
//! # Example
//!
//! ```rust
//! use mdtree_render::{render, RenderOptions, Renderer};
//!
//! let html = render("# Hello\n\n| a | b |\n|---|---|\n| 1 | 2 |\n");
//! assert!(html.contains("<h1 id=\"hello\">Hello</h1>"));
//!
//! let plain = Renderer::new(RenderOptions {
//!     document_toc: false,
//!     ..RenderOptions::default()
//! });
//! assert!(plain.render("# Hello").starts_with("<h1"));
//! ```

mod renderer;
mod slug;
mod toc;

pub use renderer::{RenderOptions, RenderOptionsBuilder, RenderedDocument, Renderer, render};
pub use slug::{SlugRegistry, slugify};
pub use toc::{Heading, TocStyle, is_toc_heading, toc_html};
