//! Source tree node and document types.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Name given to the root directory of every tree.
pub const ROOT_NAME: &str = "root";

/// Body used for documents above the size threshold.
pub const TOO_LARGE_MESSAGE: &str = "File too large to process";

/// Body used for documents that could not be read.
pub const READ_ERROR_MESSAGE: &str = "Error reading file";

/// A single ingested Markdown document.
///
/// Serialized field names follow the existing client contract, so
/// `raw_content` travels as `content` and `rendered_content` as `htmlContent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// File name without the document extension.
    pub slug: CompactString,

    /// Slug with separator characters replaced by spaces.
    pub title: String,

    /// Original document text.
    #[serde(rename = "content")]
    pub raw_content: String,

    /// Rendered HTML body.
    #[serde(rename = "htmlContent")]
    pub rendered_content: String,
}

impl Document {
    /// Create a document from its parts, deriving the title from the slug.
    pub fn new(
        slug: impl Into<CompactString>,
        raw_content: impl Into<String>,
        rendered_content: impl Into<String>,
    ) -> Self {
        let slug = slug.into();
        Self {
            title: title_from_slug(&slug),
            slug,
            raw_content: raw_content.into(),
            rendered_content: rendered_content.into(),
        }
    }

    /// Placeholder for a document whose size exceeds the configured limit.
    pub fn too_large(slug: impl Into<CompactString>) -> Self {
        Self::placeholder(slug, TOO_LARGE_MESSAGE)
    }

    /// Placeholder for a document that could not be read or rendered.
    pub fn read_error(slug: impl Into<CompactString>) -> Self {
        Self::placeholder(slug, READ_ERROR_MESSAGE)
    }

    fn placeholder(slug: impl Into<CompactString>, message: &str) -> Self {
        Self::new(slug, message, format!("<p>{message}</p>"))
    }

    /// Check whether this document is one of the placeholder bodies.
    pub fn is_placeholder(&self) -> bool {
        self.raw_content == TOO_LARGE_MESSAGE || self.raw_content == READ_ERROR_MESSAGE
    }
}

/// Derive a display title from a slug: `getting-started_v2` -> `getting started v2`.
pub fn title_from_slug(slug: &str) -> String {
    slug.replace(['-', '_'], " ")
}

/// A node in the source tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceNode {
    /// A directory and its children, in filesystem enumeration order.
    Directory {
        /// Directory name (not full path).
        name: CompactString,
        /// Child nodes.
        children: Vec<SourceNode>,
    },
    /// A Markdown document.
    File {
        /// The ingested document.
        #[serde(rename = "content")]
        document: Document,
    },
}

impl SourceNode {
    /// Create an empty directory node.
    pub fn directory(name: impl Into<CompactString>) -> Self {
        Self::Directory {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Create the empty root directory node.
    pub fn root() -> Self {
        Self::directory(ROOT_NAME)
    }

    /// Create a file node.
    pub fn file(document: Document) -> Self {
        Self::File { document }
    }

    /// Check if this node is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory { .. })
    }

    /// Check if this node is a file.
    pub fn is_file(&self) -> bool {
        matches!(self, Self::File { .. })
    }

    /// Directory name, or the document slug for files.
    pub fn name(&self) -> &str {
        match self {
            Self::Directory { name, .. } => name,
            Self::File { document } => &document.slug,
        }
    }

    /// Children of a directory; empty for files.
    pub fn children(&self) -> &[SourceNode] {
        match self {
            Self::Directory { children, .. } => children,
            Self::File { .. } => &[],
        }
    }

    /// The document of a file node.
    pub fn document(&self) -> Option<&Document> {
        match self {
            Self::File { document } => Some(document),
            Self::Directory { .. } => None,
        }
    }

    /// Append a child to a directory node. Ignored for files.
    pub fn push(&mut self, child: SourceNode) {
        if let Self::Directory { children, .. } = self {
            children.push(child);
        }
    }

    /// Get the number of direct children.
    pub fn child_count(&self) -> usize {
        self.children().len()
    }

    /// Find a direct child by name.
    pub fn child(&self, name: &str) -> Option<&SourceNode> {
        self.children().iter().find(|c| c.name() == name)
    }

    /// Total number of documents in this subtree.
    pub fn document_count(&self) -> usize {
        match self {
            Self::File { .. } => 1,
            Self::Directory { children, .. } => children.iter().map(Self::document_count).sum(),
        }
    }

    /// Total number of directories below this node (not counting itself).
    pub fn directory_count(&self) -> usize {
        self.children()
            .iter()
            .filter(|c| c.is_dir())
            .map(|c| 1 + c.directory_count())
            .sum()
    }

    /// Iterate over every document in this subtree, depth first.
    pub fn documents(&self) -> Box<dyn Iterator<Item = &Document> + '_> {
        match self {
            Self::File { document } => Box::new(std::iter::once(document)),
            Self::Directory { children, .. } => {
                Box::new(children.iter().flat_map(|c| c.documents()))
            }
        }
    }
}
