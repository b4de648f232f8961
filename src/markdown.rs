use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};

use crate::highlight::{HighlightedLine, Highlighter};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineStyle {
    pub strong: bool,
    pub emphasis: bool,
    pub strikethrough: bool,
    pub code: bool,
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inline {
    pub text: String,
    pub style: InlineStyle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: Option<String>,
    source: String,
    pub highlighted: Option<Vec<HighlightedLine>>,
}

impl CodeBlock {
    /// Literal code text placed on the clipboard by the block's copy control.
    pub fn clipboard_payload(&self) -> &str {
        &self.source
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<Vec<Inline>>,
    pub rows: Vec<Vec<Vec<Inline>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, content: Vec<Inline> },
    Paragraph { content: Vec<Inline>, quote_depth: usize },
    ListItem {
        depth: usize,
        marker: String,
        content: Vec<Inline>,
        quote_depth: usize,
    },
    Code(CodeBlock),
    Table(Table),
    Rule,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    pub fn code_blocks(&self) -> impl Iterator<Item = &CodeBlock> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Code(code) => Some(code),
            _ => None,
        })
    }
}

/// Turns answer markdown into a [`Document`]. Stateless apart from the highlighter theme.
#[derive(Debug, Clone, Default)]
pub struct MarkdownRenderer {
    highlighter: Highlighter,
}

impl MarkdownRenderer {
    pub fn new(highlighter: Highlighter) -> Self {
        MarkdownRenderer { highlighter }
    }

    pub fn render(&self, markdown: &str) -> Document {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_FOOTNOTES);

        let mut builder = Builder::new(&self.highlighter);
        for event in Parser::new_ext(markdown, options) {
            builder.event(event);
        }
        builder.finish()
    }
}

struct PendingCode {
    language: Option<String>,
    source: String,
}

struct PendingTable {
    header: Vec<Vec<Inline>>,
    rows: Vec<Vec<Vec<Inline>>>,
    row: Vec<Vec<Inline>>,
}

struct Builder<'h> {
    highlighter: &'h Highlighter,
    blocks: Vec<Block>,
    spans: Vec<Inline>,
    strong: usize,
    emphasis: usize,
    strikethrough: usize,
    link: Option<String>,
    heading: Option<u8>,
    quote_depth: usize,
    // next ordinal per open list, None for bullets
    lists: Vec<Option<u64>>,
    item_marker: Option<String>,
    // block-level html sits in `spans` until the next block opens
    raw_html: bool,
    code: Option<PendingCode>,
    table: Option<PendingTable>,
}

impl<'h> Builder<'h> {
    fn new(highlighter: &'h Highlighter) -> Self {
        Builder {
            highlighter,
            blocks: Vec::new(),
            spans: Vec::new(),
            strong: 0,
            emphasis: 0,
            strikethrough: 0,
            link: None,
            heading: None,
            quote_depth: 0,
            lists: Vec::new(),
            item_marker: None,
            raw_html: false,
            code: None,
            table: None,
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if let Some(code) = &mut self.code {
                    code.source.push_str(&text);
                } else {
                    self.push_text(&text, false);
                }
            }
            Event::Code(text) => self.push_text(&text, true),
            Event::Html(html) => {
                self.push_text(&html, false);
                self.raw_html = true;
            }
            Event::SoftBreak => self.push_text(" ", false),
            Event::HardBreak => self.push_text("\n", false),
            Event::Rule => {
                self.open_block();
                self.blocks.push(Block::Rule);
            }
            Event::FootnoteReference(label) => self.push_text(&format!("[{}]", &*label), false),
            Event::TaskListMarker(checked) => {
                self.push_text(if checked { "[x] " } else { "[ ] " }, false)
            }
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading(level, _, _) => {
                self.open_block();
                self.heading = Some(heading_level(level));
            }
            Tag::BlockQuote => {
                self.open_block();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                self.open_block();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .map(str::to_string),
                    CodeBlockKind::Indented => None,
                };
                self.code = Some(PendingCode {
                    language,
                    source: String::new(),
                });
            }
            Tag::List(start) => {
                // text of the enclosing item precedes the nested list
                self.open_block();
                self.lists.push(start);
            }
            Tag::Item => {
                let marker = match self.lists.last_mut() {
                    Some(Some(next)) => {
                        let marker = format!("{}.", next);
                        *next += 1;
                        marker
                    }
                    _ => "•".to_string(),
                };
                self.item_marker = Some(marker);
            }
            Tag::Table(_) => {
                self.open_block();
                self.table = Some(PendingTable {
                    header: Vec::new(),
                    rows: Vec::new(),
                    row: Vec::new(),
                });
            }
            Tag::TableCell => self.spans.clear(),
            Tag::Emphasis => self.emphasis += 1,
            Tag::Strong => self.strong += 1,
            Tag::Strikethrough => self.strikethrough += 1,
            Tag::Link(_, dest, _) | Tag::Image(_, dest, _) => self.link = Some(dest.to_string()),
            Tag::FootnoteDefinition(label) => {
                self.flush();
                self.push_text(&format!("[{}]: ", &*label), false);
            }
            Tag::Paragraph => {
                if self.raw_html {
                    self.flush();
                }
            }
            Tag::TableHead | Tag::TableRow => {}
        }
    }

    fn end(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph | Tag::FootnoteDefinition(_) => self.flush(),
            Tag::Heading(..) => {
                let content = std::mem::take(&mut self.spans);
                let level = self.heading.take().unwrap_or(1);
                self.blocks.push(Block::Heading { level, content });
            }
            Tag::BlockQuote => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            Tag::CodeBlock(_) => {
                if let Some(code) = self.code.take() {
                    let mut source = code.source;
                    if source.ends_with('\n') {
                        source.pop();
                    }
                    let highlighted = self
                        .highlighter
                        .highlight(&source, code.language.as_deref());
                    self.blocks.push(Block::Code(CodeBlock {
                        language: code.language,
                        source,
                        highlighted,
                    }));
                }
            }
            Tag::List(_) => {
                self.lists.pop();
            }
            Tag::Item => {
                self.flush();
                // an item with no text still shows its marker
                self.flush_marker();
            }
            Tag::TableCell => {
                let cell = std::mem::take(&mut self.spans);
                if let Some(table) = &mut self.table {
                    table.row.push(cell);
                }
            }
            Tag::TableHead => {
                if let Some(table) = &mut self.table {
                    table.header = std::mem::take(&mut table.row);
                }
            }
            Tag::TableRow => {
                if let Some(table) = &mut self.table {
                    let row = std::mem::take(&mut table.row);
                    table.rows.push(row);
                }
            }
            Tag::Table(_) => {
                if let Some(table) = self.table.take() {
                    self.blocks.push(Block::Table(Table {
                        header: table.header,
                        rows: table.rows,
                    }));
                }
            }
            Tag::Emphasis => self.emphasis = self.emphasis.saturating_sub(1),
            Tag::Strong => self.strong = self.strong.saturating_sub(1),
            Tag::Strikethrough => self.strikethrough = self.strikethrough.saturating_sub(1),
            Tag::Link(..) | Tag::Image(..) => self.link = None,
        }
    }

    fn push_text(&mut self, text: &str, code: bool) {
        let style = InlineStyle {
            strong: self.strong > 0,
            emphasis: self.emphasis > 0,
            strikethrough: self.strikethrough > 0,
            code,
            link: self.link.clone(),
        };
        // merge runs of identical style so soft breaks don't fragment paragraphs
        if let Some(last) = self.spans.last_mut() {
            if last.style == style {
                last.text.push_str(text);
                return;
            }
        }
        self.spans.push(Inline {
            text: text.to_string(),
            style,
        });
    }

    /// Closes pending inline content before a nested block. An item whose
    /// first child is a block gets its marker row ahead of that block.
    fn open_block(&mut self) {
        self.flush();
        self.flush_marker();
    }

    fn flush_marker(&mut self) {
        if self.lists.is_empty() {
            return;
        }
        if let Some(marker) = self.item_marker.take() {
            self.blocks.push(Block::ListItem {
                depth: self.lists.len(),
                marker,
                content: Vec::new(),
                quote_depth: self.quote_depth,
            });
        }
    }

    /// Emits the collected inline content as a paragraph or list item.
    fn flush(&mut self) {
        if self.spans.is_empty() || self.table.is_some() {
            return;
        }
        if std::mem::take(&mut self.raw_html) {
            if let Some(last) = self.spans.last_mut() {
                let trimmed = last.text.trim_end().len();
                last.text.truncate(trimmed);
            }
        }
        let content = std::mem::take(&mut self.spans);
        let block = if self.lists.is_empty() {
            Block::Paragraph {
                content,
                quote_depth: self.quote_depth,
            }
        } else {
            Block::ListItem {
                depth: self.lists.len(),
                // continuation paragraphs of an item carry no marker
                marker: self.item_marker.take().unwrap_or_default(),
                content,
                quote_depth: self.quote_depth,
            }
        };
        self.blocks.push(block);
    }

    fn finish(mut self) -> Document {
        self.flush();
        Document {
            blocks: self.blocks,
        }
    }
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

    fn render(markdown: &str) -> Document {
        MarkdownRenderer::default().render(markdown)
    }

    fn plain(content: &[Inline]) -> String {
        content.iter().map(|i| i.text.as_str()).collect()
    }

    #[test]
    fn test_fenced_code_block_has_language_and_payload() {
        let doc = render("```js\nconsole.log(1)\n```");
        let blocks: Vec<_> = doc.code_blocks().collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language.as_deref(), Some("js"));
        assert_eq!(blocks[0].clipboard_payload(), "console.log(1)");
        assert!(blocks[0].highlighted.is_some());
    }

    #[test]
    fn test_plain_text_has_no_code_blocks() {
        let doc = render("Just some words.\nOn two lines.");
        assert_eq!(doc.code_blocks().count(), 0);
        assert_eq!(doc.blocks.len(), 1);
        match &doc.blocks[0] {
            Block::Paragraph { content, quote_depth } => {
                assert_eq!(plain(content), "Just some words. On two lines.");
                assert_eq!(*quote_depth, 0);
            }
            other => panic!("expected paragraph, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_or_missing_language_is_not_highlighted() {
        let doc = render("```\nraw\n```\n\n```nonsense-lang extra\nmore\n```");
        let blocks: Vec<_> = doc.code_blocks().collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].language, None);
        assert!(blocks[0].highlighted.is_none());
        assert_eq!(blocks[1].language.as_deref(), Some("nonsense-lang"));
        assert!(blocks[1].highlighted.is_none());
        assert_eq!(blocks[1].clipboard_payload(), "more");
    }

    #[test]
    fn test_payload_keeps_inner_blank_lines() {
        let doc = render("```py\na = 1\n\nb = 2\n\n```");
        let code = doc.code_blocks().next().unwrap();
        assert_eq!(code.clipboard_payload(), "a = 1\n\nb = 2\n");
    }

    #[test]
    fn test_inline_code_and_emphasis() {
        let doc = render("Use `cargo` **now**, ~~not~~ later.");
        let Block::Paragraph { content, .. } = &doc.blocks[0] else {
            panic!("expected paragraph");
        };
        assert_eq!(doc.code_blocks().count(), 0);
        assert!(content.iter().any(|i| i.text == "cargo" && i.style.code));
        assert!(content.iter().any(|i| i.text == "now" && i.style.strong));
        assert!(content.iter().any(|i| i.text == "not" && i.style.strikethrough));
    }

    #[test]
    fn test_headings_and_lists() {
        let doc = render("## Steps\n\n1. first\n2. second\n   - nested\n\n---\n");
        assert!(matches!(&doc.blocks[0], Block::Heading { level: 2, content } if plain(content) == "Steps"));

        let items: Vec<(usize, &str, String)> = doc
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::ListItem { depth, marker, content, .. } => Some((*depth, marker.as_str(), plain(content))),
                _ => None,
            })
            .collect();
        assert_eq!(
            items,
            vec![
                (1, "1.", "first".to_string()),
                (1, "2.", "second".to_string()),
                (2, "•", "nested".to_string()),
            ]
        );
        assert_eq!(doc.blocks.last(), Some(&Block::Rule));
    }

    #[test]
    fn test_table() {
        let doc = render("| a | b |\n|---|---|\n| 1 | 2 |\n| 3 | 4 |\n");
        let Some(Block::Table(table)) = doc.blocks.first() else {
            panic!("expected table, got {:?}", doc.blocks);
        };
        let header: Vec<String> = table.header.iter().map(|c| plain(c)).collect();
        assert_eq!(header, vec!["a", "b"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(plain(&table.rows[1][0]), "3");
    }

    #[test]
    fn test_blockquote_depth() {
        let doc = render("> quoted\n\nafter");
        assert!(matches!(&doc.blocks[0], Block::Paragraph { quote_depth: 1, .. }));
        assert!(matches!(&doc.blocks[1], Block::Paragraph { quote_depth: 0, .. }));
    }

    fn paragraphs(doc: &Document) -> Vec<String> {
        doc.blocks
            .iter()
            .filter_map(|b| match b {
                Block::Paragraph { content, .. } => Some(plain(content)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_html_block_stays_separate_from_next_paragraph() {
        let doc = render("<div>x</div>\n\nhello world");
        assert_eq!(doc.blocks.len(), 2);
        assert_eq!(paragraphs(&doc), vec!["<div>x</div>", "hello world"]);
    }

    #[test]
    fn test_inline_html_stays_in_its_paragraph() {
        let doc = render("a <b>bold</b> c\n\nnext");
        assert_eq!(paragraphs(&doc), vec!["a <b>bold</b> c", "next"]);
    }

    #[test]
    fn test_code_block_as_first_child_of_item() {
        let doc = render("- ```sh\n  ls\n  ```\n- next");
        assert_eq!(doc.blocks.len(), 3);
        assert!(matches!(
            &doc.blocks[0],
            Block::ListItem { depth: 1, marker, content, .. } if marker == "•" && content.is_empty()
        ));
        let Block::Code(code) = &doc.blocks[1] else {
            panic!("expected code, got {:?}", doc.blocks[1]);
        };
        assert_eq!(code.language.as_deref(), Some("sh"));
        assert_eq!(code.clipboard_payload(), "ls");
        assert!(matches!(
            &doc.blocks[2],
            Block::ListItem { marker, content, .. } if marker == "•" && plain(content) == "next"
        ));
    }

    #[test]
    fn test_list_inside_blockquote_keeps_quote_depth() {
        let doc = render("> - quoted item\n\nafter");
        assert!(matches!(
            &doc.blocks[0],
            Block::ListItem { depth: 1, quote_depth: 1, content, .. } if plain(content) == "quoted item"
        ));
        assert!(matches!(&doc.blocks[1], Block::Paragraph { quote_depth: 0, .. }));

        let doc = render("- plain item");
        assert!(matches!(&doc.blocks[0], Block::ListItem { quote_depth: 0, .. }));
    }

    #[test]
    fn test_footnote_definition_is_its_own_paragraph() {
        let doc = render("Note[^1].\n\n[^1]: the source\n");
        assert_eq!(paragraphs(&doc), vec!["Note[1].", "[1]: the source"]);
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let source = "# Title\n\n```rust\nfn main() {}\n```\n";
        assert_eq!(render(source), render(source));
    }
}
