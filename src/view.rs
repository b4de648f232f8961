use std::collections::HashMap;

use iced::widget::text::Span;
use iced::widget::{
    button, column, container, horizontal_rule, horizontal_space, rich_text, row, scrollable,
    span, text, text_input, Column, Row, Space,
};
use iced::{alignment, font, Alignment, Border, Color, Element, Font, Length, Padding, Theme};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::conversation::{ConversationStore, Exchange, ExchangeKind};
use crate::highlight::HighlightedLine;
use crate::markdown::{Block, CodeBlock, Document, Inline, Table};
use crate::Message;

const SIDEBAR_PREVIEW_COLUMNS: usize = 26;
const BUBBLE_MAX_WIDTH: f32 = 760.0;

const LOADING_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const LOADING_MESSAGES: [&str; 4] = [
    "Waiting for the model...",
    "Composing an answer...",
    "Still thinking...",
    "Almost there...",
];

const MUTED: Color = Color { r: 0.55, g: 0.58, b: 0.68, a: 1.0 };
const ERROR: Color = Color { r: 0.97, g: 0.46, b: 0.56, a: 1.0 };
const LINK: Color = Color { r: 0.48, g: 0.64, b: 0.97, a: 1.0 };
const INLINE_CODE: Color = Color { r: 0.62, g: 0.81, b: 0.42, a: 1.0 };

pub fn input_id() -> text_input::Id {
    text_input::Id::new("composer")
}

pub fn edit_input_id() -> text_input::Id {
    text_input::Id::new("history-edit")
}

pub fn transcript_id() -> scrollable::Id {
    scrollable::Id::new("transcript")
}

/// First line of `prompt`, cut to `max_columns` terminal columns with an ellipsis.
pub fn preview(prompt: &str, max_columns: usize) -> String {
    let first = prompt.trim().lines().next().unwrap_or("");
    let multiline = prompt.trim().lines().nth(1).is_some();
    if !multiline && first.width() <= max_columns {
        return first.to_string();
    }

    let budget = max_columns.saturating_sub(1);
    let mut used = 0;
    let mut out = String::new();
    for ch in first.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(ch);
    }
    out.push('…');
    out
}

pub fn sidebar(store: &ConversationStore) -> Element<'_, Message> {
    let count = container(text(store.history().len().to_string()).size(12))
        .padding([2, 8])
        .style(container::rounded_box);

    let header = row![text("History").size(20), horizontal_space(), count]
        .align_y(Alignment::Center)
        .spacing(8);

    let body: Element<Message> = if store.history().is_empty() {
        container(text("No history yet. Start chatting!").size(14).color(MUTED))
            .width(Length::Fill)
            .align_x(alignment::Horizontal::Center)
            .padding(Padding::from([24, 0]))
            .into()
    } else {
        let editing = store.edit_session();
        let entries = store.history().iter().map(|entry| {
            let item: Element<Message> = match editing {
                Some(edit) if edit.id == entry.id => column![
                    text_input("", &edit.draft)
                        .on_input(Message::DraftChanged)
                        .on_submit(Message::SaveEdit)
                        .id(edit_input_id())
                        .size(14)
                        .padding(6),
                    row![
                        button(text("Save").size(12))
                            .on_press(Message::SaveEdit)
                            .style(button::success),
                        button(text("Cancel").size(12))
                            .on_press(Message::CancelEdit)
                            .style(button::secondary),
                    ]
                    .spacing(6),
                ]
                .spacing(6)
                .into(),
                _ => row![
                    text(preview(&entry.prompt, SIDEBAR_PREVIEW_COLUMNS))
                        .size(14)
                        .width(Length::Fill),
                    button(text("Edit").size(12))
                        .on_press(Message::StartEdit(entry.id))
                        .style(button::text),
                    button(text("Delete").size(12))
                        .on_press(Message::DeleteHistory(entry.id))
                        .style(button::danger),
                ]
                .spacing(4)
                .align_y(Alignment::Center)
                .into(),
            };
            container(item)
                .padding(8)
                .width(Length::Fill)
                .style(container::rounded_box)
                .into()
        });
        scrollable(Column::with_children(entries).spacing(6))
            .height(Length::Fill)
            .into()
    };

    column![header, body].spacing(16).into()
}

pub fn transcript<'a>(
    store: &'a ConversationStore,
    rendered: &'a HashMap<usize, Document>,
    loading_frame: usize,
) -> Element<'a, Message> {
    let mut items: Vec<Element<'a, Message>> = store
        .transcript()
        .iter()
        .enumerate()
        .map(|(index, exchange)| exchange_view(exchange, rendered.get(&index)))
        .collect();

    if let Some(prompt) = store.pending_prompt() {
        items.push(question_bubble(prompt));
        let frame = LOADING_FRAMES[loading_frame % LOADING_FRAMES.len()];
        let message = LOADING_MESSAGES[(loading_frame / 25) % LOADING_MESSAGES.len()];
        items.push(
            row![text(frame).size(20), text(message).size(14).color(MUTED)]
                .spacing(10)
                .align_y(Alignment::Center)
                .into(),
        );
    }

    scrollable(
        container(Column::with_children(items).spacing(18))
            .padding(20)
            .width(Length::Fill),
    )
    .id(transcript_id())
    .height(Length::Fill)
    .into()
}

pub fn composer(store: &ConversationStore) -> Element<'_, Message> {
    let input = text_input("Type your message here...", store.input())
        .on_input(Message::InputChanged)
        .on_submit(Message::Submit)
        .padding(12)
        .size(16)
        .id(input_id());

    let send = button(text("Send").size(16))
        .on_press_maybe(store.can_submit().then_some(Message::Submit))
        .padding([12, 20]);

    row![input, send]
        .spacing(8)
        .align_y(Alignment::Center)
        .padding(12)
        .into()
}

fn exchange_view<'a>(exchange: &'a Exchange, document: Option<&'a Document>) -> Element<'a, Message> {
    match exchange.kind() {
        ExchangeKind::Question => question_bubble(exchange.text()),
        ExchangeKind::Answer => {
            let body = match document {
                Some(document) => markdown(document),
                None => text(exchange.text()).size(15).into(),
            };
            let copy = button(text("Copy answer").size(12))
                .on_press(Message::Copy(exchange.text().to_string()))
                .style(button::text);

            container(column![body, row![horizontal_space(), copy]].spacing(8))
                .padding(14)
                .max_width(BUBBLE_MAX_WIDTH)
                .style(container::rounded_box)
                .into()
        }
        ExchangeKind::Error => container(text(format!("⚠ {}", exchange.text())).size(14).color(ERROR))
            .padding(12)
            .max_width(BUBBLE_MAX_WIDTH)
            .style(container::bordered_box)
            .into(),
    }
}

fn question_bubble(prompt: &str) -> Element<'_, Message> {
    let bubble = container(text(prompt).size(15))
        .padding(12)
        .max_width(BUBBLE_MAX_WIDTH)
        .style(|theme: &Theme| {
            let pair = theme.extended_palette().primary.strong;
            container::Style {
                text_color: Some(pair.text),
                background: Some(pair.color.into()),
                border: Border {
                    radius: 14.0.into(),
                    ..Border::default()
                },
                ..container::Style::default()
            }
        });

    row![horizontal_space(), bubble].into()
}

/// Lays out a rendered answer document.
pub fn markdown(document: &Document) -> Element<'_, Message> {
    Column::with_children(document.blocks.iter().map(block_view))
        .spacing(10)
        .into()
}

fn block_view(block: &Block) -> Element<'_, Message> {
    match block {
        Block::Heading { level, content } => {
            let size = 26u16.saturating_sub(u16::from(*level) * 2).max(15);
            rich_text(inline_spans(content, true))
                .size(size)
                .into()
        }
        Block::Paragraph {
            content,
            quote_depth: 0,
        } => rich_text(inline_spans(content, false)).size(15).into(),
        Block::Paragraph {
            content,
            quote_depth,
        } => row![
            text("▎".repeat(*quote_depth)).size(15).color(MUTED),
            rich_text(inline_spans(content, false)).size(15),
        ]
        .spacing(6)
        .into(),
        Block::ListItem {
            depth,
            marker,
            content,
            quote_depth,
        } => {
            let indent = (depth.saturating_sub(1) * 18) as f32;
            let mut item = Row::new();
            if *quote_depth > 0 {
                item = item.push(text("▎".repeat(*quote_depth)).size(15).color(MUTED));
                item = item.push(Space::with_width(Length::Fixed(6.0)));
            }
            item.push(Space::with_width(Length::Fixed(indent)))
                .push(text(marker.as_str()).size(15).width(Length::Fixed(24.0)))
                .push(rich_text(inline_spans(content, false)).size(15))
                .into()
        }
        Block::Code(code) => code_block(code),
        Block::Table(table) => table_view(table),
        Block::Rule => horizontal_rule(1).into(),
    }
}

fn inline_spans(content: &[Inline], heading: bool) -> Vec<Span<'_, Message, Font>> {
    content
        .iter()
        .map(|inline| {
            let style = &inline.style;
            let bold = heading || style.strong;
            let base = if style.code { Font::MONOSPACE } else { Font::DEFAULT };
            let font = Font {
                weight: if bold { font::Weight::Bold } else { font::Weight::Normal },
                style: if style.emphasis { font::Style::Italic } else { font::Style::Normal },
                ..base
            };

            let color = if style.link.is_some() {
                Some(LINK)
            } else if style.code {
                Some(INLINE_CODE)
            } else if style.strikethrough {
                Some(MUTED)
            } else {
                None
            };

            let mut fragment = span(inline.text.as_str()).font(font);
            if let Some(color) = color {
                fragment = fragment.color(color);
            }
            // clicking a link copies its target
            if let Some(link) = &style.link {
                fragment = fragment.link(Message::Copy(link.clone()));
            }
            fragment
        })
        .collect()
}

fn code_block(code: &CodeBlock) -> Element<'_, Message> {
    let header = row![
        text(code.language.as_deref().unwrap_or("text")).size(12).color(MUTED),
        horizontal_space(),
        button(text("Copy").size(12))
            .on_press(Message::Copy(code.clipboard_payload().to_string()))
            .padding([2, 10])
            .style(button::secondary),
    ]
    .align_y(Alignment::Center);

    let body: Element<Message> = match &code.highlighted {
        Some(lines) => Column::with_children(lines.iter().map(highlighted_line)).into(),
        None => text(code.clipboard_payload())
            .font(Font::MONOSPACE)
            .size(14)
            .into(),
    };

    container(column![header, body].spacing(8))
        .padding(12)
        .width(Length::Fill)
        .style(container::bordered_box)
        .into()
}

fn highlighted_line(line: &HighlightedLine) -> Element<'_, Message> {
    if line.is_empty() {
        return text(" ").font(Font::MONOSPACE).size(14).into();
    }

    let spans: Vec<Span<'_, Message, Font>> = line
        .iter()
        .map(|fragment| {
            let [r, g, b] = fragment.rgb;
            span(fragment.text.as_str())
                .color(Color::from_rgb8(r, g, b))
                .font(Font {
                    weight: if fragment.bold { font::Weight::Bold } else { font::Weight::Normal },
                    style: if fragment.italic { font::Style::Italic } else { font::Style::Normal },
                    ..Font::MONOSPACE
                })
        })
        .collect();

    rich_text(spans).size(14).into()
}

fn table_view(table: &Table) -> Element<'_, Message> {
    fn table_row<'a>(cells: &'a [Vec<Inline>], header: bool) -> Element<'a, Message> {
        Row::with_children(cells.iter().map(|cell| {
            container(rich_text(inline_spans(cell, header)).size(14))
                .width(Length::FillPortion(1))
                .padding(4)
                .into()
        }))
        .spacing(8)
        .into()
    }

    let mut rows = vec![table_row(&table.header, true), horizontal_rule(1).into()];
    rows.extend(table.rows.iter().map(|cells| table_row(cells, false)));

    container(Column::with_children(rows).spacing(2))
        .padding(8)
        .width(Length::Fill)
        .style(container::bordered_box)
        .into()
}
