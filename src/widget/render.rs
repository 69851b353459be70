use std::fmt::Write;

use super::markup::{Block, Inline, ProductCard, CURRENCY};

/// Placeholder tile for cards without a usable image.
pub const IMAGE_PLACEHOLDER: &str = "🛍️";

/// Escapes text for HTML element content and quoted attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn inline_html(out: &mut String, inlines: &[Inline]) {
    for inline in inlines {
        match inline {
            Inline::Text(text) => out.push_str(&escape_html(text)),
            Inline::Bold(text) => {
                let _ = write!(out, "<strong>{}</strong>", escape_html(text));
            }
        }
    }
}

fn card_html(out: &mut String, card: &ProductCard) {
    let _ = write!(
        out,
        r#"<a class="flash-ai-product-card" href="{}" target="_blank" rel="noopener noreferrer">"#,
        escape_html(&card.url)
    );
    match &card.image_url {
        Some(src) => {
            let _ = write!(
                out,
                r#"<div class="flash-ai-product-image"><img src="{}" alt="{}" loading="lazy"></div>"#,
                escape_html(src),
                escape_html(&card.title)
            );
        }
        None => {
            let _ = write!(
                out,
                r#"<div class="flash-ai-product-image flash-ai-product-placeholder">{}</div>"#,
                IMAGE_PLACEHOLDER
            );
        }
    }
    let _ = write!(
        out,
        r#"<div class="flash-ai-product-info"><div class="flash-ai-product-title">{}</div><div class="flash-ai-product-price">{}{}</div>"#,
        escape_html(&card.title),
        CURRENCY,
        escape_html(&card.price)
    );
    if let Some(description) = &card.description {
        let _ = write!(
            out,
            r#"<div class="flash-ai-product-desc">{}</div>"#,
            escape_html(description)
        );
    }
    out.push_str("</div></a>");
}

/// Renders blocks as the HTML fragment placed inside an assistant bubble.
pub fn to_html(blocks: &[Block]) -> String {
    let mut out = String::new();
    for block in blocks {
        match block {
            Block::Line(inlines) => {
                out.push_str(r#"<div class="flash-ai-line">"#);
                inline_html(&mut out, inlines);
                out.push_str("</div>");
            }
            Block::Bullet(inlines) => {
                out.push_str(r#"<div class="flash-ai-bullet"><span class="flash-ai-bullet-dot">•</span><span>"#);
                inline_html(&mut out, inlines);
                out.push_str("</span></div>");
            }
            Block::Spacer => out.push_str(r#"<div class="flash-ai-spacer"></div>"#),
            Block::Carousel(cards) => {
                out.push_str(r#"<div class="flash-ai-carousel">"#);
                for card in cards {
                    card_html(&mut out, card);
                }
                out.push_str("</div>");
            }
        }
    }
    out
}

fn inline_text(inlines: &[Inline]) -> String {
    inlines
        .iter()
        .map(|inline| match inline {
            Inline::Text(text) | Inline::Bold(text) => text.as_str(),
        })
        .collect()
}

/// Renders blocks for a terminal.
pub fn to_plain_text(blocks: &[Block]) -> String {
    let mut lines: Vec<String> = Vec::new();
    for block in blocks {
        match block {
            Block::Line(inlines) => lines.push(inline_text(inlines)),
            Block::Bullet(inlines) => lines.push(format!("  • {}", inline_text(inlines))),
            Block::Spacer => lines.push(String::new()),
            Block::Carousel(cards) => {
                for (i, card) in cards.iter().enumerate() {
                    lines.push(format!(
                        "  [{}] {} · {}{} · {}",
                        i + 1,
                        card.title,
                        CURRENCY,
                        card.price,
                        card.url
                    ));
                    if let Some(description) = &card.description {
                        lines.push(format!("      {}", description));
                    }
                }
            }
        }
    }
    lines.join("\n")
}
