//! Reply markup understood by the widget.
//!
//! Assistant replies are plain text with two layers of markup:
//!
//! * product tokens, `[PRODUCT: title | ₹price | image | url? | description?]`,
//!   which become cards. Every card of a reply is gathered into a single
//!   carousel placed where the first token stood. Later tokens are removed.
//! * a markdown-lite line grammar for the rest: `**bold**` / `__bold__`,
//!   bullet lines starting with `• `, `- ` or `* `, lone glyph lines that
//!   prefix the next line, and blank-line runs that collapse into one spacer.
//!
//! Parsing runs in two passes. [`lex_products`] splits each line into text
//! and cards. [`parse_reply`] then lays the lines out as [`Block`]s.

/// Opening of a product token.
const PRODUCT_OPEN: &str = "[PRODUCT:";
/// Currency sign shown in front of prices.
pub const CURRENCY: &str = "₹";
/// Path prefix of derived product links.
const PRODUCT_PATH: &str = "/products/";
/// Link used when a title yields an empty slug.
const FALLBACK_PRODUCT_URL: &str = "/collections/all";
/// Longest line still considered a lone glyph.
const MAX_GLYPH_CHARS: usize = 4;

/// A product recommendation lifted out of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductCard {
    pub title: String,
    /// Price without the currency sign.
    pub price: String,
    /// `None` when the token carried no usable image; rendered as a placeholder.
    pub image_url: Option<String>,
    /// Given link, or one derived from the title.
    pub url: String,
    pub description: Option<String>,
}

/// A run of inline text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Bold(String),
}

/// One rendered row of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Line(Vec<Inline>),
    Bullet(Vec<Inline>),
    Spacer,
    Carousel(Vec<ProductCard>),
}

/// One source line after product tokens were taken out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexedLine {
    /// Text pieces of the line, in order, with tokens removed.
    pub pieces: Vec<String>,
    /// Cards found on the line, with the piece index each one followed.
    pub cards: Vec<(usize, ProductCard)>,
}

impl LexedLine {
    fn text(&self) -> String {
        self.pieces.concat()
    }
}

/// Turns a title into a URL slug: lowercase ASCII letters and digits, runs
/// of whitespace become one hyphen, no leading, trailing or doubled hyphens.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if (c.is_whitespace() || c == '-') && !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Link derived from a product title.
pub fn product_url_for(title: &str) -> String {
    let slug = slugify(title);
    if slug.is_empty() {
        FALLBACK_PRODUCT_URL.to_string()
    } else {
        format!("{}{}", PRODUCT_PATH, slug)
    }
}

/// Whether a URL may be used as an `src`/`href` as-is.
fn is_usable_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://") || url.starts_with('/')
}

/// Parses the body of a product token (the text between `[PRODUCT:` and `]`).
///
/// Needs three to five `|`-separated fields with a title and a price.
pub fn parse_product_fields(body: &str) -> Option<ProductCard> {
    let fields: Vec<&str> = body.split('|').map(str::trim).collect();
    if !(3..=5).contains(&fields.len()) {
        return None;
    }

    let title = fields[0];
    let price = fields[1].strip_prefix(CURRENCY).unwrap_or(fields[1]).trim();
    if title.is_empty() || price.is_empty() {
        return None;
    }

    let image_url = Some(fields[2]).filter(|url| is_usable_url(url));
    let url = fields
        .get(3)
        .copied()
        .filter(|url| is_usable_url(url))
        .map(str::to_string)
        .unwrap_or_else(|| product_url_for(title));
    let description = fields
        .get(4)
        .copied()
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    Some(ProductCard {
        title: title.to_string(),
        price: price.to_string(),
        image_url: image_url.map(str::to_string),
        url,
        description,
    })
}

/// Splits one line into text pieces and product cards.
///
/// A token ends at the first `]`. Tokens without a closing bracket, or whose
/// fields do not parse, stay in the text unchanged.
pub fn lex_products(line: &str) -> LexedLine {
    let mut lexed = LexedLine {
        pieces: Vec::new(),
        cards: Vec::new(),
    };
    let mut text = String::new();
    let mut rest = line;

    while let Some(start) = rest.find(PRODUCT_OPEN) {
        let after_open = &rest[start + PRODUCT_OPEN.len()..];
        let card = after_open
            .find(']')
            .filter(|&end| !after_open[..end].contains(PRODUCT_OPEN))
            .and_then(|end| parse_product_fields(&after_open[..end]).map(|card| (end, card)));

        match card {
            Some((end, card)) => {
                text.push_str(&rest[..start]);
                lexed.pieces.push(std::mem::take(&mut text));
                lexed.cards.push((lexed.pieces.len(), card));
                rest = &after_open[end + 1..];
            }
            None => {
                text.push_str(&rest[..start + 1]);
                rest = &rest[start + 1..];
            }
        }
    }

    text.push_str(rest);
    lexed.pieces.push(text);
    lexed
}

/// Splits a line into plain and bold runs.
///
/// `**x**` and `__x__` are bold when the closing delimiter is on the same
/// line and the content is not blank. Unmatched delimiters stay literal.
pub fn parse_inline(line: &str) -> Vec<Inline> {
    let mut out: Vec<Inline> = Vec::new();
    let mut plain = String::new();
    let mut rest = line;

    loop {
        let next = [rest.find("**"), rest.find("__")]
            .into_iter()
            .flatten()
            .min();
        let Some(open) = next else {
            plain.push_str(rest);
            break;
        };

        let delimiter = &rest[open..open + 2];
        let inner = &rest[open + 2..];
        match inner.find(delimiter) {
            Some(close) if !inner[..close].trim().is_empty() => {
                plain.push_str(&rest[..open]);
                if !plain.is_empty() {
                    out.push(Inline::Text(std::mem::take(&mut plain)));
                }
                out.push(Inline::Bold(inner[..close].to_string()));
                rest = &inner[close + 2..];
            }
            _ => {
                plain.push_str(&rest[..open + 2]);
                rest = inner;
            }
        }
    }

    if !plain.is_empty() {
        out.push(Inline::Text(plain));
    }
    out
}

/// A line made of nothing but a bullet or an emoji, e.g. `•` or `✨`.
fn is_glyph_line(line: &str) -> bool {
    let count = line.chars().count();
    count > 0
        && count <= MAX_GLYPH_CHARS
        && !line.chars().any(char::is_alphanumeric)
        && (line == "-" || line == "*" || !line.is_ascii())
}

fn bullet_body(line: &str) -> Option<&str> {
    ["• ", "- ", "* "]
        .into_iter()
        .find_map(|marker| line.strip_prefix(marker))
}

/// Intermediate row: a text line or the carousel slot.
enum Row {
    Text(String),
    Blank,
    Carousel,
}

/// Lays out a reply as blocks.
pub fn parse_reply(reply: &str) -> Vec<Block> {
    let mut rows: Vec<Row> = Vec::new();
    let mut cards: Vec<ProductCard> = Vec::new();

    for raw in reply.split('\n') {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        let lexed = lex_products(raw);

        if lexed.cards.is_empty() {
            push_text_row(&mut rows, raw);
            continue;
        }

        if cards.is_empty() {
            let first_at = lexed.cards[0].0;
            let before = lexed.pieces[..first_at].concat();
            let after = lexed.pieces[first_at..].concat();
            if !before.trim().is_empty() {
                rows.push(Row::Text(before));
            }
            rows.push(Row::Carousel);
            if !after.trim().is_empty() {
                rows.push(Row::Text(after));
            }
        } else {
            let text = lexed.text();
            if !text.trim().is_empty() {
                rows.push(Row::Text(text));
            }
        }
        cards.extend(lexed.cards.into_iter().map(|(_, card)| card));
    }

    layout(rows, cards)
}

fn push_text_row(rows: &mut Vec<Row>, line: &str) {
    if line.trim().is_empty() {
        rows.push(Row::Blank);
    } else {
        rows.push(Row::Text(line.to_string()));
    }
}

fn layout(rows: Vec<Row>, mut cards: Vec<ProductCard>) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut pending_glyph: Option<String> = None;

    for row in rows {
        let text = match row {
            Row::Carousel => {
                flush_glyph(&mut blocks, &mut pending_glyph);
                blocks.push(Block::Carousel(std::mem::take(&mut cards)));
                continue;
            }
            Row::Blank => {
                flush_glyph(&mut blocks, &mut pending_glyph);
                if !matches!(blocks.last(), None | Some(Block::Spacer)) {
                    blocks.push(Block::Spacer);
                }
                continue;
            }
            Row::Text(text) => text,
        };

        let trimmed = text.trim();
        if is_glyph_line(trimmed) && pending_glyph.is_none() {
            pending_glyph = Some(trimmed.to_string());
            continue;
        }

        let line = match pending_glyph.take() {
            Some(glyph) => format!("{} {}", glyph, trimmed),
            None => trimmed.to_string(),
        };
        blocks.push(line_block(&line));
    }

    flush_glyph(&mut blocks, &mut pending_glyph);
    while matches!(blocks.last(), Some(Block::Spacer)) {
        blocks.pop();
    }
    blocks
}

fn flush_glyph(blocks: &mut Vec<Block>, pending: &mut Option<String>) {
    if let Some(glyph) = pending.take() {
        blocks.push(Block::Line(vec![Inline::Text(glyph)]));
    }
}

fn line_block(line: &str) -> Block {
    match bullet_body(line) {
        Some(body) => Block::Bullet(parse_inline(body.trim())),
        None => Block::Line(parse_inline(line)),
    }
}

/// Cards of a reply in source order.
pub fn cards(blocks: &[Block]) -> impl Iterator<Item = &ProductCard> {
    const NO_CARDS: &[ProductCard] = &[];
    blocks.iter().flat_map(|block| match block {
        Block::Carousel(cards) => cards.as_slice(),
        _ => NO_CARDS,
    })
}
