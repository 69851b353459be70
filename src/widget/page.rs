//! What the widget reads from the host page: product details and where to
//! put the inline widget.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::product::ProductContext;

/// Path fragments that mark a product page.
const PRODUCT_PATH_MARKERS: [&str; 2] = ["/products/", "/product/"];
/// Button wording that marks a purchase control.
const PURCHASE_VOCABULARY: [&str; 7] = [
    "add to cart",
    "add to bag",
    "buy now",
    "buy",
    "purchase",
    "checkout",
    "check out",
];
/// Scraped descriptions are cut to this many characters.
const MAX_DESCRIPTION_CHARS: usize = 2_000;

const TITLE_SELECTORS: [&str; 4] = [".product__title", ".product-single__title", ".product-title", "h1"];
const PRICE_SELECTORS: [&str; 4] = [".price__regular .price-item", ".product__price", "[data-product-price]", ".price"];
const DESCRIPTION_SELECTORS: [&str; 3] = [".product__description", ".product-single__description", "[data-product-description]"];
const VENDOR_SELECTORS: [&str; 2] = [".product__vendor", ".product-vendor"];
const PRODUCT_ID_SELECTORS: [&str; 2] = ["[data-product-id]", "input[name=\"product-id\"]"];

/// One element of the host page, as far as placement cares.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageElement {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// `action` of a form.
    #[serde(default)]
    pub action: Option<String>,
    /// `type` of an input.
    #[serde(default)]
    pub input_type: Option<String>,
    /// `value` of an input.
    #[serde(default)]
    pub value: Option<String>,
    /// Visible text.
    #[serde(default)]
    pub text: String,
}

/// A read-only view of the host page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    /// Parsed `application/ld+json` blocks.
    #[serde(default)]
    pub structured_data: Vec<Value>,
    /// `<meta>` contents keyed by `property` or `name`.
    #[serde(default)]
    pub meta: HashMap<String, String>,
    /// Text (or the relevant attribute) of the first match of a CSS selector.
    #[serde(default)]
    pub selectors: HashMap<String, String>,
    /// Elements in document order.
    #[serde(default)]
    pub elements: Vec<PageElement>,
}

impl PageSnapshot {
    /// Whether the URL looks like a product page.
    pub fn is_product_page(&self) -> bool {
        let path = self.url.to_ascii_lowercase();
        PRODUCT_PATH_MARKERS.iter().any(|marker| path.contains(*marker))
    }

    fn meta(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| non_blank(self.meta.get(*key).map(String::as_str)))
    }

    fn selector(&self, selectors: &[&str]) -> Option<String> {
        selectors
            .iter()
            .find_map(|selector| non_blank(self.selectors.get(*selector).map(String::as_str)))
    }

    fn structured_product(&self) -> Option<&Value> {
        self.structured_data.iter().find_map(find_product_node)
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|v| !v.is_empty())
}

fn is_product_type(node: &Value) -> bool {
    match node.get("@type") {
        Some(Value::String(kind)) => kind == "Product",
        Some(Value::Array(kinds)) => kinds.iter().any(|k| k.as_str() == Some("Product")),
        _ => false,
    }
}

fn find_product_node(node: &Value) -> Option<&Value> {
    match node {
        Value::Array(items) => items.iter().find_map(find_product_node),
        Value::Object(map) => {
            if is_product_type(node) {
                return Some(node);
            }
            map.get("@graph").and_then(find_product_node)
        }
        _ => None,
    }
}

fn scalar(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => non_blank(Some(s.as_str())),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Product fields from a schema.org `Product` node.
fn from_structured(node: &Value) -> ProductContext {
    let offer = match node.get("offers") {
        Some(Value::Array(offers)) => offers.first(),
        other => other,
    };
    let vendor = match node.get("brand") {
        Some(brand @ Value::Object(_)) => scalar(brand.get("name")),
        other => scalar(other),
    };

    ProductContext {
        product_id: scalar(node.get("productID"))
            .or_else(|| scalar(node.get("sku")))
            .or_else(|| scalar(node.get("@id"))),
        product_title: scalar(node.get("name")),
        product_description: scalar(node.get("description")),
        price: offer.and_then(|offer| scalar(offer.get("price"))),
        vendor,
    }
}

fn truncate_chars(value: String, max: usize) -> String {
    if value.chars().count() <= max {
        value
    } else {
        value.chars().take(max).collect()
    }
}

/// Scrapes the product the visitor is looking at.
///
/// Each field falls back from structured data to meta tags to selector
/// heuristics. Returns `None` off product pages or when nothing was found.
pub fn extract_product_context(page: &PageSnapshot) -> Option<ProductContext> {
    if !page.is_product_page() {
        return None;
    }

    let structured = page.structured_product().map(from_structured).unwrap_or_default();

    let context = ProductContext {
        product_id: structured
            .product_id
            .or_else(|| page.meta(&["product:retailer_item_id"]))
            .or_else(|| page.selector(&PRODUCT_ID_SELECTORS)),
        product_title: structured
            .product_title
            .or_else(|| page.meta(&["og:title", "twitter:title"]))
            .or_else(|| page.selector(&TITLE_SELECTORS)),
        product_description: structured
            .product_description
            .or_else(|| page.meta(&["og:description", "description"]))
            .or_else(|| page.selector(&DESCRIPTION_SELECTORS))
            .map(|d| truncate_chars(d, MAX_DESCRIPTION_CHARS)),
        price: structured
            .price
            .or_else(|| page.meta(&["product:price:amount", "og:price:amount"]))
            .or_else(|| page.selector(&PRICE_SELECTORS)),
        vendor: structured
            .vendor
            .or_else(|| page.meta(&["product:brand", "og:brand"]))
            .or_else(|| page.selector(&VENDOR_SELECTORS)),
    };

    (!context.is_empty()).then_some(context)
}

fn normalized(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn is_cart_form(element: &PageElement) -> bool {
    element.tag.eq_ignore_ascii_case("form")
        && element
            .action
            .as_deref()
            .is_some_and(|action| action.to_ascii_lowercase().contains("/cart/add"))
}

fn is_purchase_control(element: &PageElement) -> bool {
    let label = if element.tag.eq_ignore_ascii_case("button") {
        normalized(&element.text)
    } else if element.tag.eq_ignore_ascii_case("input")
        && element
            .input_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("submit") || t.eq_ignore_ascii_case("button"))
    {
        normalized(element.value.as_deref().unwrap_or(&element.text))
    } else {
        return false;
    };

    let words: Vec<&str> = label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let joined = words.join(" ");
    PURCHASE_VOCABULARY.iter().any(|phrase| {
        if phrase.contains(' ') {
            joined.contains(*phrase)
        } else {
            words.contains(phrase)
        }
    })
}

fn is_product_container(element: &PageElement) -> bool {
    element
        .classes
        .iter()
        .any(|class| class.to_ascii_lowercase().contains("product"))
}

fn is_main_region(element: &PageElement) -> bool {
    element.tag.eq_ignore_ascii_case("main")
        || element.role.as_deref().is_some_and(|r| r.eq_ignore_ascii_case("main"))
        || element.id.as_deref() == Some("MainContent")
}

/// Index of the element the inline widget goes after.
///
/// Tries, in order: a cart-add form, a purchase button, a container with a
/// "product" class, the main content region. The first match of the first
/// rule that matches anything wins.
pub fn find_inline_anchor(page: &PageSnapshot) -> Option<usize> {
    let rules: [fn(&PageElement) -> bool; 4] = [
        is_cart_form,
        is_purchase_control,
        is_product_container,
        is_main_region,
    ];
    rules
        .iter()
        .find_map(|rule| page.elements.iter().position(|element| rule(element)))
}

/// Where the widget shows up on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// The floating launcher is always present.
    pub floating: bool,
    /// Anchor of the inline widget, only looked for on product pages.
    pub inline_anchor: Option<usize>,
}

/// Decides how the widget is placed on `page`.
pub fn plan_placement(page: &PageSnapshot) -> Placement {
    Placement {
        floating: true,
        inline_anchor: if page.is_product_page() {
            find_inline_anchor(page)
        } else {
            None
        },
    }
}
