/// What the assistant knows about a store's catalog and policies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreContext {
    pub store_name: String,
    /// Newest active products first.
    pub products: Vec<CatalogProduct>,
    /// Collection titles.
    pub collections: Vec<String>,
    pub policies: Vec<PolicyPage>,
}

/// One active product of the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogProduct {
    pub title: String,
    pub price: Option<String>,
    pub short_description: Option<String>,
}

/// A policy page (terms, privacy, shipping, returns or refund).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyPage {
    pub page_type: String,
    pub title: String,
    /// Page body, possibly HTML.
    pub content: String,
}

