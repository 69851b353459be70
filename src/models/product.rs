use garde::Validate;
use serde::{Deserialize, Serialize};

/// Product the visitor is looking at, attached to a single chat turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProductContext {
    #[garde(length(max = 128))]
    pub product_id: Option<String>,
    #[garde(length(max = 512))]
    pub product_title: Option<String>,
    #[garde(length(max = 8000))]
    pub product_description: Option<String>,
    #[garde(length(max = 64))]
    pub price: Option<String>,
    #[garde(length(max = 256))]
    pub vendor: Option<String>,
}

impl ProductContext {
    /// True when no field carries any text.
    pub fn is_empty(&self) -> bool {
        [
            &self.product_id,
            &self.product_title,
            &self.product_description,
            &self.price,
            &self.vendor,
        ]
        .iter()
        .all(|field| field.as_deref().is_none_or(|value| value.trim().is_empty()))
    }
}
