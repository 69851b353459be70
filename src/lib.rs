//! AskFlash widget backend: API-key authenticated chat for storefront widgets,
//! per-store metering, and the script that embeds the widget.

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;
pub mod throttle;

pub mod models {
    pub mod analytics;
    pub mod chat;
    pub mod conversation;
    pub mod credential;
    pub mod product;
    pub mod store_context;
    pub mod subscription;
    pub mod widget_config;
}

pub mod repositories {
    pub mod analytics;
    pub mod conversation;
    pub mod credential;
    pub mod memory;
    pub mod store_context;
    pub mod subscription;
    pub mod widget_config;
}

pub mod services {
    pub mod analytics;
    pub mod api_key;
    pub mod chat;
    pub mod conversation;
    pub mod quota;
    pub mod responder;
    pub mod widget_script;
}

pub mod widget {
    pub mod client;
    pub mod identity;
    pub mod markup;
    pub mod page;
    pub mod render;
}

pub mod handlers {
    pub mod widget;
}

pub mod middleware_layer {
    pub mod api_key;
    pub mod rate_limit;
}

pub mod validation {
    pub mod json;
}
