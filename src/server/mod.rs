//! HTTP front end for the thumbnail cache.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │      GET /thumbnail{,/path,/url,/markup}   DELETE /cache        │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │         handlers         │  │           routes            │  │
//! │  │ (query parsing, errors)  │  │ (router config, CORS, fs)   │  │
//! │  └──────────────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    clear_cache_handler, confine_source, health_handler, markup_handler, path_handler,
    thumbnail_handler, url_handler, AppState, ErrorResponse, HealthResponse, PathResponse,
    ThumbnailQueryParams, UrlResponse,
};
pub use routes::{create_router, RouterConfig};
