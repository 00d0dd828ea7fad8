// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    build_client, effective_config, format_check_result, load_page, parse_url_line,
    scan_document,
};
