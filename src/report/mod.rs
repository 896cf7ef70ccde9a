//! Brief rendering.

pub mod generator;
pub mod html;

pub use generator::{generate_json_brief, generate_markdown_brief, generate_text_brief};
pub use html::generate_html_brief;
