//! Twine story HTML tooling.
//!
//! Reads a published story into a [`Document`](crate::document::Document),
//! writes a localized story back out, and produces or checks the dictionary
//! payload the overlay consumes.
/// Dictionary audit
mod audit;
/// Story HTML parsing
mod parse;
/// Story rendering and dictionary extraction
mod render;

pub use audit::{
    AuditReport,
    Finding,
    audit,
};
pub use parse::{
    Passage,
    Story,
    StoryError,
    parse_story,
};
pub use render::{
    extract_dictionary,
    parse_name_filters,
    render_story,
};
