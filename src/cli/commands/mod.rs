//! CLI command implementations.

mod merge;
mod preview;
mod scrape;
mod validate;

pub use merge::cmd_merge;
pub use preview::cmd_preview;
pub use scrape::cmd_scrape;
pub use validate::cmd_validate;
