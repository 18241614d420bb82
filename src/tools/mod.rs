pub mod catalog;
pub mod dispatch;

pub use catalog::{catalog as tool_catalog, TOOL_NAMES};
pub use dispatch::ToolDispatcher;
