mod cursor;
mod error;
mod message;
mod parse;
mod session;
mod skip;
mod tool_call;

pub use cursor::CursorPayload;
pub use error::{Error, Result};
pub use message::{Message, Role};
pub use parse::{Diagnostics, ParseResult, ParsedSession};
pub use session::{FileProvenance, RelationshipType, Session};
pub use skip::SkipEntry;
pub use tool_call::{ToolCall, ToolCategory};
