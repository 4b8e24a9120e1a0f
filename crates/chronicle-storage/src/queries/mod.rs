pub mod message;
pub mod session;
pub mod skip;
pub mod tool_call;
