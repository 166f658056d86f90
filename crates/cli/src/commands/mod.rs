pub mod chat;
pub mod classify;
pub mod mcp;
pub mod onboard;
pub mod serve;
