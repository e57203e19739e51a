// Model Context Protocol front end

pub mod server;
pub mod tools;

pub use server::McpServer;
