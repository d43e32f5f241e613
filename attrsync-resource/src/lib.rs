pub mod client;
pub mod framework;
pub mod rpc;
pub mod schema;
