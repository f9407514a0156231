mod methods;
mod server;
mod types;

pub use server::{run_http_server, run_stdio_server};
