//! HTTP transport: middleware stack, server lifecycle, and response sinks.

pub mod middleware;
pub mod module;
pub mod sink;

pub use middleware::*;
pub use module::*;
pub use sink::*;
