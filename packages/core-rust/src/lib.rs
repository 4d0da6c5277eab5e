//! Switchyard Core — route trie, HTTP error taxonomy, and log filter rules.

pub mod error_registry;
pub mod log_filter;
pub mod route_table;

pub use error_registry::{
    DuplicateErrorType, ErrorBodyMode, ErrorRegistry, ErrorSelector, ErrorType, HttpError,
};
pub use log_filter::{LogFilterResolver, LogFilterRule, LogLevel};
pub use route_table::{MethodBox, RouteBuilder, RouteMatch, RouteMethod, RouteTable};
