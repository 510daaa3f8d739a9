pub mod config;
pub mod errors;
pub mod http;
pub mod identity;
pub mod logging;
pub mod pipeline;
pub mod services;
pub mod store;
pub mod tender;
pub mod util;
