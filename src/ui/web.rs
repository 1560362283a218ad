mod api;
mod response;

pub use api::{start, Config};
