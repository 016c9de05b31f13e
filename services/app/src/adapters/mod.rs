pub mod http;
pub mod store;

pub use http::HttpApi;
pub use store::{FileCardStore, FileTokenStore};
