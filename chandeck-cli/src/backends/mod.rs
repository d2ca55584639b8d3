mod http;

pub use http::HttpFactory;
