pub mod http;

pub use http::HttpLlmClient;
