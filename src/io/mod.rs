mod http_client;
pub mod paths;
mod reqwest_client;

pub use http_client::{fetch_content, fetch_last_modified, HttpClient, HttpResponse};
pub use reqwest_client::ReqwestHttpClient;
