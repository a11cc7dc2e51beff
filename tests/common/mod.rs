#![allow(dead_code)]

mod multipart;
mod test_server;

pub use multipart::{MultipartBody, zip_bytes};
pub use test_server::{TestResponse, TestServer};
