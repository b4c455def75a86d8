//! # アップロードエンドポイント

mod handler;
pub mod staging;

pub use handler::handle_upload;

#[cfg(test)]
mod tests;
