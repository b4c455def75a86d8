//! # Gatewayエンドポイント
//!
//! | メソッド | パス | 内容 |
//! |---------|------|------|
//! | POST | `/api/upload` | multipartのファイルをストレージへ転送しCIDを返す |
//! | GET | `/api/info` | エージェントとアップロード先スペースのDID |

pub mod info;
pub mod upload;

pub use info::handle_info;
pub use upload::handle_upload;

#[cfg(test)]
pub(crate) mod test_helpers;
