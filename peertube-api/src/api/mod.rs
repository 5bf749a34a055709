pub mod oauth;
pub mod videos;

pub use oauth::OAuthApi;
pub use videos::{VideosApi, resolve_upload_location};
