pub mod api;
pub mod dispatch;
pub mod payload;
pub mod response;
pub mod transport;
pub mod vapid;

pub use api::{create_app, AppConfig};
