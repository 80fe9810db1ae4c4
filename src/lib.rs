pub mod configuration;
pub mod dispatcher;
pub mod mailer;
pub mod rate_limiter;
pub mod render;
pub mod storage;
pub mod types;
pub mod unsubscribe;
