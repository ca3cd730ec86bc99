pub mod config;
pub mod logging;

pub mod clock;
pub mod discovery;
pub mod fetcher;
pub mod http;
pub mod retry;
pub mod scheduler;
pub mod storage;
