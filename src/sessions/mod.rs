pub mod pool;
pub mod proxy;

pub use pool::{SessionPool, SESSIONS_KEY, SESSION_COUNT};
pub use proxy::{format_proxy, Proxy};
