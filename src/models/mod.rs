pub mod session;
pub mod theme;
pub mod token;
pub mod window;

pub use session::SessionRecord;
pub use theme::ThemeOptions;
pub use token::HarvestedToken;
pub use window::{PoolKind, WindowId, WorkerWindow};
