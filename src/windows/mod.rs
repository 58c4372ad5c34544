pub mod companion;
pub mod host;
pub mod intercept;
pub mod registry;

pub use companion::CompanionWindows;
pub use host::{WindowHost, WindowRole, WindowSpec};
pub use intercept::{
    InterceptDecision, InterceptedRequest, InterceptedResponse, Interceptor, UploadPart,
};
pub use registry::WindowRegistry;
