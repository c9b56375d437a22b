mod paths;
mod runtime;

pub use paths::{AppPaths, AppPathsError};
pub use runtime::RuntimeMode;
