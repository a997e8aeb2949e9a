// Thin namespace wrapper for API-layer components
pub mod handlers {
    pub use crate::handlers::*;
}

pub mod rate_limit {
    pub use crate::rate_limit::*;
}

pub mod sanitize {
    pub use crate::sanitize::*;
}
