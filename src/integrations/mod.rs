//! External service integrations.

pub mod sources {
    pub use crate::registry_sources::*;
    pub use crate::sources::*;
    pub use crate::web_sources::*;
}

pub mod llm_client {
    pub use crate::llm_client::*;
}
