// Domain-layer modules and shared errors/models
pub mod enrichment {
    pub use crate::enrichment::*;
}

pub mod valuation {
    pub use crate::valuation::*;
}

pub mod valuation_service {
    pub use crate::valuation_service::*;
}

pub mod models {
    pub use crate::models::*;
    pub use crate::valuation_models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
