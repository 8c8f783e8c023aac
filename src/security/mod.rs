pub mod mask;
pub mod rate_limit;
pub mod signature;
pub mod suspicion;

pub use rate_limit::RateLimiter;
pub use signature::TransferSigner;
pub use suspicion::SuspicionPolicy;
