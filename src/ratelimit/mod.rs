//! Rate limiting logic and state management.

mod clock;
mod gate;
mod identity;
mod limiter;
mod memory;
mod redis_store;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use gate::{GateDecision, RateLimitGate, Rejection, RATE_LIMIT_MESSAGE, TOO_MANY_REQUESTS};
pub use identity::{AuthenticatedIdentity, IdentityKey, IdentityResolver, RequestInfo};
pub use limiter::{AdmitResult, SlidingWindowLimiter};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::WindowStore;
