//! Rate limiting: fixed-window limiters and the daily quota.

mod limiter;
mod memory;
mod quota;
mod store;

pub use limiter::{BackendMode, RateLimitError, RateLimiter};
pub use memory::MemoryCounterStore;
pub use quota::{DailyQuota, DailyQuotaResult};
pub use store::{ConsumeOutcome, CounterSnapshot, CounterStore, StoreError};
