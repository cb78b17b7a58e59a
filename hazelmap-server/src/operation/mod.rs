//! Map operations: execution, interception, entry processing and statistics.

mod entry_processor;
mod executor;
mod future;
mod interceptor;
mod stats;

pub use entry_processor::{EntryProcessor, EntryProcessorResult, MapEntry};
pub use executor::OperationExecutor;
pub use future::MapFuture;
pub use interceptor::{InterceptorChain, MapInterceptor};
pub use stats::LocalMapStats;
