pub mod crawler;
pub mod dispatcher;
pub mod memory;

pub use crawler::{PageFetcher, SessionPageFetcher};
pub use dispatcher::{DispatchLimits, Dispatcher};
pub use memory::{MemoryProbe, SystemMemoryProbe};
