pub mod distributed;
pub mod keys;
pub mod memo;

pub use distributed::{CacheLookup, DistributedCache};
pub use keys::Namespace;
pub use memo::{MemoTier, Memoizer};
