pub mod arena;
pub mod cache;
pub mod clock;
pub mod codec;
pub mod hash;
pub mod overrides;
pub mod server;
pub mod txmap;
pub mod upstream;

pub use cache::{AnswerCache, CacheStats, CachedAnswer};
pub use overrides::{OverrideDecision, OverrideTable};
pub use server::{RelayContext, RelayServer, RelayStats, StatsSnapshot, TaskQueue};
pub use txmap::{Completion, RegisterError, TransactionMap};
pub use upstream::UpstreamPool;
