use std::time::Duration;

/// Max request ids in one owner decision.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Max participation requests (any status) stored for one event.
pub const MAX_REQUESTS_PER_EVENT: usize = 100_000;

/// How often the compactor checks the WAL append counter.
pub const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Upper bound of group-commit channel backlog.
pub const WAL_CHANNEL_CAPACITY: usize = 4096;
