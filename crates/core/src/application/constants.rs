// Engine constants (No magic values)
use std::time::Duration;

/// Pause between the end of one poll cycle and the start of the next (2s)
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(2);

/// Ring buffer size of the change event bus
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Per streaming client queue size; overflow drops frames for that client only
pub const DEFAULT_SUBSCRIBER_QUEUE_CAPACITY: usize = 1024;
