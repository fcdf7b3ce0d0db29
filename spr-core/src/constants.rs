use std::time::Duration;

/// Taproot NUMS point (BIP-341), handy as a placeholder key in tests.
pub const NUMS: &str = "50929b74c1a04954b78b4b6035e97a5e078a5a0f28ec96d547bfee9ace803ac0";

/// Capacity of the work queue between the oracle producer and the scan workers.
pub const WORK_QUEUE_CAPACITY: usize = 50;

/// Number of parallel scan workers per running scan.
pub const SCAN_WORKERS: usize = 10;

/// How often the watch loop polls the oracle tip.
pub const WATCH_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// The filter scanner persists wallet state at least this often.
pub const SAVE_INTERVAL: Duration = Duration::from_secs(30);
