pub(crate) const PER_PAGE: u64 = 100;
pub(crate) const PAGE_RANGE_DISPLAYED: u64 = 5;
pub(crate) const SIMULATION_DAYS: u8 = 7;

pub(crate) const DEFAULT_BACKEND_URI: &str = "http://127.0.0.1:5000";
pub(crate) const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub(crate) const DEFAULT_PAGE_COUNT_WAIT_MS: u64 = 10_000;
pub(crate) const DEFAULT_RECONNECT_MIN_MS: u64 = 1_000;
pub(crate) const DEFAULT_RECONNECT_MAX_MS: u64 = 30_000;
pub(crate) const DEFAULT_DISTRIBUTION_RATIO: u32 = 2;

pub(crate) const SOCKET_IO_PATH: &str = "/socket.io/";

pub const CHANNEL_PLAYER_COUNT: &str = "playerCount";
pub const CHANNEL_SIMULATE: &str = "simulate";
pub const CHANNEL_CONNECT: &str = "connect";
pub const CHANNEL_CONNECT_ERROR: &str = "connect_error";
