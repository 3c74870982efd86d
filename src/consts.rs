/// Header name for the Flashbots-style request signature.
pub const FLASHBOTS_SIGNATURE_HEADER: &str = "X-Flashbots-Signature";

/// JSON-RPC method name for submitting bundles.
pub const ETH_SEND_BUNDLE_METHOD: &str = "eth_sendBundle";

/// JSON-RPC method name for simulating bundles.
pub const ETH_CALL_BUNDLE_METHOD: &str = "eth_callBundle";

/// JSON-RPC method name for querying submitter statistics.
pub const FLASHBOTS_GET_USER_STATS_METHOD: &str = "flashbots_getUserStats";

/// The default HTTP timeout for relay calls, in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 2;

/// The HTTP timeout for simulation calls, in seconds. Simulations execute the
/// bundle and are expected to be slower than a plain relay hop.
pub const SIMULATION_TIMEOUT_SECS: u64 = 5;

/// The bundle format version stamped on versioned bundles that omit it.
pub const DEFAULT_BUNDLE_VERSION: u32 = 2;

/// The number of PBKDF2 iterations used to derive key-scheme secret hashes.
pub const PBKDF2_ITERATIONS: u32 = 10_000;

/// The PBKDF2 output length in bytes (HMAC-SHA-512).
pub const PBKDF2_OUTPUT_LEN: usize = 64;
