/// Protocol version string for libp2p identify
pub const PROTOCOL_VERSION: &str = "/strand/1.0.0";

/// Application name
pub const APP_NAME: &str = "Strand";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Ed25519 secret key size in bytes
pub const SECRET_KEY_SIZE: usize = 32;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// HMAC key used to turn a BIP-39 seed into an Ed25519 secret.
/// Changing it changes every thread id ever derived.
pub const IDENTITY_HMAC_KEY: &[u8] = b"scythian horde";

/// Entropy drawn for a freshly generated thread phrase (24 words).
pub const PHRASE_ENTROPY_BITS: usize = 256;

/// Maximum pub/sub message size in bytes (announcements are tiny)
pub const MAX_MESSAGE_SIZE: usize = 65_536;

/// Maximum size of a single stored block (50 MiB)
pub const MAX_BLOCK_SIZE: usize = 50 * 1024 * 1024;

/// GossipSub heartbeat interval in seconds
pub const GOSSIPSUB_HEARTBEAT_SECS: u64 = 1;

/// Default QUIC listen port
pub const DEFAULT_QUIC_PORT: u16 = 4001;

/// Default local gateway port
pub const DEFAULT_GATEWAY_PORT: u16 = 9999;

/// Bound on any single remote fetch or pin
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// How often every thread's latest local head is re-announced
pub const DEFAULT_REPUBLISH_INTERVAL_SECS: u64 = 60;

/// Lifetime of an unused gateway token
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 300;

/// Capacity of each update notification queue; overflow is dropped.
pub const NOTIFY_QUEUE_CAPACITY: usize = 64;

/// Name of the thread created on first start
pub const DEFAULT_THREAD_NAME: &str = "default";

/// Prefix marking a relayed announcement
pub const RELAY_PREFIX: &str = "relay:";

/// Key derivation context (BLAKE3) for thread content keys
pub const KDF_CONTEXT_THREAD_KEY: &str = "strand-thread-content-key-v1";
