/// Application constants

// Fee-delegated transaction type tags
pub const TX_TYPE_FD_VALUE_TRANSFER: u8 = 0x09;
pub const TX_TYPE_FD_VALUE_TRANSFER_WITH_RATIO: u8 = 0x0a;
pub const TX_TYPE_FD_VALUE_TRANSFER_MEMO: u8 = 0x11;
pub const TX_TYPE_FD_SMART_CONTRACT_DEPLOY: u8 = 0x29;
pub const TX_TYPE_FD_SMART_CONTRACT_EXECUTION: u8 = 0x31;

// Signature V offset (V = 27 + parity + 2 * chain_id)
pub const SIGNATURE_V_BASE: u64 = 27;
pub const COMPACT_SIGNATURE_LEN: usize = 65;
// Largest chain id whose V still fits in a u64
pub const MAX_CHAIN_ID: u64 = (u64::MAX - SIGNATURE_V_BASE - 1) / 2;

// Chain defaults
pub const DEFAULT_CHAIN_ID: u64 = 1001; // Kairos testnet
pub const NATIVE_DECIMALS: u32 = 18;

// Fee payer exposure ceilings
pub const DEFAULT_MAX_GAS_LIMIT: u64 = 500_000;
pub const DEFAULT_MAX_VALUE: &str = "0.1"; // native units
pub const MAX_FEE_RATIO: u8 = 99;

// Receipt polling
pub const DEFAULT_RECEIPT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_RECEIPT_POLL_INTERVAL_MS: u64 = 2_000;
pub const RPC_REQUEST_TIMEOUT_SECS: u64 = 30;

// How long a prepared transaction holds its nonce without a signature
pub const DEFAULT_PREPARED_TX_TTL_SECS: u64 = 120;

// Deploy code format (EVM)
pub const CODE_FORMAT_EVM: u8 = 0x00;

// API version
pub const API_VERSION: &str = "v1";
