//! Core value types shared across the gateway.

mod address;

pub use address::{
    base58_to_contract_hex, base58_to_hex, contract_hash_to_b64, contract_hex_to_base58,
    contract_hex_to_number, hex_to_base58, hex_to_contract_hex, le_bytes_to_number, Address,
    AddressError, ADDRESS_SIZE, ADDRESS_VERSION, BASE58_LEN, HEX_LEN,
};

/// Milliseconds since the Unix epoch
pub type Timestamp = i64;

/// Current wall-clock time in milliseconds
#[must_use]
pub fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}
