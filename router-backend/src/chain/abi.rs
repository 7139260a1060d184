//! Ledger contract ABI helpers
//!
//! Manual ABI encoding for the handful of ledger calls the router makes,
//! without the abigen! macro.

use ethers::abi::{AbiDecode, Token};
use ethers::types::{Address, U256};
use ethers::utils::keccak256;

/// `getBalance(address) returns (uint256)`
pub const GET_BALANCE_SIGNATURE: &str = "getBalance(address)";

/// `depositFund()` payable, credits msg.value to the sender's account
pub const DEPOSIT_FUND_SIGNATURE: &str = "depositFund()";

/// `acknowledgeProviderSigner(address)`
pub const ACKNOWLEDGE_SIGNATURE: &str = "acknowledgeProviderSigner(address)";

/// First four bytes of keccak256 of a function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn encode_with_address(signature: &str, address: Address) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&ethers::abi::encode(&[Token::Address(address)]));
    data
}

/// Encode a getBalance(owner) call
pub fn encode_get_balance(owner: Address) -> Vec<u8> {
    encode_with_address(GET_BALANCE_SIGNATURE, owner)
}

/// Encode a depositFund() call (amount travels as tx value)
pub fn encode_deposit_fund() -> Vec<u8> {
    selector(DEPOSIT_FUND_SIGNATURE).to_vec()
}

/// Encode an acknowledgeProviderSigner(provider) call
pub fn encode_acknowledge(provider: Address) -> Vec<u8> {
    encode_with_address(ACKNOWLEDGE_SIGNATURE, provider)
}

/// Decode a single uint256 return value
pub fn decode_uint(data: &[u8]) -> Result<U256, String> {
    if data.len() < 32 {
        return Err(format!("uint256 response too short: {} bytes", data.len()));
    }
    U256::decode(&data[..32]).map_err(|e| format!("Failed to decode uint256: {}", e))
}
