use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, Script, ScriptBuf};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::network::Network;

/// Witness program of a version-0 script-hash output: SHA256(witness_script).
pub fn witness_program(witness_script: &Script) -> [u8; 32] {
    Sha256::digest(witness_script.as_bytes()).into()
}

/// Compute the P2WSH script pubkey committing to `witness_script`.
///
/// ```text
/// spk = OP_0 <SHA256(witness_script)>
/// ```
pub fn p2wsh_script_pubkey(witness_script: &Script) -> ScriptBuf {
    let program = witness_program(witness_script);
    let mut script_bytes = Vec::with_capacity(34);
    script_bytes.push(0x00); // OP_0
    script_bytes.push(0x20); // PUSH32
    script_bytes.extend_from_slice(&program);
    ScriptBuf::from_bytes(script_bytes)
}

/// Encode the P2WSH address of `witness_script` for a network.
pub fn p2wsh_address(witness_script: &Script, network: Network) -> Result<Address> {
    let spk = p2wsh_script_pubkey(witness_script);
    Address::from_script(&spk, network.into_bitcoin())
        .map_err(|e| Error::Address(format!("cannot encode witness program: {e}")))
}

/// Same as [`p2wsh_address`] but with the network given by name.
pub fn p2wsh_address_for(witness_script: &Script, network: &str) -> Result<Address> {
    p2wsh_address(witness_script, network.parse()?)
}

/// Parse an address and check it belongs to `network`.
pub fn parse_address(address: &str, network: Network) -> Result<Address> {
    address
        .parse::<Address<NetworkUnchecked>>()
        .map_err(|e| Error::Address(format!("{address}: {e}")))?
        .require_network(network.into_bitcoin())
        .map_err(|e| Error::Address(format!("{address}: {e}")))
}
