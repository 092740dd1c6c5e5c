//! Chain transactions: construction, wire encoding, hashing and signing.
//!
//! Unsigned layout: `version u8 | type u8 | nonce u32le | gas_price u64le |
//! gas_limit u64le | payer [20] | payload | attributes varint(0)`. Signed
//! transactions append `varint(n)` signatures, each a var-bytes invocation
//! script (the tagged signature push) and a var-bytes verification script.
//!
//! The hash is double SHA-256 of the unsigned bytes. It is what gets signed,
//! and it is displayed byte-reversed.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::crypto::{sha256d, Keypair, PublicKey, Signature};
use crate::types::Address;
use crate::vm::ScriptBuilder;

/// Transaction format version
pub const TX_VERSION: u8 = 0;

/// Transaction kinds the gateway submits
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TxType {
    /// Contract deployment
    Deploy = 0xd0,
    /// Contract invocation
    Invoke = 0xd1,
}

/// Metadata and code of a contract deployment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployCode {
    /// Contract script
    pub code: Vec<u8>,
    /// Whether the contract uses storage
    pub need_storage: bool,
    /// Contract name
    pub name: String,
    /// Version string
    pub version: String,
    /// Author
    pub author: String,
    /// Contact email
    pub email: String,
    /// Free-form description
    pub description: String,
}

/// Transaction payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Deploy a contract
    Deploy(DeployCode),
    /// Run an invocation script
    Invoke {
        /// Script bytes
        code: Vec<u8>,
    },
}

/// A signature together with the key that produced it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxSig {
    /// Signer's public key
    pub public_key: PublicKey,
    /// Signature over the transaction hash
    pub signature: Signature,
}

/// A chain transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// Format version
    pub version: u8,
    /// Kind
    pub tx_type: TxType,
    /// Random nonce so identical calls hash differently
    pub nonce: u32,
    /// Price per gas unit
    pub gas_price: u64,
    /// Gas ceiling
    pub gas_limit: u64,
    /// Account paying the fee
    pub payer: Address,
    /// Deploy or invoke payload
    pub payload: Payload,
    /// Attached signatures
    pub sigs: Vec<TxSig>,
}

impl Transaction {
    fn new(tx_type: TxType, payload: Payload, gas_price: u64, gas_limit: u64, payer: Address) -> Self {
        Self {
            version: TX_VERSION,
            tx_type,
            nonce: rand::thread_rng().next_u32(),
            gas_price,
            gas_limit,
            payer,
            payload,
            sigs: Vec::new(),
        }
    }

    /// Unsigned deploy transaction
    #[must_use]
    pub fn deploy(code: DeployCode, gas_price: u64, gas_limit: u64, payer: Address) -> Self {
        Self::new(TxType::Deploy, Payload::Deploy(code), gas_price, gas_limit, payer)
    }

    /// Unsigned invoke transaction running `code`
    #[must_use]
    pub fn invoke(code: Vec<u8>, gas_price: u64, gas_limit: u64, payer: Address) -> Self {
        Self::new(TxType::Invoke, Payload::Invoke { code }, gas_price, gas_limit, payer)
    }

    /// Change the gas limit. Signatures cover the limit, so they are
    /// dropped and the transaction must be signed again.
    pub fn set_gas_limit(&mut self, gas_limit: u64) {
        self.gas_limit = gas_limit;
        self.sigs.clear();
    }

    /// Bytes covered by the hash
    #[must_use]
    pub fn serialize_unsigned(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        out.push(self.version);
        out.push(self.tx_type as u8);
        out.extend_from_slice(&self.nonce.to_le_bytes());
        out.extend_from_slice(&self.gas_price.to_le_bytes());
        out.extend_from_slice(&self.gas_limit.to_le_bytes());
        out.extend_from_slice(self.payer.as_bytes());
        match &self.payload {
            Payload::Deploy(d) => {
                write_var_bytes(&mut out, &d.code);
                out.push(u8::from(d.need_storage));
                write_var_bytes(&mut out, d.name.as_bytes());
                write_var_bytes(&mut out, d.version.as_bytes());
                write_var_bytes(&mut out, d.author.as_bytes());
                write_var_bytes(&mut out, d.email.as_bytes());
                write_var_bytes(&mut out, d.description.as_bytes());
            }
            Payload::Invoke { code } => write_var_bytes(&mut out, code),
        }
        // no attributes
        write_var_uint(&mut out, 0);
        out
    }

    /// Full wire encoding, signatures included
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.serialize_unsigned();
        write_var_uint(&mut out, self.sigs.len() as u64);
        for sig in &self.sigs {
            let mut invocation = ScriptBuilder::new();
            invocation.emit_push(&sig.signature.to_tagged_bytes());
            write_var_bytes(&mut out, &invocation.into_bytes());
            write_var_bytes(&mut out, &sig.public_key.verification_script());
        }
        out
    }

    /// Hex of [`Transaction::serialize`], the form submitted to the node
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize())
    }

    /// Double SHA-256 of the unsigned bytes
    #[must_use]
    pub fn hash(&self) -> [u8; 32] {
        sha256d(&self.serialize_unsigned())
    }

    /// Hash as displayed by explorers and the node (byte-reversed hex)
    #[must_use]
    pub fn hash_hex(&self) -> String {
        let mut hash = self.hash();
        hash.reverse();
        hex::encode(hash)
    }

    /// Sign with `keypair`, replacing an earlier signature by the same key
    pub fn sign(&mut self, keypair: &Keypair) {
        let signature = keypair.sign(&self.hash());
        let public_key = keypair.public_key().clone();
        if let Some(existing) = self.sigs.iter_mut().find(|s| s.public_key == public_key) {
            existing.signature = signature;
        } else {
            self.sigs.push(TxSig {
                public_key,
                signature,
            });
        }
    }
}

/// Variable-length unsigned integer
pub(crate) fn write_var_uint(out: &mut Vec<u8>, value: u64) {
    if value < 0xfd {
        out.push(value as u8);
    } else if value <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// Length-prefixed bytes
pub(crate) fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_var_uint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::verify;

    fn sample_invoke(payer: Address) -> Transaction {
        let mut tx = Transaction::invoke(vec![0x51, 0xc1], 500, 20_000, payer);
        tx.nonce = 0x0102_0304;
        tx
    }

    #[test]
    fn test_var_uint_boundaries() {
        let enc = |v| {
            let mut out = Vec::new();
            write_var_uint(&mut out, v);
            hex::encode(out)
        };
        assert_eq!(enc(0), "00");
        assert_eq!(enc(0xfc), "fc");
        assert_eq!(enc(0xfd), "fdfd00");
        assert_eq!(enc(0xffff), "fdffff");
        assert_eq!(enc(0x1_0000), "fe00000100");
        assert_eq!(enc(0x1_0000_0000), "ff0000000001000000");
    }

    #[test]
    fn test_unsigned_layout() {
        let tx = sample_invoke(Address::native(1));
        let hex = hex::encode(tx.serialize_unsigned());
        let expected = format!(
            "00d104030201{}{}{}{}0251c100",
            "f401000000000000",
            "204e000000000000",
            "00".repeat(19),
            "01"
        );
        assert_eq!(hex, expected);
    }

    #[test]
    fn test_deploy_payload_layout() {
        let mut tx = Transaction::deploy(
            DeployCode {
                code: vec![0xaa],
                need_storage: true,
                name: "n".into(),
                version: "v".into(),
                author: "a".into(),
                email: "e".into(),
                description: "d".into(),
            },
            0,
            0,
            Address::ZERO,
        );
        tx.nonce = 0;
        let hex = hex::encode(tx.serialize_unsigned());
        assert!(hex.starts_with("00d0"));
        assert!(hex.ends_with("01aa01016e017601610165016400"));
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = Keypair::generate();
        let mut tx = sample_invoke(kp.address());
        tx.sign(&kp);
        assert_eq!(tx.sigs.len(), 1);
        assert!(verify(kp.public_key(), &tx.hash(), &tx.sigs[0].signature).is_ok());

        // re-signing with the same key replaces rather than appends
        tx.sign(&kp);
        assert_eq!(tx.sigs.len(), 1);

        let other = Keypair::generate();
        tx.sign(&other);
        assert_eq!(tx.sigs.len(), 2);
    }

    #[test]
    fn test_signed_encoding() {
        let kp = Keypair::generate();
        let mut tx = sample_invoke(kp.address());
        tx.sign(&kp);
        let unsigned_len = tx.serialize_unsigned().len();
        let full = tx.serialize();
        // count | 0x42 | 0x41 tagged sig | 0x23 verification script
        assert_eq!(full[unsigned_len], 1);
        assert_eq!(full[unsigned_len + 1], 0x42);
        assert_eq!(full[unsigned_len + 2], 0x41);
        assert_eq!(full[unsigned_len + 3], 0x01);
        assert_eq!(full[unsigned_len + 68], 0x23);
        assert_eq!(full.len(), unsigned_len + 1 + 1 + 66 + 1 + 35);
    }

    #[test]
    fn test_gas_limit_change_invalidates_signatures() {
        let kp = Keypair::generate();
        let mut tx = sample_invoke(kp.address());
        let before = tx.hash();
        tx.sign(&kp);
        tx.set_gas_limit(40_000);
        assert!(tx.sigs.is_empty());
        assert_ne!(tx.hash(), before);
    }

    #[test]
    fn test_hash_hex_is_reversed() {
        let tx = sample_invoke(Address::ZERO);
        let mut raw = tx.hash();
        raw.reverse();
        assert_eq!(tx.hash_hex(), hex::encode(raw));
        assert_eq!(tx.hash_hex().len(), 64);
    }
}
