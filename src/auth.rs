//! Calls into the native authorization contract.
//!
//! The authorization contract keeps, per target contract, which roles may
//! call which methods and which identities hold which roles. Every call is
//! authorized by the contract's admin identity and one of its numbered
//! control keys.

use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};
use crate::transaction::Transaction;
use crate::types::Address;
use crate::vm::{native_invoke_code, NativeValue};

/// Native authorization contract
pub const AUTH_CONTRACT: Address = Address::native(6);

/// Identity used to authorize a call: identity string plus control key
/// number
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityAuth {
    /// Identity string
    #[serde(alias = "ontID")]
    pub ontid: String,
    /// 1-based control key number
    #[serde(rename = "keyNo")]
    pub key_no: u32,
}

impl IdentityAuth {
    /// Pair for `ontid` and `key_no`
    pub fn new(ontid: impl Into<String>, key_no: u32) -> Self {
        Self {
            ontid: ontid.into(),
            key_no,
        }
    }

    fn checked_key_no(&self) -> ServiceResult<i64> {
        if self.key_no == 0 {
            return Err(ServiceError::bad_request("key number must be positive"));
        }
        Ok(i64::from(self.key_no))
    }
}

/// Identity strings go on the wire as their UTF-8 bytes; anything else is
/// taken as already hex encoded.
fn identity_value(ontid: &str) -> NativeValue {
    if ontid.starts_with("did") {
        NativeValue::str(ontid)
    } else {
        NativeValue::Hex(ontid.to_string())
    }
}

fn auth_tx(
    method: &str,
    fields: Vec<NativeValue>,
    payer: Address,
    gas_price: u64,
    gas_limit: u64,
) -> ServiceResult<Transaction> {
    let code = native_invoke_code(&AUTH_CONTRACT, method, &[NativeValue::Struct(fields)])?;
    Ok(Transaction::invoke(code, gas_price, gas_limit, payer))
}

fn role_assignment(
    contract: &Address,
    admin: &IdentityAuth,
    role: &str,
    members: Vec<NativeValue>,
) -> ServiceResult<Vec<NativeValue>> {
    let key_no = admin.checked_key_no()?;
    let mut fields = Vec::with_capacity(members.len() + 5);
    fields.push(NativeValue::Address(*contract));
    fields.push(identity_value(&admin.ontid));
    fields.push(NativeValue::str(role));
    fields.push(NativeValue::Int(members.len() as i64));
    fields.extend(members);
    fields.push(NativeValue::Int(key_no));
    Ok(fields)
}

/// Allow `role` to call `funcs` on `contract`
pub fn make_assign_funcs_to_role_tx(
    contract: &Address,
    admin: &IdentityAuth,
    role: &str,
    funcs: &[String],
    payer: Address,
    gas_price: u64,
    gas_limit: u64,
) -> ServiceResult<Transaction> {
    let members = funcs.iter().map(|f| NativeValue::str(f)).collect();
    let fields = role_assignment(contract, admin, role, members)?;
    auth_tx("assignFuncsToRole", fields, payer, gas_price, gas_limit)
}

/// Grant `role` on `contract` to `ontids`
pub fn make_assign_ontids_to_role_tx(
    contract: &Address,
    admin: &IdentityAuth,
    role: &str,
    ontids: &[String],
    payer: Address,
    gas_price: u64,
    gas_limit: u64,
) -> ServiceResult<Transaction> {
    let members = ontids.iter().map(|id| identity_value(id)).collect();
    let fields = role_assignment(contract, admin, role, members)?;
    auth_tx("assignOntIDsToRole", fields, payer, gas_price, gas_limit)
}

/// Hand admin rights over `contract` to `new_admin`
pub fn make_transfer_auth_tx(
    contract: &Address,
    new_admin: &IdentityAuth,
    payer: Address,
    gas_price: u64,
    gas_limit: u64,
) -> ServiceResult<Transaction> {
    let fields = vec![
        NativeValue::Address(*contract),
        identity_value(&new_admin.ontid),
        NativeValue::Int(new_admin.checked_key_no()?),
    ];
    auth_tx("transfer", fields, payer, gas_price, gas_limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Payload;
    use crate::vm::NATIVE_INVOKE_NAME;

    fn code_hex(tx: &Transaction) -> String {
        match &tx.payload {
            Payload::Invoke { code } => hex::encode(code),
            Payload::Deploy(_) => panic!("expected invoke"),
        }
    }

    fn wrapper(method: &str) -> String {
        format!(
            "{:02x}{}14{}06006816{}",
            method.len(),
            hex::encode(method),
            "00".repeat(19),
            hex::encode(NATIVE_INVOKE_NAME)
        )
    }

    #[test]
    fn test_assign_funcs_vector() {
        let contract = Address::from_bytes([0x11; 20]);
        let admin = IdentityAuth::new("did:ont:A", 1);
        let tx = make_assign_funcs_to_role_tx(
            &contract,
            &admin,
            "op",
            &["Set".to_string()],
            Address::ZERO,
            500,
            20_000,
        )
        .unwrap();
        let expected = format!(
            "00c66b14{}6a7cc8{}6a7cc8{}6a7cc8516a7cc8{}6a7cc8516a7cc86c{}",
            "11".repeat(20),
            format!("09{}", hex::encode("did:ont:A")),
            format!("02{}", hex::encode("op")),
            format!("03{}", hex::encode("Set")),
            wrapper("assignFuncsToRole"),
        );
        assert_eq!(code_hex(&tx), expected);
        assert_eq!(tx.gas_limit, 20_000);
    }

    #[test]
    fn test_assign_ontids_members_encoding() {
        let contract = Address::from_bytes([0x22; 20]);
        let admin = IdentityAuth::new("did:ont:A", 2);
        let tx = make_assign_ontids_to_role_tx(
            &contract,
            &admin,
            "op",
            &["did:ont:B".to_string(), "abcd".to_string()],
            Address::ZERO,
            500,
            20_000,
        )
        .unwrap();
        let expected = format!(
            "00c66b14{}6a7cc8{}6a7cc8{}6a7cc8526a7cc8{}6a7cc8{}6a7cc8526a7cc86c{}",
            "22".repeat(20),
            format!("09{}", hex::encode("did:ont:A")),
            format!("02{}", hex::encode("op")),
            format!("09{}", hex::encode("did:ont:B")),
            "02abcd",
            wrapper("assignOntIDsToRole"),
        );
        assert_eq!(code_hex(&tx), expected);
    }

    #[test]
    fn test_transfer_targets_given_contract() {
        let contract = Address::from_bytes([0x33; 20]);
        let tx = make_transfer_auth_tx(
            &contract,
            &IdentityAuth::new("did:ont:N", 1),
            Address::ZERO,
            500,
            20_000,
        )
        .unwrap();
        let expected = format!(
            "00c66b14{}6a7cc8{}6a7cc8516a7cc86c{}",
            "33".repeat(20),
            format!("09{}", hex::encode("did:ont:N")),
            wrapper("transfer"),
        );
        assert_eq!(code_hex(&tx), expected);
    }

    #[test]
    fn test_zero_key_number_rejected() {
        let admin = IdentityAuth::new("did:ont:A", 0);
        assert!(matches!(
            make_assign_funcs_to_role_tx(&Address::ZERO, &admin, "r", &[], Address::ZERO, 0, 0),
            Err(ServiceError::BadRequest(_))
        ));
        let members = vec!["did:ont:B".to_string()];
        assert!(matches!(
            make_assign_ontids_to_role_tx(&Address::ZERO, &admin, "r", &members, Address::ZERO, 0, 0),
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[test]
    fn test_identity_auth_json() {
        let auth: IdentityAuth = serde_json::from_str(r#"{"ontID":"did:ont:X","keyNo":3}"#).unwrap();
        assert_eq!(auth, IdentityAuth::new("did:ont:X", 3));
        let json = serde_json::to_value(&auth).unwrap();
        assert_eq!(json["keyNo"], 3);
    }
}
