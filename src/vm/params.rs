//! Parameters for application contract calls and the invoke script they
//! compile to.
//!
//! The script pushes the argument array (elements in reverse, then the count
//! and `PACK`), then the method name, then `APPCALL` with the target.

use serde::{Deserialize, Serialize};

use super::{OpCode, ScriptBuilder, VmError};
use crate::types::Address;

/// A typed argument to an application contract method
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Parameter {
    /// UTF-8 string, pushed as its bytes
    String(String),
    /// VM integer
    Integer(i64),
    /// Boolean
    Boolean(bool),
    /// Hex-encoded byte array
    ByteArray(String),
    /// Nested array, packed
    Array(Vec<Parameter>),
}

impl Parameter {
    /// String parameter
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// Byte-array parameter from raw bytes
    pub fn bytes(value: impl AsRef<[u8]>) -> Self {
        Self::ByteArray(hex::encode(value))
    }

    /// Byte-array parameter holding an address
    #[must_use]
    pub fn address(addr: &Address) -> Self {
        Self::bytes(addr.as_bytes())
    }

    fn emit(&self, sb: &mut ScriptBuilder) -> Result<(), VmError> {
        match self {
            Self::String(s) => {
                sb.emit_push_str(s);
            }
            Self::Integer(n) => {
                sb.emit_push_int(*n);
            }
            Self::Boolean(b) => {
                sb.emit_push_bool(*b);
            }
            Self::ByteArray(h) => {
                sb.emit_push_hex(h)
                    .map_err(|e| VmError::InvalidHex(e.to_string()))?;
            }
            Self::Array(items) => emit_packed(sb, items)?,
        }
        Ok(())
    }
}

fn emit_packed(sb: &mut ScriptBuilder, items: &[Parameter]) -> Result<(), VmError> {
    for item in items.iter().rev() {
        item.emit(sb)?;
    }
    sb.emit_push_int(items.len() as i64);
    sb.emit(OpCode::Pack);
    Ok(())
}

/// Script invoking `method(params...)` on an application contract.
///
/// # Errors
/// Returns error if a byte-array parameter is not valid hex
pub fn build_invoke_code(
    contract: &Address,
    method: &str,
    params: &[Parameter],
) -> Result<Vec<u8>, VmError> {
    let mut sb = ScriptBuilder::new();
    emit_packed(&mut sb, params)?;
    sb.emit_push_str(method);
    sb.emit_app_call(contract.as_bytes());
    Ok(sb.into_bytes())
}
