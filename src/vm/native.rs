//! Parameter encoding for calls into native (built-in) contracts.
//!
//! Native contracts read their arguments as structs assembled on the alt
//! stack, so the layout differs from application calls:
//!
//! - top-level values are pushed in reverse order
//! - a struct is `PUSH0 NEWSTRUCT TOALTSTACK`, then every field followed by
//!   `DUPFROMALTSTACK SWAP APPEND`, then `FROMALTSTACK`
//! - an array made only of structs shares one `NEWSTRUCT` bracket for all of
//!   their fields and is closed with `PUSHn PACK`
//! - any other array is encoded recursively and closed with `PUSHn PACK`
//!
//! The VM does not validate the layout; a wrong byte here is a transaction
//! that fails on chain, so the exact output is pinned by tests.

use super::{OpCode, ScriptBuilder, VmError};
use crate::types::Address;

/// Interop service that dispatches native contract calls
pub const NATIVE_INVOKE_NAME: &str = "Ontology.Native.Invoke";

/// A value in a native contract argument list
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NativeValue {
    /// 20 address bytes
    Address(Address),
    /// VM integer
    Int(i64),
    /// Boolean
    Bool(bool),
    /// Raw bytes given as hex
    Hex(String),
    /// UTF-8 string, pushed as its bytes
    Str(String),
    /// Struct of fields
    Struct(Vec<NativeValue>),
    /// Array of values
    Array(Vec<NativeValue>),
}

impl NativeValue {
    /// Raw bytes
    pub fn bytes(value: impl AsRef<[u8]>) -> Self {
        Self::Hex(hex::encode(value))
    }

    /// UTF-8 string
    pub fn str(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    const fn is_struct(&self) -> bool {
        matches!(self, Self::Struct(_))
    }
}

fn push_scalar(sb: &mut ScriptBuilder, value: &NativeValue) -> Result<(), VmError> {
    match value {
        NativeValue::Address(addr) => {
            sb.emit_push(addr.as_bytes());
        }
        NativeValue::Int(n) => {
            sb.emit_push_int(*n);
        }
        NativeValue::Bool(b) => {
            sb.emit_push_bool(*b);
        }
        NativeValue::Hex(h) => {
            sb.emit_push_hex(h)
                .map_err(|e| VmError::InvalidHex(e.to_string()))?;
        }
        NativeValue::Str(s) => {
            sb.emit_push_str(s);
        }
        NativeValue::Struct(_) | NativeValue::Array(_) => return Err(VmError::NestedArray),
    }
    Ok(())
}

fn append_to_alt_struct(sb: &mut ScriptBuilder) {
    sb.emit(OpCode::DupFromAltStack)
        .emit(OpCode::Swap)
        .emit(OpCode::Append);
}

/// Encode a value nested inside a struct. Nested structs contribute their
/// fields to the enclosing struct; nested plain arrays are not supported by
/// the calling convention.
fn emit_field(sb: &mut ScriptBuilder, value: &NativeValue) -> Result<(), VmError> {
    match value {
        NativeValue::Struct(fields) => {
            for field in fields {
                emit_field(sb, field)?;
                append_to_alt_struct(sb);
            }
            Ok(())
        }
        NativeValue::Array(_) => Err(VmError::NestedArray),
        scalar => push_scalar(sb, scalar),
    }
}

fn emit_list(sb: &mut ScriptBuilder, list: &[NativeValue]) -> Result<(), VmError> {
    for value in list.iter().rev() {
        match value {
            NativeValue::Struct(fields) => {
                sb.emit_push_int(0)
                    .emit(OpCode::NewStruct)
                    .emit(OpCode::ToAltStack);
                for field in fields {
                    emit_field(sb, field)?;
                    append_to_alt_struct(sb);
                }
                sb.emit(OpCode::FromAltStack);
            }
            NativeValue::Array(items) if items.iter().all(NativeValue::is_struct) => {
                sb.emit_push_int(0)
                    .emit(OpCode::NewStruct)
                    .emit(OpCode::ToAltStack);
                for item in items {
                    emit_field(sb, item)?;
                }
                sb.emit(OpCode::FromAltStack)
                    .emit_push_int(items.len() as i64)
                    .emit(OpCode::Pack);
            }
            NativeValue::Array(items) => {
                emit_list(sb, items)?;
                sb.emit_push_int(items.len() as i64).emit(OpCode::Pack);
            }
            scalar => push_scalar(sb, scalar)?,
        }
    }
    Ok(())
}

/// Encode a native argument list.
///
/// # Errors
/// Returns error on invalid hex or a plain array nested in a struct
pub fn build_native_code_script(list: &[NativeValue]) -> Result<Vec<u8>, VmError> {
    let mut sb = ScriptBuilder::new();
    emit_list(&mut sb, list)?;
    Ok(sb.into_bytes())
}

/// Full invocation script for `method` on the native contract at `contract`.
///
/// # Errors
/// Returns error if the arguments cannot be encoded
pub fn native_invoke_code(
    contract: &Address,
    method: &str,
    list: &[NativeValue],
) -> Result<Vec<u8>, VmError> {
    let mut code = build_native_code_script(list)?;
    let mut sb = ScriptBuilder::new();
    sb.emit_push_str(method)
        .emit_push(contract.as_bytes())
        .emit_push_int(0)
        .emit(OpCode::SysCall)
        .emit_push_str(NATIVE_INVOKE_NAME);
    code.extend(sb.into_bytes());
    Ok(code)
}
