//! VM script construction: opcodes, the push encoder, application call
//! parameters and the native contract calling convention.

mod native;
mod opcode;
mod params;
mod script_builder;

pub use native::{build_native_code_script, native_invoke_code, NativeValue, NATIVE_INVOKE_NAME};
pub use opcode::OpCode;
pub use params::{build_invoke_code, Parameter};
pub use script_builder::ScriptBuilder;

use thiserror::Error;

/// Script construction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    /// A byte parameter was not valid hex
    #[error("invalid hex parameter: {0}")]
    InvalidHex(String),
    /// A plain array nested inside a native struct
    #[error("arrays cannot be nested inside native structs")]
    NestedArray,
}
