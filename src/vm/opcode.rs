//! The subset of NeoVM opcodes the gateway emits.

/// VM opcodes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Push an empty byte array (integer 0, false)
    Push0 = 0x00,
    /// Largest direct push, data length in the opcode itself
    PushBytes75 = 0x4b,
    /// Push with a 1-byte length prefix
    PushData1 = 0x4c,
    /// Push with a 2-byte little-endian length prefix
    PushData2 = 0x4d,
    /// Push with a 4-byte little-endian length prefix
    PushData4 = 0x4e,
    /// Push -1
    PushM1 = 0x4f,
    /// Push 1 (true); `Push1 + n - 1` pushes `n` up to 16
    Push1 = 0x51,
    /// Push 16
    Push16 = 0x60,
    /// Call another contract by script hash
    AppCall = 0x67,
    /// Call an interop service by name
    SysCall = 0x68,
    /// Copy the top of the alt stack onto the main stack
    DupFromAltStack = 0x6a,
    /// Move the top item to the alt stack
    ToAltStack = 0x6b,
    /// Move the top of the alt stack back
    FromAltStack = 0x6c,
    /// Swap the top two items
    Swap = 0x7c,
    /// Verify a signature
    CheckSig = 0xac,
    /// Pack `n` items into an array
    Pack = 0xc1,
    /// Create a struct from the top item
    NewStruct = 0xc6,
    /// Append an item to an array or struct
    Append = 0xc8,
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        op as Self
    }
}
