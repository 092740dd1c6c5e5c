//! Programmatic construction of VM scripts.

use super::OpCode;

/// Helps construct VM scripts programmatically.
#[derive(Debug, Default, Clone)]
pub struct ScriptBuilder {
    script: Vec<u8>,
}

impl ScriptBuilder {
    /// Creates a new script builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits an opcode.
    pub fn emit(&mut self, op: OpCode) -> &mut Self {
        self.script.push(op as u8);
        self
    }

    /// Emits raw bytes without a length prefix.
    pub fn emit_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.script.extend_from_slice(bytes);
        self
    }

    /// Emits a push of `data` with the shortest length prefix.
    pub fn emit_push(&mut self, data: &[u8]) -> &mut Self {
        let len = data.len();
        if len <= OpCode::PushBytes75 as usize {
            self.script.push(len as u8);
        } else if len < 0x100 {
            self.emit(OpCode::PushData1);
            self.script.push(len as u8);
        } else if len < 0x1_0000 {
            self.emit(OpCode::PushData2);
            self.script.extend_from_slice(&(len as u16).to_le_bytes());
        } else {
            self.emit(OpCode::PushData4);
            self.script.extend_from_slice(&(len as u32).to_le_bytes());
        }
        self.script.extend_from_slice(data);
        self
    }

    /// Emits a push of hex-encoded data. Invalid hex is the caller's bug
    /// and is rejected before anything is emitted.
    pub fn emit_push_hex(&mut self, data_hex: &str) -> Result<&mut Self, hex::FromHexError> {
        let data = hex::decode(data_hex)?;
        Ok(self.emit_push(&data))
    }

    /// Emits a push of a UTF-8 string.
    pub fn emit_push_str(&mut self, value: &str) -> &mut Self {
        self.emit_push(value.as_bytes())
    }

    /// Emits an integer: dedicated opcodes for -1..=16, minimal signed
    /// little-endian bytes otherwise.
    pub fn emit_push_int(&mut self, value: i64) -> &mut Self {
        match value {
            -1 => self.emit(OpCode::PushM1),
            0 => self.emit(OpCode::Push0),
            1..=16 => {
                self.script.push(OpCode::Push1 as u8 + value as u8 - 1);
                self
            }
            _ => {
                let bytes = int_to_le_bytes(value);
                self.emit_push(&bytes)
            }
        }
    }

    /// Emits a boolean.
    pub fn emit_push_bool(&mut self, value: bool) -> &mut Self {
        self.emit(if value { OpCode::Push1 } else { OpCode::Push0 })
    }

    /// Emits `APPCALL` followed by the callee's 20 script-hash bytes.
    pub fn emit_app_call(&mut self, contract: &[u8; 20]) -> &mut Self {
        self.emit(OpCode::AppCall);
        self.emit_raw(contract)
    }

    /// Current length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.script.len()
    }

    /// Whether nothing was emitted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }

    /// Finish and return the script bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.script
    }

    /// Finish and return the script as hex.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.script)
    }
}

/// Minimal two's-complement little-endian encoding of a VM integer.
pub(crate) fn int_to_le_bytes(value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }
    let mut bytes = Vec::new();
    let mut v = value;
    while v != 0 && v != -1 {
        bytes.push((v & 0xff) as u8);
        v >>= 8;
    }
    let last = bytes.last().copied().unwrap_or(0);
    if v == -1 && (bytes.is_empty() || last & 0x80 == 0) {
        bytes.push(0xff);
    } else if v == 0 && last & 0x80 != 0 {
        bytes.push(0x00);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_of(f: impl FnOnce(&mut ScriptBuilder)) -> String {
        let mut sb = ScriptBuilder::new();
        f(&mut sb);
        sb.to_hex()
    }

    #[test]
    fn test_small_ints_use_opcodes() {
        assert_eq!(hex_of(|sb| { sb.emit_push_int(-1); }), "4f");
        assert_eq!(hex_of(|sb| { sb.emit_push_int(0); }), "00");
        assert_eq!(hex_of(|sb| { sb.emit_push_int(1); }), "51");
        assert_eq!(hex_of(|sb| { sb.emit_push_int(16); }), "60");
    }

    #[test]
    fn test_larger_ints_push_bytes() {
        assert_eq!(hex_of(|sb| { sb.emit_push_int(17); }), "0111");
        assert_eq!(hex_of(|sb| { sb.emit_push_int(128); }), "028000");
        assert_eq!(hex_of(|sb| { sb.emit_push_int(255); }), "02ff00");
        assert_eq!(hex_of(|sb| { sb.emit_push_int(256); }), "020001");
        assert_eq!(hex_of(|sb| { sb.emit_push_int(-2); }), "01fe");
        assert_eq!(hex_of(|sb| { sb.emit_push_int(-129); }), "027fff");
    }

    #[test]
    fn test_push_length_prefixes() {
        assert_eq!(hex_of(|sb| { sb.emit_push(&[0xab; 3]); }), "03ababab");

        let s = hex_of(|sb| { sb.emit_push(&[0u8; 75]); });
        assert_eq!(&s[..2], "4b");

        let s = hex_of(|sb| { sb.emit_push(&[0u8; 76]); });
        assert_eq!(&s[..4], "4c4c");

        let s = hex_of(|sb| { sb.emit_push(&[0u8; 0x100]); });
        assert_eq!(&s[..6], "4d0001");

        let s = hex_of(|sb| { sb.emit_push(&vec![0u8; 0x1_0000]); });
        assert_eq!(&s[..10], "4e00000100");
    }

    #[test]
    fn test_bools_and_strings() {
        assert_eq!(hex_of(|sb| { sb.emit_push_bool(true); }), "51");
        assert_eq!(hex_of(|sb| { sb.emit_push_bool(false); }), "00");
        assert_eq!(hex_of(|sb| { sb.emit_push_str("abc"); }), "03616263");
    }

    #[test]
    fn test_app_call() {
        let mut target = [0u8; 20];
        target[0] = 0x11;
        let s = hex_of(|sb| { sb.emit_app_call(&target); });
        assert_eq!(s, format!("6711{}", "00".repeat(19)));
    }

    #[test]
    fn test_push_hex_rejects_bad_input() {
        let mut sb = ScriptBuilder::new();
        assert!(sb.emit_push_hex("zz").is_err());
        assert!(sb.is_empty());
    }
}
