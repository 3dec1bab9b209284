//! Script compiler: turns an ordered token list into serialized script bytes.
//!
//! Pure encoder. Nothing here checks what the script means, only that each
//! token has a canonical byte form.

use bitcoin::ScriptBuf;
use bitcoin::opcodes::Opcode;
use bitcoin::opcodes::all::{
    OP_CHECKSIGADD, OP_PUSHBYTES_0, OP_PUSHDATA1, OP_PUSHDATA2, OP_PUSHDATA4, OP_PUSHNUM_1,
    OP_PUSHNUM_NEG1,
};

use crate::error::{Error, Result};

/// Largest magnitude an arithmetic operand may have (4-byte script number).
pub const MAX_SCRIPT_NUM: i64 = 0x7fff_ffff;

/// Consensus limit on a single stack element.
pub const MAX_ELEMENT_SIZE: usize = 520;

/// One element of a script being authored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A raw instruction, emitted as its opcode byte.
    Op(Opcode),
    /// A small integer, pushed with the minimal script-number encoding.
    Int(i64),
    /// A byte string, pushed with the smallest push prefix.
    Data(Vec<u8>),
}

impl From<Opcode> for Token {
    fn from(op: Opcode) -> Self {
        Token::Op(op)
    }
}

impl From<i64> for Token {
    fn from(n: i64) -> Self {
        Token::Int(n)
    }
}

impl From<Vec<u8>> for Token {
    fn from(data: Vec<u8>) -> Self {
        Token::Data(data)
    }
}

impl From<&[u8]> for Token {
    fn from(data: &[u8]) -> Self {
        Token::Data(data.to_vec())
    }
}

/// Encode an integer as a script number.
///
/// Little-endian magnitude, sign in the high bit of the last byte, zero as
/// the empty string.
pub fn encode_script_num(n: i64) -> Result<Vec<u8>> {
    if !(-MAX_SCRIPT_NUM..=MAX_SCRIPT_NUM).contains(&n) {
        return Err(Error::Encoding(format!(
            "literal {n} outside script number range"
        )));
    }
    if n == 0 {
        return Ok(Vec::new());
    }

    let negative = n < 0;
    let mut abs = n.unsigned_abs();
    let mut out = Vec::with_capacity(5);
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }

    // A set high bit would be read as the sign, so spill into an extra byte.
    let last = out.len() - 1;
    if out[last] & 0x80 != 0 {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        out[last] |= 0x80;
    }
    Ok(out)
}

/// Decode a script number of at most `max_len` bytes.
pub fn decode_script_num(bytes: &[u8], max_len: usize) -> Result<i64> {
    if bytes.len() > max_len {
        return Err(Error::Encoding(format!(
            "script number of {} bytes exceeds {max_len}",
            bytes.len()
        )));
    }
    let Some((&last, _)) = bytes.split_last() else {
        return Ok(0);
    };

    let mut value: i64 = 0;
    for (i, b) in bytes.iter().enumerate() {
        value |= i64::from(*b) << (8 * i);
    }
    if last & 0x80 != 0 {
        let sign_bit = 0x80i64 << (8 * (bytes.len() - 1));
        Ok(-(value & !sign_bit))
    } else {
        Ok(value)
    }
}

/// Compile a token sequence into a script.
pub fn compile(tokens: &[Token]) -> Result<ScriptBuf> {
    let mut bytes = Vec::new();
    for token in tokens {
        match token {
            Token::Op(op) => {
                check_opcode(*op)?;
                bytes.push(op.to_u8());
            }
            Token::Int(n) => push_data(&mut bytes, &encode_script_num(*n)?)?,
            Token::Data(data) => push_data(&mut bytes, data)?,
        }
    }
    Ok(ScriptBuf::from_bytes(bytes))
}

fn check_opcode(op: Opcode) -> Result<()> {
    let code = op.to_u8();
    // 0x01..=0x4e carry inline data and must come from `Token::Data`.
    let is_push = code > OP_PUSHBYTES_0.to_u8() && code <= OP_PUSHDATA4.to_u8();
    if is_push || code > OP_CHECKSIGADD.to_u8() {
        return Err(Error::Encoding(format!("unknown opcode 0x{code:02x}")));
    }
    Ok(())
}

/// Append a minimal push of `data`.
fn push_data(out: &mut Vec<u8>, data: &[u8]) -> Result<()> {
    let len = data.len();
    if len > MAX_ELEMENT_SIZE {
        return Err(Error::Encoding(format!(
            "push of {len} bytes exceeds {MAX_ELEMENT_SIZE}"
        )));
    }

    match data {
        [] => out.push(OP_PUSHBYTES_0.to_u8()),
        [n @ 1..=16] => out.push(OP_PUSHNUM_1.to_u8() + n - 1),
        [0x81] => out.push(OP_PUSHNUM_NEG1.to_u8()),
        _ => {
            if len < OP_PUSHDATA1.to_u8() as usize {
                out.push(len as u8);
            } else if len <= 0xff {
                out.push(OP_PUSHDATA1.to_u8());
                out.push(len as u8);
            } else if len <= 0xffff {
                out.push(OP_PUSHDATA2.to_u8());
                out.extend_from_slice(&(len as u16).to_le_bytes());
            } else {
                out.push(OP_PUSHDATA4.to_u8());
                out.extend_from_slice(&(len as u32).to_le_bytes());
            }
            out.extend_from_slice(data);
        }
    }
    Ok(())
}

/// Parse a whitespace-separated assembly string into tokens.
///
/// Accepts decimal integers, `0x`-prefixed hex data, `OP_0`..`OP_16`,
/// `OP_1NEGATE`, `OP_TRUE`/`OP_FALSE` and every named opcode.
pub fn parse_asm(asm: &str) -> Result<Vec<Token>> {
    asm.split_whitespace().map(parse_word).collect()
}

fn parse_word(word: &str) -> Result<Token> {
    if let Some(hex_data) = word.strip_prefix("0x") {
        let data = hex::decode(hex_data)
            .map_err(|e| Error::Encoding(format!("bad hex literal {word}: {e}")))?;
        return Ok(Token::Data(data));
    }
    if let Ok(n) = word.parse::<i64>() {
        return Ok(Token::Int(n));
    }

    let upper = word.to_ascii_uppercase();
    let name = upper.strip_prefix("OP_").unwrap_or(&upper);
    match name {
        "FALSE" => return Ok(Token::Int(0)),
        "TRUE" => return Ok(Token::Int(1)),
        "1NEGATE" => return Ok(Token::Int(-1)),
        _ => {}
    }
    if let Ok(n) = name.parse::<i64>() {
        if (0..=16).contains(&n) {
            return Ok(Token::Int(n));
        }
    }

    let canonical = match name {
        "CHECKLOCKTIMEVERIFY" | "NOP2" => "CLTV",
        "CHECKSEQUENCEVERIFY" | "NOP3" => "CSV",
        other => other,
    };
    let wanted = format!("OP_{canonical}");
    (OP_PUSHNUM_NEG1.to_u8()..=OP_CHECKSIGADD.to_u8())
        .map(Opcode::from)
        .find(|op| op.to_string() == wanted)
        .map(Token::Op)
        .ok_or_else(|| Error::Encoding(format!("unknown opcode {word}")))
}
