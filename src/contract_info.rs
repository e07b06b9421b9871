//! Decodes the CosmWasm `ContractInfo` protobuf message.
//!
//! Only the four fields the Matcher needs are read: `code_id` (field 1,
//! varint), `creator` (field 2, string), `admin` (field 3, string) and
//! `label` (field 4, string), the same field numbers `wasmd` has used since
//! the `ContractInfo` message was introduced. Unknown fields (e.g. the
//! `created` position or IBC port extension) are skipped rather than
//! rejected, since a future chain version may add fields we don't care
//! about.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractInfoDecoded {
    pub code_id: u64,
    pub creator: Option<String>,
    pub admin: Option<String>,
    pub label: Option<String>,
}

const WIRE_VARINT: u64 = 0;
const WIRE_64BIT: u64 = 1;
const WIRE_LENGTH_DELIMITED: u64 = 2;
const WIRE_32BIT: u64 = 5;

/// Decodes a `ContractInfo` message, or `None` if the bytes are malformed.
///
/// A `None` result means "drop the record": the matcher cannot recover a
/// partial `ContractInfo`.
pub fn decode_contract_info(bytes: &[u8]) -> Option<ContractInfoDecoded> {
    let mut code_id: Option<u64> = None;
    let mut creator: Option<String> = None;
    let mut admin: Option<String> = None;
    let mut label: Option<String> = None;

    let mut cursor = 0usize;
    while cursor < bytes.len() {
        let (tag, tag_len) = read_varint(&bytes[cursor..])?;
        cursor += tag_len;
        let field_number = tag >> 3;
        let wire_type = tag & 0x7;

        match wire_type {
            w if w == WIRE_VARINT => {
                let (value, len) = read_varint(&bytes[cursor..])?;
                cursor += len;
                if field_number == 1 {
                    code_id = Some(value);
                }
            }
            w if w == WIRE_LENGTH_DELIMITED => {
                let (len, len_bytes) = read_varint(&bytes[cursor..])?;
                cursor += len_bytes;
                let len = len as usize;
                if cursor + len > bytes.len() {
                    return None;
                }
                let field_bytes = &bytes[cursor..cursor + len];
                cursor += len;
                match field_number {
                    2 => creator = std::str::from_utf8(field_bytes).ok().map(str::to_string),
                    3 => admin = std::str::from_utf8(field_bytes).ok().map(str::to_string),
                    4 => label = std::str::from_utf8(field_bytes).ok().map(str::to_string),
                    _ => {}
                }
            }
            w if w == WIRE_64BIT => cursor += 8,
            w if w == WIRE_32BIT => cursor += 4,
            _ => return None,
        }
    }

    Some(ContractInfoDecoded {
        code_id: code_id?,
        creator,
        admin,
        label,
    })
}

fn read_varint(bytes: &[u8]) -> Option<(u64, usize)> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in bytes.iter().enumerate() {
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }
        shift += 7;
        if shift >= 64 {
            return None;
        }
    }
    None
}

/// Encodes a `ContractInfo` message. Used by tests to build fixtures without
/// depending on a generated protobuf crate.
pub fn encode_contract_info(info: &ContractInfoDecoded) -> Vec<u8> {
    let mut out = Vec::new();
    write_varint_field(&mut out, 1, info.code_id);
    if let Some(creator) = &info.creator {
        write_string_field(&mut out, 2, creator);
    }
    if let Some(admin) = &info.admin {
        write_string_field(&mut out, 3, admin);
    }
    if let Some(label) = &info.label {
        write_string_field(&mut out, 4, label);
    }
    out
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

fn write_varint_field(out: &mut Vec<u8>, field_number: u64, value: u64) {
    write_varint(out, (field_number << 3) | WIRE_VARINT);
    write_varint(out, value);
}

fn write_string_field(out: &mut Vec<u8>, field_number: u64, value: &str) {
    write_varint(out, (field_number << 3) | WIRE_LENGTH_DELIMITED);
    write_varint(out, value.len() as u64);
    out.extend_from_slice(value.as_bytes());
}
