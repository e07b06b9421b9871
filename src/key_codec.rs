//! Parses and builds the CosmWasm module's store key layout.
//!
//! The `wasm` store holds two key families:
//! - contract-info keys: `PREFIX_CONTRACT_KEY || [len]? || address`
//! - contract-state keys: `PREFIX_CONTRACT_STORE || [len]? || address || user_key`
//!
//! The prefix bytes, the presence of a one-byte length prefix, and whether
//! the address length is fixed or variable all depend on the chain variant.

use crate::error::KeyCodecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainVariant {
    /// Fixed 32-byte addresses, no length prefix before the address.
    Standard,
    /// Terra-classic (`columbus-5`): variable-length addresses preceded by a
    /// one-byte length.
    TerraClassic,
}

impl ChainVariant {
    const fn prefix_contract_key(self) -> u8 {
        match self {
            ChainVariant::Standard => 0x02,
            ChainVariant::TerraClassic => 0x04,
        }
    }

    const fn prefix_contract_store(self) -> u8 {
        match self {
            ChainVariant::Standard => 0x03,
            ChainVariant::TerraClassic => 0x05,
        }
    }

    const fn has_length_prefix(self) -> bool {
        matches!(self, ChainVariant::TerraClassic)
    }

    /// Fixed address length for variants without a length prefix.
    const fn fixed_address_len(self) -> usize {
        match self {
            ChainVariant::Standard => 32,
            ChainVariant::TerraClassic => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    ContractInfo,
    ContractState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedKey {
    pub family: KeyFamily,
    pub contract_address_bytes: Vec<u8>,
    /// Empty for contract-info keys.
    pub user_key_bytes: Vec<u8>,
}

/// Decodes a raw wasm-store key, or `None` if the first byte doesn't match
/// either family's prefix for this variant (the caller should drop the
/// record).
pub fn decode_key(variant: ChainVariant, key: &[u8]) -> Result<Option<DecodedKey>, KeyCodecError> {
    let Some(&first) = key.first() else {
        return Err(KeyCodecError::Empty);
    };

    let family = if first == variant.prefix_contract_key() {
        KeyFamily::ContractInfo
    } else if first == variant.prefix_contract_store() {
        KeyFamily::ContractState
    } else {
        return Ok(None);
    };

    let family_name = match family {
        KeyFamily::ContractInfo => "contract-info",
        KeyFamily::ContractState => "contract-state",
    };

    let rest = &key[1..];
    let (address_len, address_start) = if variant.has_length_prefix() {
        let Some(&len_byte) = rest.first() else {
            return Err(KeyCodecError::TooShort {
                family: family_name,
                len: key.len(),
                min: 2,
            });
        };
        (len_byte as usize, 1)
    } else {
        (variant.fixed_address_len(), 0)
    };

    let min_len = 1 + address_start + address_len;
    if key.len() < min_len {
        return Err(KeyCodecError::TooShort {
            family: family_name,
            len: key.len(),
            min: min_len,
        });
    }

    let address_bytes = rest[address_start..address_start + address_len].to_vec();
    let user_key_bytes = match family {
        KeyFamily::ContractInfo => Vec::new(),
        KeyFamily::ContractState => rest[address_start + address_len..].to_vec(),
    };

    Ok(Some(DecodedKey {
        family,
        contract_address_bytes: address_bytes,
        user_key_bytes,
    }))
}

/// Builds a contract-info key for the given variant and address bytes.
pub fn encode_contract_info_key(variant: ChainVariant, address_bytes: &[u8]) -> Vec<u8> {
    let mut out = vec![variant.prefix_contract_key()];
    if variant.has_length_prefix() {
        out.push(address_bytes.len() as u8);
    }
    out.extend_from_slice(address_bytes);
    out
}

/// Builds a contract-state key for the given variant, address and user key.
pub fn encode_contract_state_key(
    variant: ChainVariant,
    address_bytes: &[u8],
    user_key_bytes: &[u8],
) -> Vec<u8> {
    let mut out = vec![variant.prefix_contract_store()];
    if variant.has_length_prefix() {
        out.push(address_bytes.len() as u8);
    }
    out.extend_from_slice(address_bytes);
    out.extend_from_slice(user_key_bytes);
    out
}

/// Renders a user key as the canonical comma-joined decimal byte list used
/// for storage and composite uniqueness.
pub fn canonical_key(user_key_bytes: &[u8]) -> String {
    user_key_bytes
        .iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Parses a canonical key back into bytes. Used by the round-trip tests and
/// by transformers that need to recover the original key bytes.
pub fn parse_canonical_key(canonical: &str) -> Result<Vec<u8>, KeyCodecError> {
    if canonical.is_empty() {
        return Ok(Vec::new());
    }
    canonical
        .split(',')
        .map(|part| {
            part.parse::<u8>()
                .map_err(|_| KeyCodecError::UnrecognizedPrefix(0))
        })
        .collect()
}

/// Encodes contract address bytes to the chain's bech32 text form.
pub fn address_to_bech32(
    address_bytes: &[u8],
    hrp: &str,
) -> Result<String, bech32::Error> {
    use bech32::ToBase32;
    bech32::encode(hrp, address_bytes.to_base32(), bech32::Variant::Bech32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_round_trip() {
        let addr = [7u8; 32];
        let key = encode_contract_state_key(ChainVariant::Standard, &addr, &[1, 2, 3]);
        let decoded = decode_key(ChainVariant::Standard, &key).unwrap().unwrap();
        assert_eq!(decoded.family, KeyFamily::ContractState);
        assert_eq!(decoded.contract_address_bytes, addr.to_vec());
        assert_eq!(decoded.user_key_bytes, vec![1, 2, 3]);
    }

    #[test]
    fn terra_classic_round_trip_with_length_prefix() {
        let addr = [9u8; 20];
        let key = encode_contract_state_key(ChainVariant::TerraClassic, &addr, &[9, 9]);
        assert_eq!(key[1], 20);
        let decoded = decode_key(ChainVariant::TerraClassic, &key)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.contract_address_bytes, addr.to_vec());
        assert_eq!(canonical_key(&decoded.user_key_bytes), "9,9");
    }

    #[test]
    fn unrecognized_prefix_is_dropped() {
        let key = [0xffu8, 1, 2, 3];
        assert!(decode_key(ChainVariant::Standard, &key).unwrap().is_none());
    }

    #[test]
    fn too_short_key_is_rejected() {
        let key = [0x03u8, 1, 2];
        assert!(matches!(
            decode_key(ChainVariant::Standard, &key),
            Err(KeyCodecError::TooShort { .. })
        ));
    }

    #[test]
    fn canonical_key_round_trip() {
        let bytes = vec![99, 111, 110, 116, 114, 97, 99, 116, 95, 105, 110, 102, 111];
        let rendered = canonical_key(&bytes);
        assert_eq!(rendered, "99,111,110,116,114,97,99,116,95,105,110,102,111");
        assert_eq!(parse_canonical_key(&rendered).unwrap(), bytes);
    }
}
