//! BOLT 9 feature bits. Even bits are compulsory, odd bits optional; both
//! bits of a pair share one name.

use std::collections::BTreeMap;

use lazy_static::lazy_static;

const FEATURE_PAIRS: [(u32, &str); 18] = [
    (0, "data_loss_protect"),
    (4, "upfront_shutdown_script"),
    (6, "gossip_queries"),
    (8, "tlv_onion"),
    (10, "gossip_queries_ex"),
    (12, "static_remote_key"),
    (14, "payment_secret"),
    (16, "basic_mpp"),
    (18, "large_channels"),
    (20, "anchor_outputs"),
    (22, "anchors_zero_fee_htlc_tx"),
    (24, "route_blinding"),
    (26, "shutdown_anysegwit"),
    (28, "dual_fund"),
    (44, "channel_type"),
    (46, "scid_alias"),
    (48, "payment_metadata"),
    (50, "zero_conf"),
];

lazy_static! {
    static ref NAME_BY_BIT: BTreeMap<u32, &'static str> = FEATURE_PAIRS
        .iter()
        .flat_map(|&(even, name)| [(even, name), (even + 1, name)])
        .collect();
    static ref BIT_BY_NAME: BTreeMap<&'static str, u32> =
        FEATURE_PAIRS.iter().map(|&(even, name)| (name, even)).collect();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    Compulsory,
    Optional,
}

impl FeatureKind {
    pub fn of_bit(bit: u32) -> Self {
        if bit % 2 == 0 {
            FeatureKind::Compulsory
        } else {
            FeatureKind::Optional
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureKind::Compulsory => "compulsory",
            FeatureKind::Optional => "optional",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFeature {
    pub bit: u32,
    pub name: String,
    pub kind: FeatureKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureDecodeError {
    InvalidHexDigit { position: usize, digit: char },
}

impl std::fmt::Display for FeatureDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureDecodeError::InvalidHexDigit { position, digit } => {
                write!(f, "Invalid hex digit '{}' at position {}", digit, position)
            }
        }
    }
}

impl std::error::Error for FeatureDecodeError {}

pub fn feature_name(bit: u32) -> String {
    match NAME_BY_BIT.get(&bit) {
        Some(name) => name.to_string(),
        None => format!("unknown_bit_{}", bit),
    }
}

/// Compulsory (even) bit of a named feature.
pub fn feature_bit(name: &str) -> Option<u32> {
    BIT_BY_NAME.get(name).copied()
}

/// Decodes a big-endian hex feature vector, lowest bit first.
pub fn decode_features_hex(hex: &str) -> Result<Vec<DecodedFeature>, FeatureDecodeError> {
    let digits: Vec<char> = hex.trim().chars().collect();
    let mut features = Vec::new();
    for (nibble, (position, digit)) in digits.iter().enumerate().rev().enumerate() {
        let value = digit
            .to_digit(16)
            .ok_or(FeatureDecodeError::InvalidHexDigit { position, digit: *digit })?;
        for offset in 0..4u32 {
            if value & (1 << offset) != 0 {
                let bit = nibble as u32 * 4 + offset;
                features.push(DecodedFeature {
                    bit,
                    name: feature_name(bit),
                    kind: FeatureKind::of_bit(bit),
                });
            }
        }
    }
    Ok(features)
}

/// Distinct feature names advertised by a vector, in bit order.
pub fn feature_names(features: &[DecodedFeature]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for feature in features {
        if !names.contains(&feature.name) {
            names.push(feature.name.clone());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_share_names() {
        assert_eq!(feature_name(0), "data_loss_protect");
        assert_eq!(feature_name(1), "data_loss_protect");
        assert_eq!(feature_name(51), "zero_conf");
        assert_eq!(feature_name(2), "unknown_bit_2");
        assert_eq!(feature_bit("scid_alias"), Some(46));
        assert_eq!(feature_bit("nonsense"), None);
    }

    #[test]
    fn decodes_big_endian_hex() {
        // 0x0a = bits 1 and 3; 0x80 in the next byte up = bit 15.
        let features = decode_features_hex("800a").unwrap();
        let bits: Vec<u32> = features.iter().map(|f| f.bit).collect();
        assert_eq!(bits, vec![1, 3, 15]);
        assert_eq!(features[0].kind, FeatureKind::Optional);
        assert_eq!(features[1].name, "unknown_bit_3");
        assert_eq!(features[2].name, "payment_secret");
    }

    #[test]
    fn names_are_deduplicated() {
        let features = decode_features_hex("03").unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(feature_names(&features), vec!["data_loss_protect".to_string()]);
        assert_eq!(features[0].kind.as_str(), "compulsory");
    }

    #[test]
    fn empty_vector_has_no_features() {
        assert!(decode_features_hex("").unwrap().is_empty());
        assert!(decode_features_hex("0000").unwrap().is_empty());
    }

    #[test]
    fn rejects_non_hex() {
        assert_eq!(
            decode_features_hex("0g"),
            Err(FeatureDecodeError::InvalidHexDigit { position: 1, digit: 'g' })
        );
    }
}
