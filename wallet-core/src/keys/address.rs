//! Bech32m encoding of sub-address double public keys.

use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32m, Hrp};
use blsct::SubAddress;

use crate::error::WalletError;

/// Human-readable prefix of wallet addresses.
pub const ADDRESS_HRP: &str = "ctw";

/// Encode a sub-address as a bech32m string over its 96-byte wire form.
pub fn encode_sub_address(sub_address: &SubAddress) -> String {
    let hrp = Hrp::parse(ADDRESS_HRP).expect("valid hrp literal");
    bech32::encode::<Bech32m>(hrp, &sub_address.to_bytes())
        .expect("96 bytes always encode")
}

/// Decode a bech32m wallet address back into its double public key.
pub fn decode_sub_address(address: &str) -> Result<SubAddress, WalletError> {
    let checked = CheckedHrpstring::new::<Bech32m>(address).map_err(|err| {
        WalletError::BuilderFailed(format!("invalid address: {err}"))
    })?;
    if checked.hrp().as_str() != ADDRESS_HRP {
        return Err(WalletError::BuilderFailed(format!(
            "invalid address prefix: {}",
            checked.hrp()
        )));
    }
    let bytes: Vec<u8> = checked.byte_iter().collect();
    SubAddress::from_bytes(&bytes).ok_or_else(|| {
        WalletError::BuilderFailed(format!(
            "invalid address payload length: {}",
            bytes.len()
        ))
    })
}

#[cfg(test)]
mod test {
    use blsct::PublicKey;

    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let sub_address = SubAddress {
            blinding_key: PublicKey::new([0xaa; 48]),
            spending_key: PublicKey::new([0x55; 48]),
        };
        let encoded = encode_sub_address(&sub_address);
        assert!(encoded.starts_with("ctw1"));
        assert_eq!(decode_sub_address(&encoded).unwrap(), sub_address);
    }

    #[test]
    fn rejects_foreign_strings() {
        assert!(decode_sub_address("not an address").is_err());
        // Valid bech32m, wrong prefix.
        let hrp = Hrp::parse("xyz").unwrap();
        let foreign = bech32::encode::<Bech32m>(hrp, &[0u8; 96]).unwrap();
        assert!(decode_sub_address(&foreign).is_err());
    }
}
