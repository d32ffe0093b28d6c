// Wallet-ownership proof
//
// Validates a detached ed25519 signature over a challenge message against a
// claimed public key. Used strictly for proving wallet control (e.g. linking
// a wallet to a platform account), never for payment verification.

use std::str::FromStr;

use ed25519_dalek::{ Signature, Verifier, VerifyingKey };
use solana_sdk::pubkey::Pubkey;

use crate::logger::{ log, LogTag };

/// Check a detached signature over `message` against a base58 public key.
///
/// Malformed public key, signature or encoding all yield `false`; this
/// function never errors on adversarial input.
pub fn verify_wallet_ownership(public_key: &str, signature: &str, message: &str) -> bool {
    let Ok(pubkey) = Pubkey::from_str(public_key) else {
        log(
            LogTag::Wallet,
            "DEBUG",
            &format!("Ownership check failed: malformed public key {}", public_key)
        );
        return false;
    };

    let Ok(verifying_key) = VerifyingKey::from_bytes(&pubkey.to_bytes()) else {
        return false;
    };

    let Ok(signature_bytes) = bs58::decode(signature).into_vec() else {
        return false;
    };
    let Ok(signature_array) = <[u8; 64]>::try_from(signature_bytes.as_slice()) else {
        return false;
    };
    let signature = Signature::from_bytes(&signature_array);

    verifying_key.verify(message.as_bytes(), &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{ Signer, SigningKey };
    use rand::rngs::OsRng;

    fn signed_challenge(message: &str) -> (String, String) {
        let signing_key = SigningKey::generate(&mut OsRng);
        let signature = signing_key.sign(message.as_bytes());

        let public_key = bs58::encode(signing_key.verifying_key().to_bytes()).into_string();
        let signature = bs58::encode(signature.to_bytes()).into_string();
        (public_key, signature)
    }

    #[test]
    fn test_valid_ownership_proof() {
        let message = "contestpay wallet link challenge: 42";
        let (public_key, signature) = signed_challenge(message);

        assert!(verify_wallet_ownership(&public_key, &signature, message));
    }

    #[test]
    fn test_tampered_message_rejected() {
        let (public_key, signature) = signed_challenge("original challenge");

        assert!(!verify_wallet_ownership(&public_key, &signature, "forged challenge"));
    }

    #[test]
    fn test_mismatched_key_rejected() {
        let message = "challenge";
        let (_, signature) = signed_challenge(message);
        let (other_key, _) = signed_challenge(message);

        assert!(!verify_wallet_ownership(&other_key, &signature, message));
    }

    #[test]
    fn test_malformed_inputs_yield_false() {
        let (public_key, signature) = signed_challenge("challenge");

        assert!(!verify_wallet_ownership("not-base58-0OIl", &signature, "challenge"));
        assert!(!verify_wallet_ownership(&public_key, "too-short", "challenge"));
        assert!(!verify_wallet_ownership("", "", ""));
    }
}
