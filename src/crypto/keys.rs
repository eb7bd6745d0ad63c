// Key generation, signing and address derivation.
//
// An address IS the public key: `X|Y`, the lowercase-hex X and Y coordinates of the
// point on the configured NIST curve, joined by a pipe. Two curves are supported;
// there is no third, so this is a concrete two-variant enum rather than a trait object.

use ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use ecdsa::Signature;
use elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Curve {
    P224,
    P256,
}

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("address string is not of the form X|Y")]
    MalformedAddress,
    #[error("invalid hex in address coordinate")]
    InvalidHex,
    #[error("coordinates do not lie on the configured curve")]
    NotOnCurve,
    #[error("signature is not valid ASN.1 DER SEQUENCE(r,s)")]
    MalformedSignature,
}

#[derive(Clone)]
enum SigningKey {
    P224(p224::ecdsa::SigningKey),
    P256(p256::ecdsa::SigningKey),
}

/// An owned private/public key pair over a configured curve.
#[derive(Clone)]
pub struct Key {
    curve: Curve,
    signing_key: SigningKey,
}

impl Key {
    pub fn generate(curve: Curve) -> Self {
        let signing_key = match curve {
            Curve::P224 => SigningKey::P224(p224::ecdsa::SigningKey::random(&mut OsRng)),
            Curve::P256 => SigningKey::P256(p256::ecdsa::SigningKey::random(&mut OsRng)),
        };
        Key { curve, signing_key }
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }

    /// `X.hex|Y.hex` of the public key — both address and public key.
    pub fn to_address(&self) -> String {
        match &self.signing_key {
            SigningKey::P224(sk) => {
                let point = sk.verifying_key().to_encoded_point(false);
                let x = point.x().expect("uncompressed point has x");
                let y = point.y().expect("uncompressed point has y");
                format!("{}|{}", hex::encode(x), hex::encode(y))
            }
            SigningKey::P256(sk) => {
                let point = sk.verifying_key().to_encoded_point(false);
                let x = point.x().expect("uncompressed point has x");
                let y = point.y().expect("uncompressed point has y");
                format!("{}|{}", hex::encode(x), hex::encode(y))
            }
        }
    }

    /// Sign a pre-hashed 32-byte digest. Returns lowercase-hex ASN.1 DER.
    pub fn sign(&self, prehash: &[u8]) -> String {
        match &self.signing_key {
            SigningKey::P224(sk) => {
                let sig: Signature<p224::NistP224> = sk.sign_prehash(prehash).expect("sign");
                hex::encode(sig.to_der().as_bytes())
            }
            SigningKey::P256(sk) => {
                let sig: Signature<p256::NistP256> = sk.sign_prehash(prehash).expect("sign");
                hex::encode(sig.to_der().as_bytes())
            }
        }
    }
}

/// Parse an `X|Y` address string into a public key for the given curve.
/// A malformed string is not an error to the caller of `verify` — it fails closed.
fn load_public_key(address: &str, curve: Curve) -> Result<VerifyingKeyAny, KeyError> {
    let (x_hex, y_hex) = address.split_once('|').ok_or(KeyError::MalformedAddress)?;
    let x = hex::decode(x_hex).map_err(|_| KeyError::InvalidHex)?;
    let y = hex::decode(y_hex).map_err(|_| KeyError::InvalidHex)?;

    match curve {
        Curve::P224 => {
            let point = elliptic_curve::sec1::EncodedPoint::<p224::NistP224>::from_affine_coordinates(
                elliptic_curve::generic_array::GenericArray::from_slice(&x),
                elliptic_curve::generic_array::GenericArray::from_slice(&y),
                false,
            );
            let vk = p224::ecdsa::VerifyingKey::from_encoded_point(&point)
                .map_err(|_| KeyError::NotOnCurve)?;
            Ok(VerifyingKeyAny::P224(vk))
        }
        Curve::P256 => {
            let point = elliptic_curve::sec1::EncodedPoint::<p256::NistP256>::from_affine_coordinates(
                elliptic_curve::generic_array::GenericArray::from_slice(&x),
                elliptic_curve::generic_array::GenericArray::from_slice(&y),
                false,
            );
            let vk = p256::ecdsa::VerifyingKey::from_encoded_point(&point)
                .map_err(|_| KeyError::NotOnCurve)?;
            Ok(VerifyingKeyAny::P256(vk))
        }
    }
}

enum VerifyingKeyAny {
    P224(p224::ecdsa::VerifyingKey),
    P256(p256::ecdsa::VerifyingKey),
}

/// Verify `signature_hex` (ASN.1 DER, hex-encoded) over `prehash` against `address`
/// on `curve`. Any malformed input — bad address shape, bad hex, bad DER, trailing
/// bytes, wrong curve point — fails closed by returning `false`.
pub fn verify(address: &str, curve: Curve, prehash: &[u8], signature_hex: &str) -> bool {
    let verifying_key = match load_public_key(address, curve) {
        Ok(vk) => vk,
        Err(_) => return false,
    };
    let sig_bytes = match hex::decode(signature_hex) {
        Ok(b) => b,
        Err(_) => return false,
    };

    match verifying_key {
        VerifyingKeyAny::P224(vk) => {
            let sig = match Signature::<p224::NistP224>::from_der(&sig_bytes) {
                Ok(s) => s,
                Err(_) => return false,
            };
            vk.verify_prehash(prehash, &sig).is_ok()
        }
        VerifyingKeyAny::P256(vk) => {
            let sig = match Signature::<p256::NistP256>::from_der(&sig_bytes) {
                Ok(s) => s,
                Err(_) => return false,
            };
            vk.verify_prehash(prehash, &sig).is_ok()
        }
    }
}
