//! Signing/verification key material and the small primitives built on it.
//!
//! Everything that touches raw key bytes or secret comparison lives here so the
//! token, key and session services never handle crypto directly.
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{error, warn};

use crate::error::{AuthError, AuthResult};

/// HMAC secrets shorter than this are rejected at startup.
pub const MIN_HMAC_SECRET_BYTES: usize = 32;

/// Algorithms the token service can be pinned to.
pub fn parse_algorithm(name: &str) -> AuthResult<Algorithm> {
    match name.trim().to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        "PS256" => Ok(Algorithm::PS256),
        "PS384" => Ok(Algorithm::PS384),
        "PS512" => Ok(Algorithm::PS512),
        other => Err(AuthError::configuration(format!(
            "unsupported signing algorithm: {other}"
        ))),
    }
}

pub fn algorithm_name(alg: Algorithm) -> &'static str {
    match alg {
        Algorithm::HS256 => "HS256",
        Algorithm::HS384 => "HS384",
        Algorithm::HS512 => "HS512",
        Algorithm::RS256 => "RS256",
        Algorithm::RS384 => "RS384",
        Algorithm::RS512 => "RS512",
        Algorithm::PS256 => "PS256",
        Algorithm::PS384 => "PS384",
        Algorithm::PS512 => "PS512",
        Algorithm::ES256 => "ES256",
        Algorithm::ES384 => "ES384",
        Algorithm::EdDSA => "EdDSA",
    }
}

fn is_hmac(alg: Algorithm) -> bool {
    matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

fn is_rsa(alg: Algorithm) -> bool {
    matches!(
        alg,
        Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512
    )
}

/// Key material for one pinned algorithm.
///
/// - `encoding` is optional: a verify-only deployment holds just the public key,
///   and any attempt to issue fails with a configuration error.
/// - Key material is intentionally not printable via Debug.
#[derive(Clone)]
pub struct SigningKeys {
    algorithm: Algorithm,
    encoding: Option<EncodingKey>,
    decoding: DecodingKey,
}

impl std::fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("SigningKeys")
            .field("algorithm", &self.algorithm)
            .field("can_sign", &self.encoding.is_some())
            .finish()
    }
}

impl SigningKeys {
    pub fn hmac(algorithm: Algorithm, secret: &[u8]) -> AuthResult<Self> {
        if !is_hmac(algorithm) {
            return Err(AuthError::configuration(format!(
                "{} is not an HMAC algorithm",
                algorithm_name(algorithm)
            )));
        }
        if secret.len() < MIN_HMAC_SECRET_BYTES {
            return Err(AuthError::configuration(format!(
                "HMAC secret must be at least {MIN_HMAC_SECRET_BYTES} bytes"
            )));
        }

        Ok(Self {
            algorithm,
            encoding: Some(EncodingKey::from_secret(secret)),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    /// `private_key_pem` may be PKCS#1 or PKCS#8. When `public_key_pem` is absent
    /// it is derived from the private key.
    pub fn rsa(
        algorithm: Algorithm,
        private_key_pem: Option<&str>,
        public_key_pem: Option<&str>,
    ) -> AuthResult<Self> {
        if !is_rsa(algorithm) {
            return Err(AuthError::configuration(format!(
                "{} is not an RSA algorithm",
                algorithm_name(algorithm)
            )));
        }

        let encoding = private_key_pem
            .map(|pem| {
                EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
                    warn!(error = %e, "failed to parse RSA private key PEM");
                    AuthError::configuration("invalid RSA private key PEM")
                })
            })
            .transpose()?;

        let public_pem = match (public_key_pem, private_key_pem) {
            (Some(pem), _) => pem.to_string(),
            (None, Some(private)) => derive_public_pem(private)?,
            (None, None) => {
                return Err(AuthError::configuration(
                    "RSA signing requires a private or public key PEM",
                ));
            }
        };

        let decoding = DecodingKey::from_rsa_pem(public_pem.as_bytes()).map_err(|e| {
            warn!(error = %e, "failed to parse RSA public key PEM");
            AuthError::configuration("invalid RSA public key PEM")
        })?;

        Ok(Self {
            algorithm,
            encoding,
            decoding,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn can_sign(&self) -> bool {
        self.encoding.is_some()
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    pub fn sign<T: Serialize>(&self, claims: &T) -> AuthResult<String> {
        let encoding = self
            .encoding
            .as_ref()
            .ok_or_else(|| AuthError::configuration("no signing key configured"))?;

        let mut header = Header::new(self.algorithm);
        header.typ = Some("JWT".to_string());
        jsonwebtoken::encode(&header, claims, encoding).map_err(|e| {
            error!(error = %e, "failed to sign JWT");
            AuthError::configuration("token signing failed")
        })
    }
}

fn derive_public_pem(private_pem: &str) -> AuthResult<String> {
    let private = RsaPrivateKey::from_pkcs8_pem(private_pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(private_pem))
        .map_err(|e| {
            warn!(error = %e, "failed to parse RSA private key for public key derivation");
            AuthError::configuration("invalid RSA private key PEM")
        })?;

    RsaPublicKey::from(&private)
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| AuthError::configuration(format!("failed to encode RSA public key: {e}")))
}

/// Read the `alg` a token declares without trusting anything else in it.
///
/// Parsing the raw header (rather than `jsonwebtoken::decode_header`) lets
/// `none` and unknown algorithms surface as a mismatch instead of a parse error.
pub fn peek_algorithm(token: &str) -> AuthResult<String> {
    let mut parts = token.split('.');
    let (Some(header), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::InvalidToken("malformed token"));
    };

    let raw = URL_SAFE_NO_PAD
        .decode(header.trim_end_matches('='))
        .map_err(|_| AuthError::InvalidToken("malformed token"))?;
    let value: serde_json::Value =
        serde_json::from_slice(&raw).map_err(|_| AuthError::InvalidToken("malformed token"))?;

    value
        .get("alg")
        .and_then(|alg| alg.as_str())
        .map(str::to_string)
        .ok_or(AuthError::InvalidToken("malformed token"))
}

/// Constant-time equality for secrets and digests.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// sha256(secret) as lowercase hex. The only form in which secrets are stored.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// `bytes` of OS entropy, URL-safe base64 without padding.
pub fn random_token(bytes: usize) -> AuthResult<String> {
    let mut buf = vec![0u8; bytes];
    getrandom::fill(&mut buf).map_err(|e| {
        error!(error = %e, "OS random source unavailable");
        AuthError::configuration("random source unavailable")
    })?;

    Ok(URL_SAFE_NO_PAD.encode(buf))
}

/// Fresh HMAC secret for bootstrap/dev use.
pub fn generate_secret(bytes: usize) -> AuthResult<String> {
    random_token(bytes.max(MIN_HMAC_SECRET_BYTES))
}

#[derive(Debug, Clone)]
pub struct RsaKeyPair {
    pub private_key_pem: String,
    pub public_key_pem: String,
}

/// Fresh RSA keypair (PKCS#8 private, SPKI public) for bootstrap/dev use.
pub fn generate_rsa_keypair(bits: usize) -> AuthResult<RsaKeyPair> {
    if bits < 2048 {
        return Err(AuthError::configuration("RSA keys must be at least 2048 bits"));
    }

    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, bits)
        .map_err(|e| AuthError::configuration(format!("RSA key generation failed: {e}")))?;

    let private_key_pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| AuthError::configuration(format!("failed to encode RSA private key: {e}")))?
        .to_string();
    let public_key_pem = RsaPublicKey::from(&private)
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| AuthError::configuration(format!("failed to encode RSA public key: {e}")))?;

    Ok(RsaKeyPair {
        private_key_pem,
        public_key_pem,
    })
}
