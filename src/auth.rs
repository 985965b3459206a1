/// Upload authorization
///
/// An upload slot allocator and this service share one secret key. The
/// allocator signs `"{path} {length}"` with HMAC-SHA256 and hands the hex
/// digest to the client as the `v` query parameter; here the digest is
/// recomputed and compared in constant time. Nothing is stored between
/// requests.
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Length of a hex-encoded SHA-256 MAC
const TOKEN_HEX_LEN: usize = 64;

/// Verifies upload tokens against the shared secret
#[derive(Clone)]
pub struct UploadAuthorizer {
    key: Vec<u8>,
}

impl fmt::Debug for UploadAuthorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadAuthorizer").finish_non_exhaustive()
    }
}

impl UploadAuthorizer {
    /// Create an authorizer for the given secret key
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    fn mac(&self, path: &str, declared_length: u64) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(path.as_bytes());
        mac.update(b" ");
        mac.update(declared_length.to_string().as_bytes());
        mac
    }

    /// Compute the token the allocator issues for `path` and `declared_length`
    pub fn sign(&self, path: &str, declared_length: u64) -> String {
        hex::encode(self.mac(path, declared_length).finalize().into_bytes())
    }

    /// Check a client-supplied token
    ///
    /// `path` is the client path exactly as it appeared in the request URL
    /// (after percent-decoding), never the resolved storage location.
    pub fn verify(&self, path: &str, declared_length: u64, token: &str) -> bool {
        // Tokens are lowercase hex; anything else can never match.
        if token.len() != TOKEN_HEX_LEN
            || !token.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return false;
        }

        let Ok(supplied) = hex::decode(token) else {
            return false;
        };

        self.mac(path, declared_length)
            .verify_slice(&supplied)
            .is_ok()
    }
}
