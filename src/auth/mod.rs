//! Authentication: challenge packets and the client-side challenge-handler
//! chain (spec.md §4.6).

pub mod handlers;

use crate::error::{ProtocolError, Result};
use crate::packet::{Packet, Value};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
pub use handlers::{ChallengeHandler, HandlerChain};

/// A parsed `challenge` packet (spec.md §4.6).
#[derive(Clone, Debug)]
pub struct Challenge {
    pub server_salt: Vec<u8>,
    pub cipher_caps: Option<Value>,
    pub digest: String,
    pub salt_digest: String,
    pub prompt: Option<String>,
}

impl Challenge {
    pub fn parse(packet: &Packet) -> Result<Self> {
        let server_salt = packet
            .get(1)
            .and_then(Value::as_bytes)
            .ok_or_else(|| ProtocolError::PacketFailure("challenge missing server_salt".into()))?
            .to_vec();
        let cipher_caps = packet.get(2).cloned();
        let digest = packet
            .get(3)
            .and_then(Value::as_str)
            .unwrap_or("hmac:sha256")
            .to_string();
        let salt_digest = packet
            .get(4)
            .and_then(Value::as_str)
            .unwrap_or("sha256")
            .to_string();
        let prompt = packet.get(5).and_then(Value::as_str).map(str::to_string);

        validate_salt_length(&server_salt, &salt_digest)?;

        Ok(Challenge {
            server_salt,
            cipher_caps,
            digest,
            salt_digest,
            prompt,
        })
    }

    /// The `algorithm[:argument]` digest name split apart, e.g.
    /// `hmac:sha256` → `("hmac", Some("sha256"))`.
    pub fn digest_parts(&self) -> (&str, Option<&str>) {
        match self.digest.split_once(':') {
            Some((algo, arg)) => (algo, Some(arg)),
            None => (self.digest.as_str(), None),
        }
    }
}

fn validate_salt_length(salt: &[u8], salt_digest: &str) -> Result<()> {
    if salt_digest == "xor" {
        if !(16..=256).contains(&salt.len()) {
            return Err(ProtocolError::AuthenticationFailed(format!(
                "xor salt must be 16-256 bytes, got {}",
                salt.len()
            )));
        }
    } else if salt.len() != 32 {
        return Err(ProtocolError::AuthenticationFailed(format!(
            "{salt_digest} salt must be exactly 32 bytes, got {}",
            salt.len()
        )));
    }
    Ok(())
}

/// Combines `server_salt` and `client_salt` per `salt_digest` (spec.md
/// §4.6 step 4). Hash digests are computed over `client_salt || server_salt`
/// — client salt first — matching `gendigest(salt_digest, client_salt,
/// server_salt)` in `examples/original_source/xpra/client/base/client_base.py`.
/// The `xor` combination is order-symmetric, so this distinction only
/// matters for the hash digests.
pub fn combine_salt(server_salt: &[u8], client_salt: &[u8], salt_digest: &str) -> Result<Vec<u8>> {
    match salt_digest {
        "xor" => {
            if server_salt.len() != client_salt.len() {
                return Err(ProtocolError::AuthenticationFailed(
                    "xor salt combination requires equal-length salts".into(),
                ));
            }
            Ok(server_salt.iter().zip(client_salt).map(|(a, b)| a ^ b).collect())
        }
        "sha1" => {
            let mut h = Sha1::new();
            Digest::update(&mut h, client_salt);
            Digest::update(&mut h, server_salt);
            Ok(Digest::finalize(h).to_vec())
        }
        "sha256" => {
            let mut h = Sha256::new();
            h.update(client_salt);
            h.update(server_salt);
            Ok(h.finalize().to_vec())
        }
        "sha512" => {
            let mut h = Sha512::new();
            h.update(client_salt);
            h.update(server_salt);
            Ok(h.finalize().to_vec())
        }
        other => Err(ProtocolError::Unsupported(format!("unknown salt_digest {other}"))),
    }
}

/// Computes `digest(password, combined_salt)` (spec.md §4.6 step 5).
pub fn compute_response(algo: &str, arg: Option<&str>, password: &[u8], combined_salt: &[u8]) -> Result<Vec<u8>> {
    match algo {
        "xor" => {
            if password.len() != combined_salt.len() {
                let mut padded = password.to_vec();
                padded.resize(combined_salt.len(), 0);
                return Ok(padded.iter().zip(combined_salt).map(|(a, b)| a ^ b).collect());
            }
            Ok(password.iter().zip(combined_salt).map(|(a, b)| a ^ b).collect())
        }
        "hmac" => match arg.unwrap_or("sha256") {
            "sha1" => {
                let mut mac = Hmac::<Sha1>::new_from_slice(password)
                    .map_err(|e| ProtocolError::AuthenticationFailed(e.to_string()))?;
                mac.update(combined_salt);
                Ok(mac.finalize().into_bytes().to_vec())
            }
            "sha512" => {
                let mut mac = Hmac::<Sha512>::new_from_slice(password)
                    .map_err(|e| ProtocolError::AuthenticationFailed(e.to_string()))?;
                mac.update(combined_salt);
                Ok(mac.finalize().into_bytes().to_vec())
            }
            _ => {
                let mut mac = Hmac::<Sha256>::new_from_slice(password)
                    .map_err(|e| ProtocolError::AuthenticationFailed(e.to_string()))?;
                mac.update(combined_salt);
                Ok(mac.finalize().into_bytes().to_vec())
            }
        },
        other => Err(ProtocolError::Unsupported(format!(
            "digest algorithm {other} requires an external handler (kerberos/gss/u2f)"
        ))),
    }
}

/// Rejects insecure legacy digests unless the caller has opted in
/// (spec.md §4.6 refusal policies).
pub fn check_refusal_policies(
    digest: &str,
    salt_digest: &str,
    is_encrypted_or_localhost: bool,
    legacy_opt_in: bool,
) -> Result<()> {
    if digest == "xor" && !is_encrypted_or_localhost {
        return Err(ProtocolError::Encryption(
            "xor digest requires an encrypted or localhost connection".into(),
        ));
    }
    if (salt_digest == "xor" || salt_digest == "des") && !legacy_opt_in {
        return Err(ProtocolError::IncompatibleVersion(format!(
            "{salt_digest} salt digest requires the legacy opt-in"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge_packet(salt: Vec<u8>, digest: &str, salt_digest: &str) -> Packet {
        vec![
            Value::Str("challenge".to_string()),
            Value::Bytes(salt),
            Value::Bool(false),
            Value::Str(digest.to_string()),
            Value::Str(salt_digest.to_string()),
        ]
    }

    #[test]
    fn parse_rejects_wrong_length_salt() {
        let packet = challenge_packet(vec![0u8; 10], "hmac:sha256", "sha256");
        let err = Challenge::parse(&packet).unwrap_err();
        assert!(matches!(err, ProtocolError::AuthenticationFailed(_)));
    }

    #[test]
    fn parse_accepts_32_byte_sha256_salt() {
        let packet = challenge_packet(vec![7u8; 32], "hmac:sha256", "sha256");
        let challenge = Challenge::parse(&packet).unwrap();
        assert_eq!(challenge.digest_parts(), ("hmac", Some("sha256")));
    }

    #[test]
    fn xor_salt_accepts_variable_length() {
        let packet = challenge_packet(vec![1u8; 64], "xor", "xor");
        assert!(Challenge::parse(&packet).is_ok());
    }

    #[test]
    fn combine_salt_sha256_is_deterministic() {
        let server_salt = [0x01u8; 32];
        let client_salt = [0x02u8; 32];
        let a = combine_salt(&server_salt, &client_salt, "sha256").unwrap();
        let b = combine_salt(&server_salt, &client_salt, "sha256").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn xor_digest_refused_over_plaintext_remote() {
        let err = check_refusal_policies("xor", "sha256", false, false).unwrap_err();
        assert!(matches!(err, ProtocolError::Encryption(_)));
    }

    #[test]
    fn legacy_salt_digest_requires_opt_in() {
        let err = check_refusal_policies("hmac:sha256", "xor", true, false).unwrap_err();
        assert!(matches!(err, ProtocolError::IncompatibleVersion(_)));
        assert!(check_refusal_policies("hmac:sha256", "xor", true, true).is_ok());
    }

    #[test]
    fn compute_response_hmac_sha256_round_trips_same_inputs() {
        let r1 = compute_response("hmac", Some("sha256"), b"pw", b"combined-salt-bytes").unwrap();
        let r2 = compute_response("hmac", Some("sha256"), b"pw", b"combined-salt-bytes").unwrap();
        assert_eq!(r1, r2);
    }

    /// spec.md §8 scenario 4, computed independently of `combine_salt`/
    /// `compute_response` from the pinned formula:
    /// `HMAC_SHA256(secret, SHA256(client_salt || server_salt))`.
    #[test]
    fn pbkdf2_challenge_scenario_matches_pinned_formula() {
        let server_salt = [0x01u8; 32];
        let client_salt = [0x02u8; 32];

        let mut expected_hasher = Sha256::new();
        expected_hasher.update(client_salt);
        expected_hasher.update(server_salt);
        let expected_combined = expected_hasher.finalize().to_vec();

        let combined = combine_salt(&server_salt, &client_salt, "sha256").unwrap();
        assert_eq!(combined, expected_combined);

        let mut expected_mac = Hmac::<Sha256>::new_from_slice(b"secret").unwrap();
        expected_mac.update(&expected_combined);
        let expected_response = expected_mac.finalize().into_bytes().to_vec();

        let response = compute_response("hmac", Some("sha256"), b"secret", &combined).unwrap();
        assert_eq!(response, expected_response);
        assert_eq!(response.len(), 32);
    }
}
