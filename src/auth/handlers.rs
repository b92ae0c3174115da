//! Challenge handlers (spec.md §4.6 step 3): pluggable password sources
//! consulted in order until one can answer a given challenge.

use crate::error::{ProtocolError, Result};

/// A single password source. Implementations wrap a file, an environment
/// variable, a TTY/GUI prompt, a Kerberos ticket, a GSSAPI token, a U2F
/// signature, or a secret embedded in the connection URI.
pub trait ChallengeHandler: std::fmt::Debug {
    /// The digest prefix this handler declares support for (e.g. `"kerberos"`,
    /// `"gss"`, `"u2f"`), or `None` for a generic password source that can
    /// answer any digest.
    fn digest_prefix(&self) -> Option<&str>;

    /// Produces the password/secret material for this challenge, or `None`
    /// if this handler has nothing to offer (caller falls through to the
    /// next handler in the chain).
    fn password(&self) -> Option<Vec<u8>>;
}

#[derive(Debug)]
pub struct FileHandler {
    pub path: std::path::PathBuf,
}

impl ChallengeHandler for FileHandler {
    fn digest_prefix(&self) -> Option<&str> {
        None
    }

    fn password(&self) -> Option<Vec<u8>> {
        std::fs::read(&self.path).ok().map(|mut b| {
            while b.last() == Some(&b'\n') || b.last() == Some(&b'\r') {
                b.pop();
            }
            b
        })
    }
}

#[derive(Debug)]
pub struct EnvHandler {
    pub var: String,
}

impl ChallengeHandler for EnvHandler {
    fn digest_prefix(&self) -> Option<&str> {
        None
    }

    fn password(&self) -> Option<Vec<u8>> {
        std::env::var(&self.var).ok().map(String::into_bytes)
    }
}

/// A password supplied ahead of time (e.g. already prompted for by an
/// embedder's GUI/TTY layer; this core does not draw any UI itself).
#[derive(Debug)]
pub struct PromptHandler {
    pub password: Option<Vec<u8>>,
}

impl ChallengeHandler for PromptHandler {
    fn digest_prefix(&self) -> Option<&str> {
        None
    }

    fn password(&self) -> Option<Vec<u8>> {
        self.password.clone()
    }
}

/// A secret obtained out of band (Kerberos ticket, GSSAPI token, U2F
/// signature, URI-embedded secret). This core has no external dependency
/// for any of the four; it models all of them as "caller already produced
/// the bytes" handlers keyed by their declared digest prefix.
#[derive(Debug)]
pub struct ExternalHandler {
    pub prefix: &'static str,
    pub secret: Option<Vec<u8>>,
}

impl ChallengeHandler for ExternalHandler {
    fn digest_prefix(&self) -> Option<&str> {
        Some(self.prefix)
    }

    fn password(&self) -> Option<Vec<u8>> {
        self.secret.clone()
    }
}

/// The ordered handler chain a client consults per challenge (spec.md
/// §4.6 steps 2-3).
#[derive(Debug, Default)]
pub struct HandlerChain {
    handlers: Vec<Box<dyn ChallengeHandler>>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handler: Box<dyn ChallengeHandler>) {
        self.handlers.push(handler);
    }

    /// Picks the first handler whose `digest_prefix` matches `digest_algo`;
    /// falls back to the first handler in the chain if none declares a
    /// matching prefix (spec.md §4.6 step 2).
    pub fn select(&self, digest_algo: &str) -> Option<&dyn ChallengeHandler> {
        self.handlers
            .iter()
            .find(|h| h.digest_prefix() == Some(digest_algo))
            .or_else(|| self.handlers.first())
            .map(|b| b.as_ref())
    }

    /// Walks the chain, asking each selected-or-fallback candidate in turn
    /// for a password, until one answers (spec.md §4.6: "if the handler
    /// chain is exhausted without a response, quit with password-required").
    pub fn resolve(&self, digest_algo: &str) -> Result<Vec<u8>> {
        if let Some(h) = self.select(digest_algo) {
            if let Some(pw) = h.password() {
                return Ok(pw);
            }
        }
        for h in &self.handlers {
            if let Some(pw) = h.password() {
                return Ok(pw);
            }
        }
        Err(ProtocolError::PasswordRequired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_prefers_matching_digest_prefix() {
        let mut chain = HandlerChain::new();
        chain.push(Box::new(PromptHandler {
            password: Some(b"generic".to_vec()),
        }));
        chain.push(Box::new(ExternalHandler {
            prefix: "kerberos",
            secret: Some(b"krb-ticket".to_vec()),
        }));
        let resolved = chain.resolve("kerberos").unwrap();
        assert_eq!(resolved, b"krb-ticket");
    }

    #[test]
    fn resolve_falls_back_to_first_handler() {
        let mut chain = HandlerChain::new();
        chain.push(Box::new(PromptHandler {
            password: Some(b"fallback".to_vec()),
        }));
        let resolved = chain.resolve("hmac").unwrap();
        assert_eq!(resolved, b"fallback");
    }

    #[test]
    fn resolve_fails_when_chain_has_no_answer() {
        let mut chain = HandlerChain::new();
        chain.push(Box::new(PromptHandler { password: None }));
        let err = chain.resolve("hmac").unwrap_err();
        assert!(matches!(err, ProtocolError::PasswordRequired));
    }

    #[test]
    fn env_handler_reads_variable() {
        std::env::set_var("XPRA_TEST_AUTH_PW", "from-env");
        let handler = EnvHandler {
            var: "XPRA_TEST_AUTH_PW".to_string(),
        };
        assert_eq!(handler.password(), Some(b"from-env".to_vec()));
        std::env::remove_var("XPRA_TEST_AUTH_PW");
    }
}
