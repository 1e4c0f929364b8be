//! Signed bundle framing
//!
//! Signed bundles reserve their last `SIGNATURE_SIZE` bytes for a token that
//! starts with `SIGNATURE_PREFIX` and is padded with NUL bytes.

pub const SIGNATURE_SIZE: usize = 1280;
pub const SIGNATURE_PREFIX: &str = "/* RCSSB */";

/// A bundle split into its code and optional signature token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedBundle<'a> {
    pub code: &'a [u8],
    pub token: Option<String>,
}

impl SignedBundle<'_> {
    pub fn is_signed(&self) -> bool {
        self.token.is_some()
    }
}

pub fn split_signed_bundle(content: &[u8]) -> SignedBundle<'_> {
    if content.len() < SIGNATURE_SIZE {
        return SignedBundle {
            code: content,
            token: None,
        };
    }

    let (code, trailer) = content.split_at(content.len() - SIGNATURE_SIZE);
    match trailer.strip_prefix(SIGNATURE_PREFIX.as_bytes()) {
        Some(rest) => {
            let token: String = String::from_utf8_lossy(rest)
                .chars()
                .filter(|c| *c != '\0')
                .collect();
            SignedBundle {
                code,
                token: Some(token.trim().to_string()),
            }
        }
        None => SignedBundle {
            code: content,
            token: None,
        },
    }
}
