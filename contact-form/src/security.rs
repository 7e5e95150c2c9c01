use crate::request::SubmittedData;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const NONCE_SECRET_NAME: &str = "contact-form-nonce-key";
pub const HONEYPOT_FIELD_NAME: &str = "required";
pub const AJAX_KEY_FIELD_NAME: &str = "_ajax_key";

const DEFAULT_NONCE_LIFETIME_SECS: u64 = 86_400;
const NONCE_LENGTH: usize = 20;

/// Signing key for form nonces as stored in the secret repository.
#[derive(Deserialize)]
pub struct NonceKey {
    #[serde(rename = "NONCE_KEY")]
    pub key: String,
}

/// Issues and checks time-limited nonces bound to an action name.
///
/// Time is split into ticks of half the lifetime. A nonce stays valid during
/// the tick it was created in and the following one.
#[derive(Clone)]
pub struct NonceSigner {
    key: Vec<u8>,
    lifetime_secs: u64,
}

impl NonceSigner {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            lifetime_secs: DEFAULT_NONCE_LIFETIME_SECS,
        }
    }

    pub fn with_lifetime(self, lifetime_secs: u64) -> Self {
        Self {
            lifetime_secs: lifetime_secs.max(2),
            ..self
        }
    }

    pub fn create(&self, action: &str) -> String {
        self.create_at(action, now())
    }

    pub fn create_at(&self, action: &str, timestamp: u64) -> String {
        self.sign(action, self.tick(timestamp))
    }

    pub fn verify(&self, token: &str, action: &str) -> bool {
        self.verify_at(token, action, now())
    }

    pub fn verify_at(&self, token: &str, action: &str, timestamp: u64) -> bool {
        let tick = self.tick(timestamp);
        [tick, tick.saturating_sub(1)].into_iter().any(|tick| {
            self.sign(action, tick)
                .as_bytes()
                .ct_eq(token.as_bytes())
                .into()
        })
    }

    fn tick(&self, timestamp: u64) -> u64 {
        timestamp.div_ceil(self.lifetime_secs / 2)
    }

    fn sign(&self, action: &str, tick: u64) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(format!("{tick}|{action}").as_bytes());
        let mut token = hex::encode(mac.finalize().into_bytes());
        token.truncate(NONCE_LENGTH);
        token
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

/// Anti-spam keys and checks for a single form.
#[derive(Clone)]
pub struct SecurityHelper {
    nonce_field: String,
    action: String,
    ajax_key: String,
    signer: NonceSigner,
}

/// Hidden inputs that must accompany every rendered form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityFields {
    pub nonce_field: String,
    pub nonce: String,
    pub honeypot_field: &'static str,
    pub ajax_key_field: &'static str,
    pub ajax_key: String,
}

impl SecurityHelper {
    pub fn new(form_id: &str, signer: NonceSigner) -> Self {
        let key = form_id.replace('-', "_");
        Self {
            nonce_field: format!("{key}_nonce"),
            action: format!("send-{key}"),
            ajax_key: format!("{key}_send"),
            signer,
        }
    }

    pub fn nonce_field(&self) -> &str {
        &self.nonce_field
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Identifier routing a submission to this form.
    pub fn ajax_key(&self) -> &str {
        &self.ajax_key
    }

    pub fn honeypot_field(&self) -> &'static str {
        HONEYPOT_FIELD_NAME
    }

    pub fn create_nonce(&self) -> String {
        self.signer.create(&self.action)
    }

    pub fn security_fields(&self) -> SecurityFields {
        SecurityFields {
            nonce_field: self.nonce_field.clone(),
            nonce: self.create_nonce(),
            honeypot_field: HONEYPOT_FIELD_NAME,
            ajax_key_field: AJAX_KEY_FIELD_NAME,
            ajax_key: self.ajax_key.clone(),
        }
    }

    pub fn verify(&self, data: &SubmittedData) -> Result<(), SecurityFailure> {
        let Some(nonce) = data.get(&self.nonce_field) else {
            return Err(SecurityFailure::MissingNonce);
        };
        if !self.signer.verify(nonce, &self.action) {
            return Err(SecurityFailure::InvalidNonce);
        }
        if !data.is_blank(HONEYPOT_FIELD_NAME) {
            return Err(SecurityFailure::HoneypotFilled);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityFailure {
    MissingNonce,
    InvalidNonce,
    HoneypotFilled,
}

impl std::fmt::Display for SecurityFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityFailure::MissingNonce => write!(f, "Missing nonce"),
            SecurityFailure::InvalidNonce => write!(f, "Invalid or expired nonce"),
            SecurityFailure::HoneypotFilled => write!(f, "Honeypot field was filled"),
        }
    }
}

impl std::error::Error for SecurityFailure {}

#[cfg(test)]
mod tests {
    use super::{NonceSigner, SecurityFailure, SecurityHelper, HONEYPOT_FIELD_NAME};
    use crate::request::SubmittedData;
    use googletest::prelude::*;

    const KEY: &str = "arbitrary nonce key";
    const TIMESTAMP: u64 = 1_700_000_000;

    fn subject() -> SecurityHelper {
        SecurityHelper::new("contact-form", NonceSigner::new(KEY))
    }

    #[test]
    fn derives_keys_from_form_id() -> Result<()> {
        let subject = subject();

        verify_that!(subject.nonce_field(), eq("contact_form_nonce"))?;
        verify_that!(subject.action(), eq("send-contact_form"))?;
        verify_that!(subject.ajax_key(), eq("contact_form_send"))
    }

    #[test]
    fn nonce_verifies_for_same_action() -> Result<()> {
        let signer = NonceSigner::new(KEY);
        let nonce = signer.create_at("send-contact", TIMESTAMP);

        verify_that!(signer.verify_at(&nonce, "send-contact", TIMESTAMP), eq(true))
    }

    #[test]
    fn nonce_does_not_verify_for_other_action() -> Result<()> {
        let signer = NonceSigner::new(KEY);
        let nonce = signer.create_at("send-contact", TIMESTAMP);

        verify_that!(signer.verify_at(&nonce, "send-other", TIMESTAMP), eq(false))
    }

    #[test]
    fn nonce_does_not_verify_with_other_key() -> Result<()> {
        let nonce = NonceSigner::new(KEY).create_at("send-contact", TIMESTAMP);

        verify_that!(
            NonceSigner::new("another key").verify_at(&nonce, "send-contact", TIMESTAMP),
            eq(false)
        )
    }

    #[test]
    fn nonce_remains_valid_in_following_tick() -> Result<()> {
        let signer = NonceSigner::new(KEY).with_lifetime(100);
        let nonce = signer.create_at("send-contact", 1_000);

        verify_that!(signer.verify_at(&nonce, "send-contact", 1_050), eq(true))
    }

    #[test]
    fn nonce_expires_after_two_ticks() -> Result<()> {
        let signer = NonceSigner::new(KEY).with_lifetime(100);
        let nonce = signer.create_at("send-contact", 1_000);

        verify_that!(signer.verify_at(&nonce, "send-contact", 1_101), eq(false))
    }

    #[test]
    fn rejects_missing_nonce() -> Result<()> {
        let data = SubmittedData::default();

        verify_that!(subject().verify(&data), err(eq(SecurityFailure::MissingNonce)))
    }

    #[test]
    fn rejects_tampered_nonce() -> Result<()> {
        let subject = subject();
        let mut nonce = subject.create_nonce();
        nonce.replace_range(0..1, if nonce.starts_with('0') { "1" } else { "0" });
        let data: SubmittedData = [(subject.nonce_field(), nonce.as_str())]
            .into_iter()
            .collect();

        verify_that!(subject.verify(&data), err(eq(SecurityFailure::InvalidNonce)))
    }

    #[test]
    fn rejects_filled_honeypot_with_valid_nonce() -> Result<()> {
        let subject = subject();
        let nonce = subject.create_nonce();
        let data: SubmittedData = [
            (subject.nonce_field(), nonce.as_str()),
            (HONEYPOT_FIELD_NAME, "I am a bot"),
        ]
        .into_iter()
        .collect();

        verify_that!(
            subject.verify(&data),
            err(eq(SecurityFailure::HoneypotFilled))
        )
    }

    #[test]
    fn accepts_valid_nonce_and_empty_honeypot() -> Result<()> {
        let subject = subject();
        let nonce = subject.create_nonce();
        let data: SubmittedData = [
            (subject.nonce_field(), nonce.as_str()),
            (HONEYPOT_FIELD_NAME, ""),
        ]
        .into_iter()
        .collect();

        verify_that!(subject.verify(&data), ok(anything()))
    }

    #[test]
    fn security_fields_carry_fresh_nonce_and_ajax_key() -> Result<()> {
        let subject = subject();
        let fields = subject.security_fields();

        verify_that!(fields.ajax_key, eq("contact_form_send"))?;
        verify_that!(
            NonceSigner::new(KEY).verify(&fields.nonce, "send-contact_form"),
            eq(true)
        )
    }
}
