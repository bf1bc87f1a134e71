//! Request signer
//!
//! Builds the canonical sign strings for login and control requests and hashes
//! them with MD5. Every signature is a 32 character lowercase hex digest.

use md5::{Digest, Md5};

use crate::codec::url_encode;
use crate::{protocol, OutputPower};

/// MD5 digest of `bytes` as lowercase hex
pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// Computes login and control signatures with a shared secret
#[derive(Debug, Clone, Copy)]
pub struct Signer<'a> {
    secret: &'a str,
}

impl Default for Signer<'static> {
    fn default() -> Self {
        Self::new(protocol::SIGNATURE_KEY)
    }
}

impl<'a> Signer<'a> {
    pub fn new(secret: &'a str) -> Self {
        Self { secret }
    }

    /// One-way hash sent in place of the password
    pub fn password_hash(&self, password: &str) -> String {
        md5_hex(password.as_bytes())
    }

    /// Canonical string signed at login
    ///
    /// Fields are in alphabetical order with the email percent-encoded.
    pub fn login_sign_string(&self, email: &str, password_hash: &str) -> String {
        format!(
            "appVersion={}&email={}&password={}&phoneModel={}&phoneOs={}{}",
            protocol::APP_VERSION,
            url_encode(email),
            password_hash,
            protocol::PHONE_MODEL,
            protocol::PHONE_OS,
            self.secret
        )
    }

    pub fn sign_login(&self, email: &str, password_hash: &str) -> String {
        md5_hex(self.login_sign_string(email, password_hash).as_bytes())
    }

    /// Canonical string signed for an output power change
    ///
    /// The device serial is percent-encoded here even though the request body
    /// carries it raw; the server verifies against this exact form.
    pub fn control_sign_string(&self, device_sn: &str, output: OutputPower) -> String {
        format!(
            "deviceSn={}&outputPower={}{}",
            url_encode(device_sn),
            output.percent(),
            self.secret
        )
    }

    pub fn sign_control(&self, device_sn: &str, output: OutputPower) -> String {
        md5_hex(self.control_sign_string(device_sn, output).as_bytes())
    }
}
