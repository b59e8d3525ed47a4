//! Shared helpers for the delivery test suites.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Compute the hex HMAC-SHA256 a destination should expect for `body`.
pub fn expected_signature(secret: &str, body: &[u8]) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Build a reqwest client configured like the dispatcher's.
pub fn delivery_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent("vellum-outbox/1.0")
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("client builds")
}
