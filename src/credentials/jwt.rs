//! JWT payload decoding
//!
//! Only the `exp` claim is read. Signatures are the server's business.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<i64>,
}

/// Decode the `exp` claim (Unix seconds) of a JWT
///
/// Returns `None` when the token is not a three-part JWT, the payload is not
/// base64url JSON, or it has no numeric `exp`.
#[must_use]
pub fn expiry(token: &str) -> Option<i64> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice::<Claims>(&bytes).ok()?.exp
}

/// Whether `token` expires within `threshold_secs` of `now`
///
/// An undecodable expiry is never near.
#[must_use]
pub fn expires_within(token: &str, threshold_secs: i64, now: i64) -> bool {
    expiry(token).is_some_and(|exp| exp - now <= threshold_secs)
}
