use crate::error::{Error, Result};
use percent_encoding::percent_decode_str;

/// Decode an object key as it arrives in a bucket notification.
///
/// Notification keys are form-encoded: a literal space arrives as `+` and
/// everything else reserved is percent-encoded. The `+` substitution must
/// happen before percent-decoding so that `%2B` survives as a literal `+`.
pub fn decode_object_key(raw: &str) -> Result<String> {
    let spaced = raw.replace('+', " ");

    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|key| key.into_owned())
        .map_err(|e| Error::KeyDecode(format!("{raw}: {e}")))
}
