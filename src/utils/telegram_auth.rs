use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};
use crate::models::telegram::TelegramIdentity;

type HmacSha256 = Hmac<Sha256>;

/// Parses an initData string into percent-decoded key-value pairs, sorted by
/// key. A key occurring more than once keeps its last value; field extraction
/// reads from the same map, so both sides see the same value.
pub fn parse_init_data(init_data: &str) -> BTreeMap<String, String> {
    url::form_urlencoded::parse(init_data.as_bytes())
        .into_owned()
        .collect()
}

/// Canonical check-string: `key=value` lines joined with `\n`, keys ascending.
pub fn data_check_string(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Signs a check-string the way the Telegram client does: the bot token is
/// first keyed under the literal string "WebAppData", and the result keys the
/// HMAC over the check-string. Returns lowercase hex.
pub fn compute_hash(check_string: &str, bot_token: &str) -> Result<String> {
    let mut key_mac = HmacSha256::new_from_slice(b"WebAppData")
        .map_err(|e| Error::Internal(format!("HMAC key setup failed: {}", e)))?;
    key_mac.update(bot_token.as_bytes());
    let secret_key = key_mac.finalize().into_bytes();

    let mut mac = HmacSha256::new_from_slice(&secret_key)
        .map_err(|e| Error::Internal(format!("HMAC key setup failed: {}", e)))?;
    mac.update(check_string.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies that `init_data` was produced by Telegram for the bot owning
/// `bot_token`. On success returns the signable fields with `hash` removed.
pub fn verify_init_data(init_data: &str, bot_token: &str) -> Result<BTreeMap<String, String>> {
    let mut fields = parse_init_data(init_data);
    let claimed = fields
        .remove("hash")
        .ok_or(Error::MissingSignature)?
        .to_ascii_lowercase();

    let expected = compute_hash(&data_check_string(&fields), bot_token)?;

    if bool::from(expected.as_bytes().ct_eq(claimed.as_bytes())) {
        Ok(fields)
    } else {
        Err(Error::InvalidSignature)
    }
}

/// Pulls the structured identity out of an already-verified payload.
pub fn extract_identity(fields: &BTreeMap<String, String>) -> Result<TelegramIdentity> {
    let raw = fields.get("user").ok_or(Error::MissingUserData)?;
    serde_json::from_str(raw).map_err(Error::MalformedUserData)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT_TOKEN: &str = "test-secret";

    fn encode(fields: &[(&str, &str)]) -> String {
        fields
            .iter()
            .map(|(k, v)| {
                format!(
                    "{}={}",
                    k,
                    url::form_urlencoded::byte_serialize(v.as_bytes()).collect::<String>()
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    fn signed(fields: &[(&str, &str)]) -> String {
        let map: BTreeMap<String, String> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let hash = compute_hash(&data_check_string(&map), BOT_TOKEN).unwrap();
        format!("{}&hash={}", encode(fields), hash)
    }

    #[test]
    fn round_trip_verifies() {
        let init_data = signed(&[
            ("auth_date", "1700000000"),
            ("query_id", "AAA"),
            ("user", r#"{"id":785921635,"username":"root_admin"}"#),
        ]);

        let fields = verify_init_data(&init_data, BOT_TOKEN).expect("valid payload");
        assert_eq!(fields.get("query_id").map(String::as_str), Some("AAA"));

        let identity = extract_identity(&fields).expect("identity");
        assert_eq!(identity.id, 785921635);
        assert_eq!(identity.username.as_deref(), Some("root_admin"));
        assert!(identity.first_name.is_none());
    }

    #[test]
    fn verification_is_deterministic() {
        let init_data = signed(&[("auth_date", "1700000000"), ("query_id", "AAA")]);
        assert!(verify_init_data(&init_data, BOT_TOKEN).is_ok());
        assert!(verify_init_data(&init_data, BOT_TOKEN).is_ok());
    }

    #[test]
    fn flipped_field_value_is_rejected() {
        let init_data = signed(&[("auth_date", "1700000000"), ("query_id", "AAA")]);
        let tampered = init_data.replace("AAA", "AAB");
        assert!(matches!(
            verify_init_data(&tampered, BOT_TOKEN),
            Err(Error::InvalidSignature)
        ));
    }

    #[test]
    fn replaced_hash_is_rejected() {
        let encoded = encode(&[("auth_date", "1700000000"), ("query_id", "AAA")]);

        let zeroed = format!("{}&hash={}", encoded, "0".repeat(64));
        assert!(matches!(
            verify_init_data(&zeroed, BOT_TOKEN),
            Err(Error::InvalidSignature)
        ));

        // A correctly computed hash over different fields still mismatches.
        let other_map: BTreeMap<String, String> =
            [("auth_date".to_string(), "1700000001".to_string())].into();
        let other_hash = compute_hash(&data_check_string(&other_map), BOT_TOKEN).unwrap();
        let forged = format!("{}&hash={}", encoded, other_hash);
        assert!(matches!(
            verify_init_data(&forged, BOT_TOKEN),
            Err(Error::InvalidSignature)
        ));
    }

    #[test]
    fn wrong_bot_token_is_rejected() {
        let init_data = signed(&[("auth_date", "1700000000")]);
        assert!(matches!(
            verify_init_data(&init_data, "another-bot-token"),
            Err(Error::InvalidSignature)
        ));
    }

    #[test]
    fn uppercase_claimed_hash_is_accepted() {
        let map: BTreeMap<String, String> =
            [("auth_date".to_string(), "1700000000".to_string())].into();
        let hash = compute_hash(&data_check_string(&map), BOT_TOKEN).unwrap();
        let init_data = format!("auth_date=1700000000&hash={}", hash.to_ascii_uppercase());
        assert!(verify_init_data(&init_data, BOT_TOKEN).is_ok());
    }

    #[test]
    fn missing_hash_is_a_distinct_error() {
        assert!(matches!(
            verify_init_data("auth_date=1700000000&query_id=AAA", BOT_TOKEN),
            Err(Error::MissingSignature)
        ));
    }

    #[test]
    fn empty_value_is_kept_in_check_string() {
        let map: BTreeMap<String, String> = [
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), String::new()),
        ]
        .into();
        assert_eq!(data_check_string(&map), "a=1\nb=");

        let init_data = signed(&[("a", "1"), ("b", "")]);
        let fields = verify_init_data(&init_data, BOT_TOKEN).unwrap();
        assert_eq!(fields.get("b").map(String::as_str), Some(""));
    }

    #[test]
    fn duplicate_key_keeps_last_value_everywhere() {
        // Sign over the surviving value only; the duplicate in the wire form
        // must collapse the same way during verification.
        let map: BTreeMap<String, String> = [
            ("auth_date".to_string(), "1700000000".to_string()),
            ("query_id".to_string(), "second".to_string()),
        ]
        .into();
        let hash = compute_hash(&data_check_string(&map), BOT_TOKEN).unwrap();
        let init_data = format!(
            "auth_date=1700000000&query_id=first&query_id=second&hash={}",
            hash
        );
        let fields = verify_init_data(&init_data, BOT_TOKEN).unwrap();
        assert_eq!(fields.get("query_id").map(String::as_str), Some("second"));
    }

    #[test]
    fn check_string_is_key_sorted() {
        let map: BTreeMap<String, String> = [
            ("query_id".to_string(), "AAA".to_string()),
            ("auth_date".to_string(), "1".to_string()),
        ]
        .into();
        assert_eq!(data_check_string(&map), "auth_date=1\nquery_id=AAA");
    }

    #[test]
    fn missing_user_field() {
        let fields: BTreeMap<String, String> = [("auth_date".to_string(), "1".to_string())].into();
        assert!(matches!(
            extract_identity(&fields),
            Err(Error::MissingUserData)
        ));
    }

    #[test]
    fn malformed_user_json() {
        let fields: BTreeMap<String, String> =
            [("user".to_string(), "{not json".to_string())].into();
        assert!(matches!(
            extract_identity(&fields),
            Err(Error::MalformedUserData(_))
        ));
    }

    #[test]
    fn identity_passes_optional_fields_through() {
        let fields: BTreeMap<String, String> = [(
            "user".to_string(),
            r#"{"id":42,"first_name":"Ada","language_code":"en","is_premium":true}"#.to_string(),
        )]
        .into();
        let identity = extract_identity(&fields).unwrap();
        assert_eq!(identity.id, 42);
        assert_eq!(identity.first_name.as_deref(), Some("Ada"));
        assert_eq!(identity.language_code.as_deref(), Some("en"));
        assert!(identity.username.is_none());
    }
}
