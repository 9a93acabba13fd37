//! OAuth 1.0a user-context signing (HMAC-SHA1).

use crate::config::ApiCredentials;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use rand::distr::Alphanumeric;
use rand::Rng;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

const NONCE_LEN: usize = 32;

/// RFC 3986 encoding: everything except `A-Za-z0-9-._~` is escaped.
fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// `k=v&k=v` with both sides encoded, in the given order.
pub fn form_body(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn nonce() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}

pub fn signature_base(method: &str, url: &str, params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> =
        params.iter().map(|(k, v)| (encode(k), encode(v))).collect();
    encoded.sort();
    let normalized = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        encode(url),
        encode(&normalized)
    )
}

pub fn sign(
    base: &str,
    consumer_secret: &str,
    token_secret: &str,
) -> Result<String, hmac::digest::InvalidLength> {
    let key = format!("{}&{}", encode(consumer_secret), encode(token_secret));
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())?;
    mac.update(base.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// `Authorization` header value for one request.
///
/// `request_params` are the query and form fields sent with the request; they
/// are part of the signature but not of the header.
pub fn authorization_header(
    credentials: &ApiCredentials,
    method: &str,
    url: &str,
    request_params: &[(&str, &str)],
    nonce: &str,
    timestamp: i64,
) -> Result<String, hmac::digest::InvalidLength> {
    let timestamp = timestamp.to_string();
    let oauth = [
        ("oauth_consumer_key", credentials.api_key.as_str()),
        ("oauth_nonce", nonce),
        ("oauth_signature_method", "HMAC-SHA1"),
        ("oauth_timestamp", timestamp.as_str()),
        ("oauth_token", credentials.access_token.as_str()),
        ("oauth_version", "1.0"),
    ];

    let mut all: Vec<(&str, &str)> = request_params.to_vec();
    all.extend_from_slice(&oauth);
    let base = signature_base(method, url, &all);
    let signature = sign(
        &base,
        &credentials.api_secret,
        &credentials.access_token_secret,
    )?;

    let mut fields: Vec<(&str, &str)> = oauth.to_vec();
    fields.push(("oauth_signature", signature.as_str()));
    fields.sort();

    let rendered = fields
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("OAuth {rendered}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://api.twitter.com/1.1/statuses/update.json";
    const STATUS: &str = "Hello Ladies + Gentlemen, a signed OAuth request!";
    const NONCE: &str = "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg";
    const TIMESTAMP: i64 = 1_318_622_958;

    fn credentials() -> ApiCredentials {
        ApiCredentials {
            api_key: "xvz1evFS4wEEPTGEFPHBog".into(),
            api_secret: "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw".into(),
            access_token: "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb".into(),
            access_token_secret: "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE".into(),
            bearer_token: None,
        }
    }

    #[test]
    fn test_signature_base_sorts_and_encodes() {
        let base = signature_base(
            "post",
            URL,
            &[
                ("status", STATUS),
                ("include_entities", "true"),
                ("oauth_version", "1.0"),
                ("oauth_consumer_key", "xvz1evFS4wEEPTGEFPHBog"),
            ],
        );
        assert_eq!(
            base,
            "POST&https%3A%2F%2Fapi.twitter.com%2F1.1%2Fstatuses%2Fupdate.json&\
             include_entities%3Dtrue%26oauth_consumer_key%3Dxvz1evFS4wEEPTGEFPHBog%26\
             oauth_version%3D1.0%26status%3DHello%2520Ladies%2520%252B%2520Gentlemen\
             %252C%2520a%2520signed%2520OAuth%2520request%2521"
        );
    }

    #[test]
    fn test_header_matches_reference_signature() {
        let header = authorization_header(
            &credentials(),
            "POST",
            URL,
            &[("include_entities", "true"), ("status", STATUS)],
            NONCE,
            TIMESTAMP,
        )
        .unwrap();

        assert!(header.starts_with("OAuth oauth_consumer_key=\"xvz1evFS4wEEPTGEFPHBog\", "));
        assert!(header.contains("oauth_signature=\"hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D\""));
        assert!(header.contains(
            "oauth_token=\"370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb\""
        ));
        assert!(!header.contains("status"));
    }

    #[test]
    fn test_form_body_uses_percent_encoding() {
        assert_eq!(
            form_body(&[("track", "apple stock"), ("language", "en")]),
            "track=apple%20stock&language=en"
        );
    }

    #[test]
    fn test_nonce_is_alphanumeric() {
        let n = nonce();
        assert_eq!(n.len(), NONCE_LEN);
        assert!(n.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(n, nonce());
    }
}
