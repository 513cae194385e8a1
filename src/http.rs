//! Shared HTTP helpers: client construction and path-segment encoding.

use std::time::Duration;

use anyhow::Result;

/// A client with its own request timeout. Each stage builds one so that a
/// slow collaborator only ever spends its own budget.
pub fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("amber-sync/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// URI-encode a string per RFC 3986, leaving only unreserved characters:
/// `A-Z a-z 0-9 - _ . ~`
pub fn uri_encode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

/// Encode each `/`-separated segment of a path, keeping the separators.
pub fn encode_path(path: &str) -> String {
    path.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}

/// Response body cut to a loggable length.
pub async fn body_excerpt(resp: reqwest::Response) -> String {
    resp.text()
        .await
        .unwrap_or_default()
        .chars()
        .take(300)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_reserved_characters() {
        assert_eq!(uri_encode("NCMC/2041 a"), "NCMC%2F2041%20a");
        assert_eq!(uri_encode("a-b_c.d~e"), "a-b_c.d~e");
    }

    #[test]
    fn path_keeps_separators() {
        assert_eq!(encode_path("feeds/missing children.json"), "feeds/missing%20children.json");
    }
}
