//! Conversions between Instagram shortcodes, URLs and numeric ids.
//!
//! These are pure functions: no engine round trip is needed.

use url::Url;

use crate::error::{EngineError, EngineResult};

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Shortcodes longer than this carry a suffix that is not part of the pk.
const CODE_PK_LEN: usize = 11;

fn alphabet_index(c: u8) -> Option<u128> {
    ALPHABET.iter().position(|&a| a == c).map(|i| i as u128)
}

/// Decode a shortcode (`B1LbfVPlwIA`) into the media pk.
pub fn media_pk_from_code(code: &str) -> EngineResult<String> {
    let code = code.trim();
    if code.is_empty() {
        return Err(EngineError::invalid_argument("empty media code"));
    }

    let mut pk: u128 = 0;
    for c in code.bytes().take(CODE_PK_LEN) {
        let idx = alphabet_index(c).ok_or_else(|| {
            EngineError::invalid_argument(format!("invalid character in media code '{code}'"))
        })?;
        pk = pk * 64 + idx;
    }
    Ok(pk.to_string())
}

/// Encode a media pk into its shortcode.
pub fn code_from_media_pk(media_pk: &str) -> EngineResult<String> {
    let mut pk: u128 = media_pk_from_id(media_pk)
        .parse()
        .map_err(|_| EngineError::invalid_argument(format!("invalid media pk '{media_pk}'")))?;

    if pk == 0 {
        return Ok((ALPHABET[0] as char).to_string());
    }

    let mut code = Vec::new();
    while pk > 0 {
        code.push(ALPHABET[(pk % 64) as usize]);
        pk /= 64;
    }
    code.reverse();
    Ok(String::from_utf8_lossy(&code).into_owned())
}

/// Media pk from a post URL (`https://www.instagram.com/p/B1LbfVPlwIA/`).
pub fn media_pk_from_url(url: &str) -> EngineResult<String> {
    let code = last_path_segment(url)?;
    media_pk_from_code(&code)
}

/// Story pk from a story URL (`https://www.instagram.com/stories/user/2581281926631793076/`).
pub fn story_pk_from_url(url: &str) -> EngineResult<String> {
    let segment = last_path_segment(url)?;
    if segment.bytes().all(|b| b.is_ascii_digit()) {
        Ok(segment)
    } else {
        Err(EngineError::invalid_argument(format!(
            "story url does not end with a story pk: {url}"
        )))
    }
}

/// Media pk part of a full media id (`{media_pk}_{owner_pk}`).
#[must_use]
pub fn media_pk_from_id(media_id: &str) -> &str {
    media_id.split('_').next().unwrap_or(media_id)
}

fn last_path_segment(raw: &str) -> EngineResult<String> {
    let url = Url::parse(raw.trim())
        .map_err(|e| EngineError::invalid_argument(format!("invalid url '{raw}': {e}")))?;
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)
        .ok_or_else(|| EngineError::invalid_argument(format!("url has no path: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_shortcode() {
        assert_eq!(media_pk_from_code("B1LbfVPlwIA").unwrap(), "2110901750722920960");
        assert_eq!(media_pk_from_code("B-fKL9qpeab").unwrap(), "2278584739065882267");
    }

    #[test]
    fn encode_is_inverse_of_decode() {
        for pk in ["2110901750722920960", "2278584739065882267", "1", "64"] {
            let code = code_from_media_pk(pk).unwrap();
            assert_eq!(media_pk_from_code(&code).unwrap(), pk);
        }
    }

    #[test]
    fn encode_accepts_full_media_id() {
        assert_eq!(
            code_from_media_pk("2110901750722920960_1903424587").unwrap(),
            "B1LbfVPlwIA"
        );
    }

    #[test]
    fn rejects_bad_codes() {
        assert!(media_pk_from_code("").is_err());
        assert!(media_pk_from_code("B1Lb$VPlwIA").is_err());
        assert!(code_from_media_pk("abc").is_err());
    }

    #[test]
    fn pk_from_post_and_reel_urls() {
        assert_eq!(
            media_pk_from_url("https://www.instagram.com/p/B1LbfVPlwIA/").unwrap(),
            "2110901750722920960"
        );
        assert_eq!(
            media_pk_from_url("https://www.instagram.com/reel/B1LbfVPlwIA?utm_source=ig").unwrap(),
            "2110901750722920960"
        );
        assert!(media_pk_from_url("not a url").is_err());
        assert!(media_pk_from_url("https://www.instagram.com/").is_err());
    }

    #[test]
    fn story_pk_from_urls() {
        assert_eq!(
            story_pk_from_url("https://www.instagram.com/stories/dhbastards/2581281926631793076/")
                .unwrap(),
            "2581281926631793076"
        );
        assert!(story_pk_from_url("https://www.instagram.com/stories/dhbastards/").is_err());
    }

    #[test]
    fn media_pk_from_full_id() {
        assert_eq!(media_pk_from_id("123_456"), "123");
        assert_eq!(media_pk_from_id("123"), "123");
    }
}
