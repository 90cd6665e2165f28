use archiver_core::FailureKind;
use chardetng::EncodingDetector;
use encoding_rs::Encoding;

use crate::FetchError;

/// Decode a fetched page body into UTF-8.
///
/// Order: byte-order mark, then the `charset` parameter of the Content-Type
/// header, then chardetng detection over the whole body.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> Result<String, FetchError> {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    if let Some(enc) = content_type
        .and_then(charset_param)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        return decode_with(bytes, enc);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    decode_with(bytes, detector.guess(None, true))
}

fn charset_param(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(['"', '\'']).to_string())
    })
}

fn decode_with(bytes: &[u8], enc: &'static Encoding) -> Result<String, FetchError> {
    let (text, _, had_errors) = enc.decode(bytes);
    if had_errors {
        return Err(FetchError::new(
            FailureKind::Decode,
            format!("malformed {} body", enc.name()),
        ));
    }
    Ok(text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::{charset_param, decode_body};

    #[test]
    fn charset_header_wins_over_detection() {
        let decoded = decode_body(b"caf\xe9", Some("text/html; Charset=\"ISO-8859-1\"")).unwrap();
        assert_eq!(decoded, "café");
    }

    #[test]
    fn bom_is_stripped() {
        assert_eq!(decode_body(b"\xEF\xBB\xBFhello", None).unwrap(), "hello");
    }

    #[test]
    fn invalid_utf8_is_a_decode_failure() {
        let err = decode_body(b"ok \xff\xfd", Some("text/html; charset=utf-8"));
        assert!(err.is_err());
    }

    #[test]
    fn missing_charset_yields_none() {
        assert_eq!(charset_param("text/html"), None);
    }
}
