use axum::http::{HeaderMap, Uri, header};

/// players and some json encoders hand us `https:\/\/host\/path`, undo that
pub fn normalize_escaped_slashes(url: &str) -> String {
    url.replace("\\/", "/")
}

/// resolves a manifest reference against the manifest's own url
///
/// absolute refs are used as-is, root-relative refs keep the base's scheme and host, everything
/// else is joined onto the base's directory
pub fn resolve_segment_url(base: &str, reference: &str) -> String {
    if reference.starts_with("http") {
        return reference.to_string();
    }

    let Ok(base_url) = url::Url::parse(base) else {
        return reference.to_string();
    };

    // scheme://user@host:port without the path
    let origin = &base_url[..url::Position::BeforePath];

    if reference.starts_with('/') {
        return format!("{}{}", origin, reference);
    }

    let path = base_url.path();
    let directory = match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => path,
    };

    format!("{}{}{}", origin, directory, reference)
}

/// strict percent decoding of one path capture, a `%` not followed by two hex digits or a result
/// that isn't utf-8 gives `None`
pub fn decode_path_segment(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escape = bytes.get(i + 1..i + 3)?;
            if !escape.iter().all(u8::is_ascii_hexdigit) {
                return None;
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    urlencoding::decode(raw).ok().map(|decoded| decoded.into_owned())
}

/// percent-encodes a manifest reference for use in our own path, `/` is kept so nested
/// references stay nested
pub fn encode_path_segment(reference: &str) -> String {
    urlencoding::encode(reference).replace("%2F", "/")
}

pub fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
}

/// scheme://host the player used to reach us, used to build absolute segment urls
///
/// the configured host wins over the Host header, X-Forwarded-Proto wins over whatever the
/// request itself says
pub fn public_origin(headers: &HeaderMap, uri: &Uri, host_override: Option<&str>) -> String {
    let host = host_override
        .filter(|h| !h.is_empty())
        .map(|h| h.to_string())
        .or_else(|| {
            headers
                .get(header::HOST)
                .and_then(|h| h.to_str().ok())
                .map(|h| h.to_string())
        })
        .or_else(|| uri.authority().map(|a| a.to_string()))
        .unwrap_or_else(|| "localhost".to_string());

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
        .or_else(|| uri.scheme_str().map(|s| s.to_string()))
        .unwrap_or_else(|| "http".to_string());

    format!("{}://{}", scheme, host)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://cvideo.example.cn/course/123/index.m3u8?x=1";

    #[test]
    fn keeps_absolute_references() {
        assert_eq!(
            resolve_segment_url(BASE, "https://other.example.cn/a.ts"),
            "https://other.example.cn/a.ts"
        );
    }

    #[test]
    fn joins_root_relative_to_host() {
        assert_eq!(
            resolve_segment_url("https://cvideo.example.cn:8443/course/index.m3u8", "/seg/1.ts"),
            "https://cvideo.example.cn:8443/seg/1.ts"
        );
    }

    #[test]
    fn joins_relative_to_directory() {
        assert_eq!(
            resolve_segment_url(BASE, "seg1.ts"),
            "https://cvideo.example.cn/course/123/seg1.ts"
        );
    }

    #[test]
    fn unparseable_base_returns_reference() {
        assert_eq!(resolve_segment_url("not a url", "seg1.ts"), "seg1.ts");
    }

    #[test]
    fn decodes_only_well_formed_escapes() {
        assert_eq!(decode_path_segment("seg%201.ts").as_deref(), Some("seg 1.ts"));
        assert_eq!(decode_path_segment("sub/seg1.ts").as_deref(), Some("sub/seg1.ts"));
        assert_eq!(decode_path_segment("%zz.ts"), None);
        assert_eq!(decode_path_segment("seg1.ts%"), None);
        assert_eq!(decode_path_segment("seg1.ts%4"), None);
        assert_eq!(decode_path_segment("%FF.ts"), None);
    }

    #[test]
    fn encoding_keeps_slashes() {
        assert_eq!(encode_path_segment("sub/seg 2.ts"), "sub/seg%202.ts");
        assert_eq!(
            encode_path_segment("https://h/a.ts"),
            "https%3A//h/a.ts"
        );
    }

    #[test]
    fn normalizes_escaped_slashes() {
        assert_eq!(
            normalize_escaped_slashes("https:\\/\\/host\\/a.m3u8"),
            "https://host/a.m3u8"
        );
    }

    #[test]
    fn public_origin_prefers_override_and_forwarded_proto() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "proxy.local:8080".parse().unwrap());
        let uri: Uri = "/external/stream".parse().unwrap();

        assert_eq!(public_origin(&headers, &uri, None), "http://proxy.local:8080");

        headers.insert("x-forwarded-proto", "https".parse().unwrap());
        assert_eq!(public_origin(&headers, &uri, None), "https://proxy.local:8080");
        assert_eq!(
            public_origin(&headers, &uri, Some("video.example.org")),
            "https://video.example.org"
        );
    }
}
