use md5::{Digest, Md5};
use std::time::{SystemTime, UNIX_EPOCH};

/// literal the token endpoint expects in place of a timestamp when signing its own request
pub const TOKEN_TIMESTAMP_PLACEHOLDER: &str = "undefined";

const CLIENT_VERSION: &str = "v1";
const PLATFORM: &str = "yhkt_user";

/// (timestamp, digest) pair sent alongside every signed request, recomputed each time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub timestamp: String,
    pub digest: String,
}

/// produces the exact urls the upstream video endpoints accept
pub struct Signer {
    secret: String,
}

impl Signer {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    fn md5_hex(input: &str) -> String {
        hex::encode(Md5::digest(input.as_bytes()))
    }

    /// inserts MD5(secret + "_100") as a new path segment before the last one
    ///
    /// https://host/path/to/file.ts -> https://host/path/to/<digest>/file.ts
    pub fn obfuscate(&self, url: &str) -> String {
        let parts: Vec<&str> = url.split('/').collect();
        let Some((last, head)) = parts.split_last().filter(|(_, head)| !head.is_empty()) else {
            return url.to_string();
        };

        let digest = Self::md5_hex(&format!("{}_100", self.secret));

        let mut out = head.join("/");
        out.push('/');
        out.push_str(&digest);
        out.push('/');
        out.push_str(last);
        out
    }

    /// digest for an arbitrary timestamp segment, the token endpoint signs with "undefined"
    pub fn digest_for(&self, timestamp: &str) -> String {
        Self::md5_hex(&format!("{}_{}_{}", self.secret, CLIENT_VERSION, timestamp))
    }

    pub fn signature_at(&self, timestamp: i64) -> Signature {
        let timestamp = timestamp.to_string();
        let digest = self.digest_for(&timestamp);
        Signature { timestamp, digest }
    }

    pub fn current_signature(&self) -> Signature {
        self.signature_at(Self::now())
    }

    pub fn sign(&self, url: &str, video_token: &str) -> String {
        self.sign_at(url, video_token, Self::now())
    }

    pub fn sign_at(&self, url: &str, video_token: &str, timestamp: i64) -> String {
        let signature = self.signature_at(timestamp);
        let separator = if url.contains('?') { '&' } else { '?' };

        format!(
            "{}{}Xvideo_Token={}&Xclient_Timestamp={}&Xclient_Signature={}&Xclient_Version={}&Platform={}",
            url,
            separator,
            urlencoding::encode(video_token),
            signature.timestamp,
            signature.digest,
            CLIENT_VERSION,
            PLATFORM
        )
    }

    pub fn now() -> i64 {
        // a clock before the epoch just signs with 0, the upstream will reject it anyway
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}
