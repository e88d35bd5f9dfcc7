use std::collections::HashMap;

use md5::Md5;
use reqwest::header::{HeaderMap, WWW_AUTHENTICATE};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
    Md5Sess,
    Sha256,
    Sha256Sess,
}

/// Parsed `WWW-Authenticate: Digest ...` challenge (RFC 2617 / RFC 7616).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub algorithm: DigestAlgorithm,
    pub qop_auth: bool,
}

impl DigestAlgorithm {
    fn parse(value: Option<&str>) -> Option<Self> {
        match value.map(|v| v.to_ascii_uppercase()).as_deref() {
            None | Some("MD5") => Some(DigestAlgorithm::Md5),
            Some("MD5-SESS") => Some(DigestAlgorithm::Md5Sess),
            Some("SHA-256") => Some(DigestAlgorithm::Sha256),
            Some("SHA-256-SESS") => Some(DigestAlgorithm::Sha256Sess),
            Some(_) => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "MD5",
            DigestAlgorithm::Md5Sess => "MD5-sess",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha256Sess => "SHA-256-sess",
        }
    }

    fn hash(&self, data: &str) -> String {
        match self {
            DigestAlgorithm::Md5 | DigestAlgorithm::Md5Sess => hex::encode(Md5::digest(data.as_bytes())),
            DigestAlgorithm::Sha256 | DigestAlgorithm::Sha256Sess => hex::encode(Sha256::digest(data.as_bytes())),
        }
    }

    fn is_session(&self) -> bool {
        matches!(self, DigestAlgorithm::Md5Sess | DigestAlgorithm::Sha256Sess)
    }
}

pub fn auth_scheme(challenge: &str) -> &str {
    challenge.trim().split_whitespace().next().unwrap_or_default()
}

/// First usable Digest challenge among all `WWW-Authenticate` headers.
pub fn digest_challenge(headers: &HeaderMap) -> Option<DigestChallenge> {
    headers
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(DigestChallenge::parse)
}

impl DigestChallenge {
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, params) = header.split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }

        let params = parse_params(params);
        let qop_auth = params
            .get("qop")
            .is_some_and(|qop| qop.split(',').any(|q| q.trim().eq_ignore_ascii_case("auth")));

        Some(Self {
            realm: params.get("realm").cloned().unwrap_or_default(),
            nonce: params.get("nonce")?.clone(),
            opaque: params.get("opaque").cloned(),
            algorithm: DigestAlgorithm::parse(params.get("algorithm").map(String::as_str))?,
            qop_auth,
        })
    }

    pub fn response(&self, username: &str, password: &str, method: &str, uri: &str, nc: u32, cnonce: &str) -> String {
        let alg = self.algorithm;

        let mut ha1 = alg.hash(&format!("{}:{}:{}", username, self.realm, password));
        if alg.is_session() {
            ha1 = alg.hash(&format!("{}:{}:{}", ha1, self.nonce, cnonce));
        }
        let ha2 = alg.hash(&format!("{}:{}", method, uri));

        if self.qop_auth {
            alg.hash(&format!("{}:{}:{:08x}:{}:auth:{}", ha1, self.nonce, nc, cnonce, ha2))
        } else {
            alg.hash(&format!("{}:{}:{}", ha1, self.nonce, ha2))
        }
    }

    pub fn authorization(
        &self,
        username: &str,
        password: &str,
        method: &str,
        uri: &str,
        nc: u32,
        cnonce: &str,
    ) -> String {
        let response = self.response(username, password, method, uri, nc, cnonce);

        let mut header = format!(
            r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", algorithm={}, response="{}""#,
            username,
            self.realm,
            self.nonce,
            uri,
            self.algorithm.name(),
            response
        );
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(r#", opaque="{}""#, opaque));
        }
        if self.qop_auth {
            header.push_str(&format!(r#", qop=auth, nc={:08x}, cnonce="{}""#, nc, cnonce));
        }

        header
    }
}

/// Tracks the nonce count for a cached challenge.
#[derive(Debug, Clone)]
pub struct DigestSession {
    challenge: DigestChallenge,
    nc: u32,
}

impl DigestSession {
    pub fn new(challenge: DigestChallenge) -> Self {
        Self { challenge, nc: 0 }
    }

    pub fn renew(&mut self, challenge: DigestChallenge) {
        self.challenge = challenge;
        self.nc = 0;
    }

    pub fn authorization(&mut self, username: &str, password: &str, method: &str, uri: &str) -> String {
        self.nc += 1;
        let cnonce = format!("{:016x}", rand::random::<u64>());
        self.challenge
            .authorization(username, password, method, uri, self.nc, &cnonce)
    }
}

fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = input.trim();

    while let Some((key, tail)) = rest.split_once('=') {
        let key = key.trim().trim_start_matches(',').trim().to_ascii_lowercase();
        let tail = tail.trim_start();

        let (value, tail) = if let Some(quoted) = tail.strip_prefix('"') {
            match closing_quote(quoted) {
                Some(end) => (quoted[..end].replace("\\\"", "\""), &quoted[end + 1..]),
                None => break,
            }
        } else {
            let end = tail.find(',').unwrap_or(tail.len());
            (tail[..end].trim().to_string(), &tail[end..])
        };

        params.insert(key, value);
        rest = tail.trim_start().trim_start_matches(',').trim_start();
    }

    params
}

fn closing_quote(quoted: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in quoted.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(i),
            _ => {}
        }
    }
    None
}
