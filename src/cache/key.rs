//! Cache keys
//!
//! A key is a short list of path components plus a sequence number. Keys
//! computed from a request are the first 16 hex digits of an MD5 digest,
//! split 3/13 so the cache directory fans out one level. Keys chosen by the
//! caller are taken as given.
//!
//! On disk each component is escaped so that only `[\w-]` characters reach
//! the filesystem; a sequence number above zero is appended to the last
//! component as `.N`, which escaping keeps unambiguous since `.` itself is
//! always escaped.

use crate::http::headers::title_case;
use crate::request::CompiledRequest;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    parts: Vec<String>,
    sequence_num: u32,
}

fn feed(ctx: &mut md5::Context, bytes: &[u8]) {
    ctx.consume((bytes.len() as u64).to_be_bytes());
    ctx.consume(bytes);
}

fn is_path_safe(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn escape(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        if is_path_safe(c) {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    out
}

fn unescape(part: &str) -> Option<String> {
    let bytes = part.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = part.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

impl CacheKey {
    pub fn new(parts: Vec<String>) -> Self {
        CacheKey {
            parts,
            sequence_num: 0,
        }
    }

    /// Fingerprint a compiled request
    ///
    /// Covers the method, the URL exactly as compiled, the title-cased and
    /// sorted headers minus `ignored`, and the body bytes.
    pub fn compute(creq: &CompiledRequest, ignored: &BTreeSet<String>) -> Self {
        let ignored: BTreeSet<String> = ignored.iter().map(|h| title_case(h)).collect();
        let headers: Vec<(String, String)> = creq
            .headers
            .sorted_items()
            .into_iter()
            .filter(|(name, _)| !ignored.contains(name))
            .collect();

        let mut ctx = md5::Context::new();
        feed(&mut ctx, creq.method.as_bytes());
        feed(&mut ctx, creq.url.as_bytes());
        ctx.consume((headers.len() as u64).to_be_bytes());
        for (name, value) in &headers {
            feed(&mut ctx, name.as_bytes());
            feed(&mut ctx, value.as_bytes());
        }
        match &creq.data {
            None => ctx.consume([0u8]),
            Some(body) => {
                ctx.consume([1u8]);
                feed(&mut ctx, body);
            }
        }

        let digest = format!("{:x}", ctx.compute());
        CacheKey::new(vec![digest[..3].to_string(), digest[3..16].to_string()])
    }

    /// A caller-chosen key from a slash-delimited string
    pub fn parse(key: &str) -> Self {
        CacheKey::new(key.trim_matches('/').split('/').map(str::to_string).collect())
    }

    /// A caller-chosen key from explicit components
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CacheKey::new(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn sequence_num(&self) -> u32 {
        self.sequence_num
    }

    /// The key for the next redirect hop
    pub fn next_in_sequence(&self) -> Self {
        CacheKey {
            parts: self.parts.clone(),
            sequence_num: self.sequence_num + 1,
        }
    }

    /// Filesystem-safe components, with the `.N` suffix when sequenced
    pub fn path_parts(&self) -> Vec<String> {
        let mut parts: Vec<String> = self.parts.iter().map(|p| escape(p)).collect();
        if self.sequence_num > 0 {
            if let Some(last) = parts.last_mut() {
                last.push_str(&format!(".{}", self.sequence_num));
            }
        }
        parts
    }

    pub fn unique_str(&self) -> String {
        self.path_parts().join("/")
    }

    /// Inverse of [`CacheKey::path_parts`]; `None` for malformed escapes
    pub fn from_path_parts<S: AsRef<str>>(path_parts: &[S]) -> Option<Self> {
        let (last, init) = path_parts.split_last()?;
        let mut last = last.as_ref();
        let mut sequence_num = 0;
        if let Some((stem, suffix)) = last.rsplit_once('.') {
            if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
                sequence_num = suffix.parse().ok()?;
                last = stem;
            }
        }

        let mut parts = init
            .iter()
            .map(|p| unescape(p.as_ref()))
            .collect::<Option<Vec<_>>>()?;
        parts.push(unescape(last)?);

        Some(CacheKey {
            parts,
            sequence_num,
        })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.unique_str())
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        CacheKey::parse(key)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        CacheKey::parse(&key)
    }
}

impl From<Vec<String>> for CacheKey {
    fn from(parts: Vec<String>) -> Self {
        CacheKey::new(parts)
    }
}

impl<const N: usize> From<[&str; N]> for CacheKey {
    fn from(parts: [&str; N]) -> Self {
        CacheKey::from_parts(parts)
    }
}
