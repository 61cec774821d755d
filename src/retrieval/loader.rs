// SPDX-License-Identifier: MIT

//! Document loaders for web pages and local files, including pages saved
//! by a browser as MHTML

use super::document::Document;
use crate::adk::error::{AgentError, Result};
use async_trait::async_trait;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::path::PathBuf;

const USER_AGENT: &str = "hello-langgraph/0.1";

static SCRIPT_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|noscript|head)\b[^>]*>.*?</(script|style|noscript|head)>")
        .expect("static regex")
});
static TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static regex"));
static BLOCK_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(p|div|h[1-6]|li|tr|section|article|pre|blockquote)>")
        .expect("static regex")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("static regex"));
static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("static regex"));
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\r\f\v]+").expect("static regex"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n[\s\n]*").expect("static regex"));
static BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)boundary="?([^";\r\n]+)"?"#).expect("static regex"));
static SNAPSHOT_LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^Snapshot-Content-Location:\s*(\S+)").expect("static regex")
});

#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self) -> Result<Vec<Document>>;
}

/// Page title, if the HTML has one
pub fn html_title(html: &str) -> Option<String> {
    TITLE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| decode_entities(m.as_str()).trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Reduce an HTML page to readable text, keeping paragraph breaks
pub fn html_to_text(html: &str) -> String {
    let text = COMMENT.replace_all(html, "");
    let text = SCRIPT_STYLE.replace_all(&text, "");
    let text = BLOCK_END.replace_all(&text, "\n\n");
    let text = TAG.replace_all(&text, "");
    let text = decode_entities(&text);
    let text = SPACES.replace_all(&text, " ");

    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let text = lines.join("\n");
    BLANK_LINES.replace_all(&text, "\n\n").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        // Last so "&amp;lt;" stays "&lt;"
        .replace("&amp;", "&")
}

/// Fetches pages over HTTP and strips them to text
pub struct WebLoader {
    client: Client,
    urls: Vec<String>,
}

impl WebLoader {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            client: Client::new(),
            urls,
        }
    }

    async fn fetch(&self, url: &str) -> Result<Document> {
        let parsed = url::Url::parse(url)?;
        log::info!("Loading {}", parsed);

        let resp = self
            .client
            .get(parsed)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AgentError::api(
                "web",
                format!("{} returned {}", url, resp.status()),
            ));
        }
        let html = resp.text().await?;

        let doc = Document::new(html_to_text(&html)).with_metadata("source", url);
        Ok(match html_title(&html) {
            Some(title) => doc.with_metadata("title", title),
            None => doc,
        })
    }
}

#[async_trait]
impl DocumentLoader for WebLoader {
    /// Pages are fetched one at a time, in the order of the URLs
    async fn load(&self) -> Result<Vec<Document>> {
        let mut docs = Vec::with_capacity(self.urls.len());
        for url in &self.urls {
            docs.push(self.fetch(url).await?);
        }
        Ok(docs)
    }
}

/// Split a header block from its body at the first blank line
fn split_headers(part: &str) -> (&str, &str) {
    let crlf = part.find("\r\n\r\n").map(|i| (i, 4));
    let lf = part.find("\n\n").map(|i| (i, 2));
    let split = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };
    match split {
        Some((at, len)) => (&part[..at], &part[at + len..]),
        None => (part, ""),
    }
}

fn header_value<'a>(headers: &'a str, name: &str) -> Option<&'a str> {
    headers.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim())
    })
}

fn decode_quoted_printable(body: &str) -> Vec<u8> {
    let hex = |b: Option<&u8>| b.and_then(|b| (*b as char).to_digit(16));
    let bytes = body.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'=' {
            let rest = &bytes[i + 1..];
            // soft line break
            if rest.starts_with(b"\r\n") {
                i += 3;
                continue;
            }
            if rest.starts_with(b"\n") {
                i += 2;
                continue;
            }
            if let (Some(hi), Some(lo)) = (hex(bytes.get(i + 1)), hex(bytes.get(i + 2))) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

/// The `text/html` part of an MHTML archive, decoded
pub fn mhtml_to_html(raw: &str) -> Result<String> {
    let (headers, _) = split_headers(raw);
    let boundary = BOUNDARY
        .captures(headers)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .ok_or_else(|| AgentError::validation("MHTML without a multipart boundary"))?;

    let delimiter = format!("--{}", boundary);
    for part in raw.split(delimiter.as_str()).skip(1) {
        if part.starts_with("--") {
            break;
        }
        let (headers, body) = split_headers(part.trim_start_matches(&['\r', '\n'][..]));
        let is_html = header_value(headers, "Content-Type")
            .map(|t| t.to_ascii_lowercase().starts_with("text/html"))
            .unwrap_or(false);
        if !is_html {
            continue;
        }

        let encoding = header_value(headers, "Content-Transfer-Encoding")
            .unwrap_or("7bit")
            .to_ascii_lowercase();
        let bytes = match encoding.as_str() {
            "quoted-printable" => decode_quoted_printable(body),
            "base64" => {
                let compact: String = body.split_whitespace().collect();
                base64::engine::general_purpose::STANDARD
                    .decode(compact)
                    .map_err(|e| AgentError::validation(format!("bad base64 HTML part: {}", e)))?
            }
            _ => body.as_bytes().to_vec(),
        };
        return Ok(String::from_utf8_lossy(&bytes).into_owned());
    }
    Err(AgentError::validation("MHTML has no text/html part"))
}

/// Reads local text, markdown, HTML or MHTML files
pub struct FileLoader {
    paths: Vec<PathBuf>,
}

impl FileLoader {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

#[async_trait]
impl DocumentLoader for FileLoader {
    async fn load(&self) -> Result<Vec<Document>> {
        let mut docs = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            log::info!("Loading {}", path.display());
            let raw = tokio::fs::read_to_string(path).await?;

            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
                .unwrap_or_default();

            let mut doc = match extension.as_str() {
                "html" | "htm" => html_document(&raw),
                "mhtml" | "mht" => {
                    let doc = html_document(&mhtml_to_html(&raw)?);
                    match SNAPSHOT_LOCATION.captures(&raw).and_then(|c| c.get(1)) {
                        Some(url) => doc.with_metadata("url", url.as_str()),
                        None => doc,
                    }
                }
                _ => Document::new(raw),
            };
            doc = doc.with_metadata("source", path.display().to_string());
            docs.push(doc);
        }
        Ok(docs)
    }
}

fn html_document(html: &str) -> Document {
    let doc = Document::new(html_to_text(html));
    match html_title(html) {
        Some(title) => doc.with_metadata("title", title),
        None => doc,
    }
}

/// Load every source: `http(s)://` entries from the web, the rest from disk
pub async fn load_sources(sources: &[String]) -> Result<Vec<Document>> {
    let (urls, files): (Vec<String>, Vec<String>) = sources
        .iter()
        .cloned()
        .partition(|s| s.starts_with("http://") || s.starts_with("https://"));

    let mut docs = WebLoader::new(urls).load().await?;
    docs.extend(
        FileLoader::new(files.into_iter().map(PathBuf::from).collect())
            .load()
            .await?,
    );
    Ok(docs)
}
