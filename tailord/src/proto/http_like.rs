use anyhow::Result;
use memchr::{memchr, memmem::Finder};
use tailor_api::limits::{enforce_max_message_size, MAX_MESSAGE_BYTES};
use tailor_api::status::StatusCode;
use tokio::io::AsyncReadExt;

#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    /// Names are lower-cased on read.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn get(path: &str) -> Self {
        Self {
            method: "GET".into(),
            path: path.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn route(&self) -> &str {
        self.path.split('?').next().unwrap_or("")
    }

    pub fn query(&self) -> Option<&str> {
        self.path.split_once('?').map(|(_, q)| q)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Read one request: head up to CRLFCRLF, then `content-length` bytes of body.
/// The whole message is capped at `MAX_MESSAGE_BYTES`.
pub async fn read_request<S>(stream: &mut S) -> Result<Request, StatusCode>
where
    S: AsyncReadExt + Unpin,
{
    let mut buf = Vec::with_capacity(4096);
    let mut tmp = [0u8; 2048];
    // Resume point for the terminator scan so long heads are not rescanned.
    let mut search_from: usize = 0;
    let finder = Finder::new(b"\r\n\r\n");
    let header_end = loop {
        let n = stream
            .read(&mut tmp)
            .await
            .map_err(|_| StatusCode::InternalServerError)?;
        if n == 0 {
            return Err(StatusCode::BadRequest);
        }
        buf.extend_from_slice(&tmp[..n]);
        if buf.len() > MAX_MESSAGE_BYTES {
            return Err(StatusCode::RequestEntityTooLarge);
        }
        let start = search_from.saturating_sub(3);
        if let Some(rel) = finder.find(&buf[start..]) {
            break start + rel;
        }
        search_from = buf.len();
    };

    let (head, rest) = buf.split_at(header_end + 4);
    let head = std::str::from_utf8(head).map_err(|_| StatusCode::BadRequest)?;
    let mut lines = head.split("\r\n");
    let mut start = lines.next().unwrap_or("").split_whitespace();
    let method = start.next().unwrap_or("").to_ascii_uppercase();
    let path = start.next().unwrap_or("").to_string();
    let version = start.next().unwrap_or("");
    if method.is_empty() || !path.starts_with('/') || !version.starts_with("HTTP/1.") {
        return Err(StatusCode::BadRequest);
    }

    let mut headers = Vec::new();
    let mut content_length: usize = 0;
    for line in lines.filter(|l| !l.is_empty()) {
        let Some(idx) = memchr(b':', line.as_bytes()) else {
            return Err(StatusCode::BadRequest);
        };
        let name = line[..idx].trim().to_ascii_lowercase();
        let value = line[idx + 1..].trim().to_string();
        if name == "content-length" {
            content_length = value.parse().map_err(|_| StatusCode::BadRequest)?;
        }
        headers.push((name, value));
    }

    let head_len = header_end + 4;
    enforce_max_message_size(head_len.saturating_add(content_length))
        .map_err(|_| StatusCode::RequestEntityTooLarge)?;
    let mut body = Vec::with_capacity(content_length);
    body.extend_from_slice(&rest[..rest.len().min(content_length)]);
    while body.len() < content_length {
        let mut chunk = [0u8; 4096];
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|_| StatusCode::InternalServerError)?;
        if n == 0 {
            // Peer closed before sending the declared body.
            return Err(StatusCode::BadRequest);
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(Request {
        method,
        path,
        headers,
        body,
    })
}

#[derive(Debug)]
pub struct Response {
    pub code: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn empty(code: StatusCode) -> Self {
        Self {
            code,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        make_response(self.code, &self.headers, &self.body)
    }
}

pub fn make_response(code: StatusCode, headers: &[(String, String)], body: &[u8]) -> Vec<u8> {
    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    let mut out = format!(
        "HTTP/1.1 {} {}\r\nserver: tailord\r\ndate: {}\r\nconnection: close\r\n",
        code.as_u16(),
        code.reason(),
        date
    )
    .into_bytes();
    let mut had_ct = false;
    for (k, v) in headers {
        if k.eq_ignore_ascii_case("content-length") {
            continue;
        }
        had_ct |= k.eq_ignore_ascii_case("content-type");
        out.extend_from_slice(k.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(v.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    if !had_ct {
        out.extend_from_slice(b"content-type: application/json\r\n");
    }
    out.extend_from_slice(format!("content-length: {}\r\n\r\n", body.len()).as_bytes());
    out.extend_from_slice(body);
    out
}

pub fn make_empty_response(code: StatusCode) -> Vec<u8> {
    make_response(code, &[], &[])
}
