//! L4 — HTTP Engine (§4.4).
//!
//! Formats requests into the bounded send buffer and parses responses
//! out of the bounded receive buffer, enforcing `PUBNUB_BUF_MAXLEN`/
//! `PUBNUB_REPLY_MAXLEN` the way the C core's fixed-size `core_buf`
//! does — no heap growth past the configured caps, just a
//! `reply-too-big`/`format-error` result instead.

use std::io::Read;

use flate2::read::GzDecoder;

use crate::error::ResultCode;

/// Format a GET request line + headers for `path_and_query` against
/// `host`. Returns `None` if the formatted request would exceed
/// `buf_maxlen` (§3: "requests ... are composed into a single
/// fixed-size buffer").
pub fn format_request(host: &str, path_and_query: &str, accept_gzip: bool, buf_maxlen: usize) -> Option<Vec<u8>> {
    let mut request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n",
        path_and_query, host
    );
    if accept_gzip {
        request.push_str("Accept-Encoding: gzip\r\n");
    }
    request.push_str("\r\n");

    if request.len() > buf_maxlen {
        return None;
    }
    Some(request.into_bytes())
}

/// A fully received response, headers parsed and body decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

/// Read state for one response, accumulated across however many
/// `recv()` calls the transport needs to deliver it (§4.3/§4.4 work
/// together: the transport hands back whatever arrived, the HTTP
/// engine buffers it until a complete response is assembled).
#[derive(Debug, Default)]
pub struct ResponseReader {
    buf: Vec<u8>,
    reply_maxlen: usize,
}

enum BodyFraming {
    ContentLength(usize),
    Chunked,
    /// No framing header present; body runs until the connection
    /// closes (valid for `Connection: close`, which every request
    /// here sends).
    UntilClose,
}

impl ResponseReader {
    pub fn new(reply_maxlen: usize) -> Self {
        ResponseReader {
            buf: Vec::new(),
            reply_maxlen,
        }
    }

    /// Feed newly-received bytes in. Returns `Ok(Some(response))` once
    /// the full response has arrived, `Ok(None)` if more data is
    /// needed, or an error if the bounded buffer overflowed or the
    /// response was malformed.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Option<Response>, ResultCode> {
        if self.buf.len() + chunk.len() > self.reply_maxlen {
            return Err(ResultCode::ReplyTooBig);
        }
        self.buf.extend_from_slice(chunk);
        self.try_parse()
    }

    /// Call once the transport has reported the connection closed, to
    /// finalize an `UntilClose`-framed body.
    pub fn finish(&mut self) -> Result<Response, ResultCode> {
        let header_end = find_header_end(&self.buf).ok_or(ResultCode::FormatError)?;
        let (status, headers) = parse_status_and_headers(&self.buf[..header_end])?;
        let body_bytes = &self.buf[header_end..];
        let body = decode_body(body_bytes, &headers)?;
        Ok(Response { status, body })
    }

    fn try_parse(&mut self) -> Result<Option<Response>, ResultCode> {
        let header_end = match find_header_end(&self.buf) {
            Some(i) => i,
            None => return Ok(None),
        };
        let (status, headers) = parse_status_and_headers(&self.buf[..header_end])?;

        match body_framing(&headers) {
            BodyFraming::ContentLength(len) => {
                let body_bytes = &self.buf[header_end..];
                if body_bytes.len() < len {
                    return Ok(None);
                }
                let body = decode_body(&body_bytes[..len], &headers)?;
                Ok(Some(Response { status, body }))
            }
            BodyFraming::Chunked => match decode_chunked(&self.buf[header_end..]) {
                Some(raw) => Ok(Some(Response {
                    status,
                    body: decode_body(&raw, &headers)?,
                })),
                None => Ok(None),
            },
            BodyFraming::UntilClose => Ok(None),
        }
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

fn parse_status_and_headers(head: &[u8]) -> Result<(u16, Vec<(String, String)>), ResultCode> {
    let text = std::str::from_utf8(head).map_err(|_| ResultCode::FormatError)?;
    let mut lines = text.split("\r\n");
    let status_line = lines.next().ok_or(ResultCode::FormatError)?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or(ResultCode::FormatError)?;

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }
    Ok((status, headers))
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
}

fn body_framing(headers: &[(String, String)]) -> BodyFraming {
    if header(headers, "transfer-encoding").is_some_and(|v| v.eq_ignore_ascii_case("chunked")) {
        return BodyFraming::Chunked;
    }
    if let Some(len) = header(headers, "content-length").and_then(|v| v.parse().ok()) {
        return BodyFraming::ContentLength(len);
    }
    BodyFraming::UntilClose
}

fn decode_chunked(buf: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let mut pos = 0;
    loop {
        let line_end = buf[pos..].windows(2).position(|w| w == b"\r\n")? + pos;
        let size_text = std::str::from_utf8(&buf[pos..line_end]).ok()?;
        let size = usize::from_str_radix(size_text.trim(), 16).ok()?;
        let chunk_start = line_end + 2;
        if size == 0 {
            return Some(out);
        }
        let chunk_end = chunk_start + size;
        if buf.len() < chunk_end + 2 {
            return None;
        }
        out.extend_from_slice(&buf[chunk_start..chunk_end]);
        pos = chunk_end + 2;
    }
}

fn decode_body(body: &[u8], headers: &[(String, String)]) -> Result<String, ResultCode> {
    let is_gzip = header(headers, "content-encoding").is_some_and(|v| v.eq_ignore_ascii_case("gzip"));
    if is_gzip {
        let mut decoder = GzDecoder::new(body);
        let mut out = String::new();
        decoder.read_to_string(&mut out).map_err(|_| ResultCode::FormatError)?;
        Ok(out)
    } else {
        std::str::from_utf8(body).map(|s| s.to_string()).map_err(|_| ResultCode::FormatError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_request_respects_buf_maxlen() {
        assert!(format_request("pubsub.pubnub.com", "/publish/x", false, 256).is_some());
        assert!(format_request("pubsub.pubnub.com", "/publish/x", false, 8).is_none());
    }

    #[test]
    fn parses_content_length_response_in_one_shot() {
        let mut reader = ResponseReader::new(1024);
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
        let response = reader.feed(raw).unwrap().unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "hello");
    }

    #[test]
    fn parses_response_delivered_across_multiple_feeds() {
        let mut reader = ResponseReader::new(1024);
        assert!(reader.feed(b"HTTP/1.1 200 OK\r\nContent-L").unwrap().is_none());
        assert!(reader.feed(b"ength: 5\r\n\r\nhe").unwrap().is_none());
        let response = reader.feed(b"llo").unwrap().unwrap();
        assert_eq!(response.body, "hello");
    }

    #[test]
    fn parses_chunked_response() {
        let mut reader = ResponseReader::new(1024);
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n";
        let response = reader.feed(raw).unwrap().unwrap();
        assert_eq!(response.body, "hello");
    }

    #[test]
    fn exceeding_reply_maxlen_is_reply_too_big() {
        let mut reader = ResponseReader::new(8);
        let result = reader.feed(b"HTTP/1.1 200 OK\r\n\r\n");
        assert_eq!(result.unwrap_err(), ResultCode::ReplyTooBig);
    }

    #[test]
    fn non_numeric_status_is_format_error() {
        let mut reader = ResponseReader::new(1024);
        let result = reader.feed(b"HTTP/1.1 OK OK\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(result.unwrap_err(), ResultCode::FormatError);
    }
}
