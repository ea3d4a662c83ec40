//! Minimal HTTP/1.1 response-head parsing for the bridge
//!
//! The bridge only needs the status line and the header lines up to the
//! blank line; the body is opaque bytes.

/// Parsed response head
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResponseHead {
    pub version: String,
    pub status_code: u16,
    pub reason: String,
    /// Header lines in order, names as written by the worker
    pub headers: Vec<(String, String)>,
}

pub(crate) fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parse a status line: `VERSION STATUS [REASON]`
pub(crate) fn parse_status_line(line: &str) -> Result<(String, u16, String), String> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or("");
    if !version.starts_with("HTTP/") {
        return Err(format!("bad HTTP version in status line: {:?}", line));
    }
    let code_str = parts
        .next()
        .ok_or_else(|| format!("status line missing code: {:?}", line))?;
    let status_code = code_str
        .parse::<u16>()
        .map_err(|_| format!("bad status code: {:?}", code_str))?;
    let reason = parts.next().unwrap_or("").trim().to_string();
    Ok((version.to_string(), status_code, reason))
}

/// Parse a header line into name and value
pub(crate) fn parse_header_line(line: &str) -> Result<(String, String), String> {
    let colon = line
        .find(':')
        .ok_or_else(|| format!("no colon in header line: {:?}", line))?;
    let name = line[..colon].trim().to_string();
    let value = line[colon + 1..].trim().to_string();
    if name.is_empty() {
        return Err(format!("empty header name: {:?}", line));
    }
    Ok((name, value))
}

/// Try to parse a complete response head from the front of `buf`.
///
/// Returns the head and the number of bytes it occupied (through the
/// blank line), or `None` when more bytes are needed.
pub(crate) fn parse_head(buf: &[u8]) -> Result<Option<(ResponseHead, usize)>, String> {
    let mut pos = 0usize;

    let line_end = match find_crlf(&buf[pos..]) {
        Some(i) => i,
        None => return Ok(None),
    };
    let status_line = String::from_utf8_lossy(&buf[pos..pos + line_end]).to_string();
    let (version, status_code, reason) = parse_status_line(&status_line)?;
    pos += line_end + 2;

    let mut headers = Vec::new();
    loop {
        let line_end = match find_crlf(&buf[pos..]) {
            Some(i) => i,
            None => return Ok(None),
        };
        if line_end == 0 {
            pos += 2;
            break;
        }
        let line = String::from_utf8_lossy(&buf[pos..pos + line_end]).to_string();
        headers.push(parse_header_line(&line)?);
        pos += line_end + 2;
    }

    Ok(Some((
        ResponseHead {
            version,
            status_code,
            reason,
            headers,
        },
        pos,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_line() {
        let (version, code, reason) = parse_status_line("HTTP/1.1 200 OK").unwrap();
        assert_eq!(version, "HTTP/1.1");
        assert_eq!(code, 200);
        assert_eq!(reason, "OK");

        let (_, code, reason) = parse_status_line("HTTP/1.1 404").unwrap();
        assert_eq!(code, 404);
        assert_eq!(reason, "");

        assert!(parse_status_line("FTP/1.0 200 OK").is_err());
        assert!(parse_status_line("HTTP/1.1 abc OK").is_err());
    }

    #[test]
    fn test_parse_head_complete() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\nX-A: b\r\n\r\nhi!";
        let (head, consumed) = parse_head(raw).unwrap().unwrap();
        assert_eq!(head.status_code, 200);
        assert_eq!(head.reason, "OK");
        assert_eq!(
            head.headers,
            vec![
                ("Content-Length".to_string(), "3".to_string()),
                ("X-A".to_string(), "b".to_string()),
            ]
        );
        assert_eq!(&raw[consumed..], b"hi!");
    }

    #[test]
    fn test_parse_head_incremental() {
        assert_eq!(parse_head(b"HTTP/1.1 2").unwrap(), None);
        assert_eq!(parse_head(b"HTTP/1.1 200 OK\r\nContent-").unwrap(), None);
        assert_eq!(
            parse_head(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n").unwrap(),
            None
        );
        assert!(parse_head(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_parse_head_rejects_garbage() {
        assert!(parse_head(b"not an http response\r\n\r\n").is_err());
        assert!(parse_head(b"HTTP/1.1 200 OK\r\nbroken line\r\n\r\n").is_err());
    }
}
