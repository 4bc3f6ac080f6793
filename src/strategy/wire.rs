//! Byte-level helpers shared by the strategies.

use std::io;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Status line written by the protocol-violation strategy.
pub const BAD_STATUS_LINE: &str = "HTTP/1.1 BAD SERVER";

/// Line terminator used on the wire.
pub const CRLF: &str = "\r\n";

/// Formats a timestamp the way HTTP `Date` headers expect
/// (RFC 1123, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`).
#[must_use]
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Reads and discards request lines up to and including the first empty
/// line, or until the peer stops sending.
///
/// Returns the number of non-empty lines discarded. Bytes are never decoded,
/// so a request that is not valid UTF-8 is drained like any other.
///
/// # Errors
///
/// Returns any I/O error raised by the underlying reader.
pub async fn drain_request_head<R>(reader: &mut R) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut line = Vec::with_capacity(256);
    let mut discarded = 0;
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(discarded);
        }
        if line.iter().all(|b| matches!(b, b'\r' | b'\n')) {
            return Ok(discarded);
        }
        discarded += 1;
    }
}

/// Builds a response head: status line, headers, terminating blank line.
#[must_use]
pub fn response_head(status_line: &str, headers: &[(&str, &str)]) -> String {
    let mut head = String::with_capacity(128);
    head.push_str(status_line);
    head.push_str(CRLF);
    for (name, value) in headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str(CRLF);
    }
    head.push_str(CRLF);
    head
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tokio::io::BufReader;

    #[test]
    fn http_date_is_rfc1123() {
        let at = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
        assert_eq!(http_date(at), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn response_head_layout() {
        let head = response_head("HTTP/1.1 200 OK", &[("Content-Length", "2")]);
        assert_eq!(head, "HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n");
    }

    #[test]
    fn response_head_without_headers() {
        assert_eq!(response_head(BAD_STATUS_LINE, &[]), "HTTP/1.1 BAD SERVER\r\n\r\n");
    }

    #[tokio::test]
    async fn drain_stops_at_blank_line() {
        let raw: &[u8] = b"GET / HTTP/1.1\r\nHost: x\r\n\r\nBODY";
        let mut reader = BufReader::new(raw);
        assert_eq!(drain_request_head(&mut reader).await.unwrap(), 2);

        let mut rest = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut reader, &mut rest)
            .await
            .unwrap();
        assert_eq!(rest, "BODY");
    }

    #[tokio::test]
    async fn drain_accepts_bare_newlines_and_eof() {
        let mut reader = BufReader::new(&b"GET /\nHost: x\n\n"[..]);
        assert_eq!(drain_request_head(&mut reader).await.unwrap(), 2);

        let mut truncated = BufReader::new(&b"GET / HTTP/1.1\r\nHost"[..]);
        assert_eq!(drain_request_head(&mut truncated).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn drain_handles_fragmented_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(b"GET / HT")
            .read(b"TP/1.1\r\nHo")
            .read(b"st: x\r\n\r")
            .read(b"\n")
            .build();
        let mut reader = BufReader::new(mock);
        assert_eq!(drain_request_head(&mut reader).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn drain_surfaces_read_errors() {
        let mock = tokio_test::io::Builder::new()
            .read(b"GET / HTTP/1.1\r\n")
            .read_error(io::Error::from(io::ErrorKind::ConnectionReset))
            .build();
        let err = drain_request_head(&mut BufReader::new(mock)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[tokio::test]
    async fn drain_ignores_invalid_utf8() {
        let mut reader = BufReader::new(&b"\xff\xfe\r\n\r\n"[..]);
        assert_eq!(drain_request_head(&mut reader).await.unwrap(), 1);
    }
}
