//! NCSA combined log format.
//!
//! ```text
//! 203.0.113.5 - - [02/Jan/2006:15:04:05 -0700] "GET /x HTTP/1.1" 200 123 "-" "curl/8.0"
//! ```

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use unicode_general_category::{get_general_category, GeneralCategory};

use crate::requestlog::{Entry, RequestLogger};

const NCSA_TIME: &str = "%d/%b/%Y:%H:%M:%S %z";

type ErrorCallback = Box<dyn Fn(&io::Error) + Send + Sync>;

struct Inner<W> {
    sink: W,
    buf: Vec<u8>,
}

/// Writes one NCSA combined line per entry to `W`.
///
/// Formatting and the write happen under one lock, so lines from concurrent
/// requests never interleave. The line buffer is reused between calls.
pub struct NcsaLogger<W> {
    inner: Mutex<Inner<W>>,
    on_error: Option<ErrorCallback>,
}

impl<W: Write + Send> NcsaLogger<W> {
    pub fn new(sink: W) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sink,
                buf: Vec::with_capacity(256),
            }),
            on_error: None,
        }
    }

    /// Report each failed write to `callback`. Logging carries on regardless.
    pub fn with_error_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&io::Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Give back the sink, e.g. to inspect what was written.
    pub fn into_inner(self) -> W {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .sink
    }

    fn write_entry(&self, entry: &Entry) -> io::Result<()> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Inner { sink, buf } = &mut *guard;
        buf.clear();
        format_entry(buf, entry);
        sink.write_all(buf)
    }
}

impl<W: Write + Send> RequestLogger for NcsaLogger<W> {
    fn log(&self, entry: &Entry) {
        if let Err(e) = self.write_entry(entry) {
            if let Some(on_error) = &self.on_error {
                on_error(&e);
            }
        }
    }
}

/// Append the NCSA line for `entry`, newline included, to `buf`.
pub fn format_entry(buf: &mut Vec<u8>, entry: &Entry) {
    if entry.remote_ip.is_empty() {
        buf.push(b'-');
    } else {
        buf.extend_from_slice(entry.remote_ip.as_bytes());
    }
    buf.extend_from_slice(b" - - [");
    // Writing into a Vec cannot fail.
    let _ = write!(buf, "{}", entry.received_time.format(NCSA_TIME));
    buf.extend_from_slice(b"] \"");
    buf.extend_from_slice(entry.request_method.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(entry.request_url.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(entry.proto.as_bytes());
    buf.extend_from_slice(b"\" ");
    let _ = write!(buf, "{} {} ", entry.status, entry.response_body_size);
    push_quoted(buf, &entry.referer);
    buf.push(b' ');
    push_quoted(buf, &entry.user_agent);
    buf.push(b'\n');
}

/// Double-quote `raw` the way Go's `strconv.Quote` does.
///
/// Printable characters pass through, invalid UTF-8 bytes become `\xNN`,
/// and other code points become `\uNNNN` or `\UNNNNNNNN`.
fn push_quoted(buf: &mut Vec<u8>, raw: &[u8]) {
    buf.push(b'"');
    for chunk in raw.utf8_chunks() {
        for c in chunk.valid().chars() {
            push_escaped(buf, c);
        }
        for byte in chunk.invalid() {
            let _ = write!(buf, "\\x{byte:02x}");
        }
    }
    buf.push(b'"');
}

fn push_escaped(buf: &mut Vec<u8>, c: char) {
    match c {
        '"' => buf.extend_from_slice(b"\\\""),
        '\\' => buf.extend_from_slice(b"\\\\"),
        c if is_print(c) => {
            let mut utf8 = [0u8; 4];
            buf.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
        }
        '\x07' => buf.extend_from_slice(b"\\a"),
        '\x08' => buf.extend_from_slice(b"\\b"),
        '\x0c' => buf.extend_from_slice(b"\\f"),
        '\n' => buf.extend_from_slice(b"\\n"),
        '\r' => buf.extend_from_slice(b"\\r"),
        '\t' => buf.extend_from_slice(b"\\t"),
        '\x0b' => buf.extend_from_slice(b"\\v"),
        c if (c as u32) < 0x20 || c == '\x7f' => {
            let _ = write!(buf, "\\x{:02x}", c as u32);
        }
        c if (c as u32) < 0x10000 => {
            let _ = write!(buf, "\\u{:04x}", c as u32);
        }
        c => {
            let _ = write!(buf, "\\U{:08x}", c as u32);
        }
    }
}

/// Letters, marks, numbers, punctuation, symbols and the ASCII space.
fn is_print(c: char) -> bool {
    use GeneralCategory::*;

    c == ' '
        || !matches!(
            get_general_category(c),
            SpaceSeparator
                | LineSeparator
                | ParagraphSeparator
                | Control
                | Format
                | Surrogate
                | PrivateUse
                | Unassigned
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn sample_entry() -> Entry {
        let zone = FixedOffset::west_opt(7 * 3600).unwrap();
        Entry {
            remote_ip: "203.0.113.5".into(),
            received_time: zone.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap(),
            request_method: "GET".into(),
            request_url: "/x".into(),
            proto: "HTTP/1.1".into(),
            status: 200,
            response_body_size: 123,
            referer: "-".into(),
            user_agent: "curl/8.0".into(),
            latency: Duration::from_millis(3),
        }
    }

    fn line(entry: &Entry) -> String {
        let mut buf = Vec::new();
        format_entry(&mut buf, entry);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn exact_format() {
        assert_eq!(
            line(&sample_entry()),
            "203.0.113.5 - - [02/Jan/2006:15:04:05 -0700] \"GET /x HTTP/1.1\" 200 123 \"-\" \"curl/8.0\"\n"
        );
    }

    #[test]
    fn missing_remote_ip_renders_dash() {
        let mut entry = sample_entry();
        entry.remote_ip.clear();
        assert!(line(&entry).starts_with("- - - [02/Jan/2006"));
    }

    #[test]
    fn positive_offset_and_padding() {
        let mut entry = sample_entry();
        let zone = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();
        entry.received_time = zone.with_ymd_and_hms(2024, 3, 9, 7, 8, 9).unwrap();
        assert!(line(&entry).contains("[09/Mar/2024:07:08:09 +0530]"));
    }

    #[test]
    fn quoting_escapes() {
        let mut entry = sample_entry();
        entry.referer = Vec::new();
        entry.user_agent = "a\"b\\c\td\ne\x01f\u{7f}g\u{85}h é".into();
        let line = line(&entry);
        assert!(line.ends_with(
            " \"\" \"a\\\"b\\\\c\\td\\ne\\x01f\\x7fg\\u0085h é\"\n"
        ));
    }

    #[test]
    fn non_graphic_code_points_are_escaped() {
        let mut entry = sample_entry();
        entry.referer = "a\u{a0}b\u{200b}c".into();
        entry.user_agent = "\u{e000}\u{f0000}\u{2028}".into();
        assert!(line(&entry).ends_with(
            " \"a\\u00a0b\\u200bc\" \"\\ue000\\U000f0000\\u2028\"\n"
        ));
    }

    #[test]
    fn graphic_code_points_pass_through() {
        let mut entry = sample_entry();
        entry.user_agent = "e\u{301} \u{1f600} \u{fffd}".into();
        assert!(line(&entry).ends_with(" \"e\u{301} \u{1f600} \u{fffd}\"\n"));
    }

    #[test]
    fn invalid_utf8_bytes_are_hex_escaped() {
        let mut entry = sample_entry();
        entry.referer = b"\xff".to_vec();
        entry.user_agent = b"u\xe9a \xe2\x82".to_vec();
        assert!(line(&entry).ends_with(" \"\\xff\" \"u\\xe9a \\xe2\\x82\"\n"));
    }

    #[test]
    fn buffer_reused_and_lines_appended() {
        let logger = NcsaLogger::new(Vec::new());
        logger.log(&sample_entry());
        logger.log(&sample_entry());
        let out = String::from_utf8(logger.into_inner()).unwrap();
        assert_eq!(out.lines().count(), 2);
        assert_eq!(out.lines().next().unwrap(), out.lines().nth(1).unwrap());
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_errors_reported_once_per_failure() {
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = errors.clone();
        let logger = NcsaLogger::new(FailingWriter).with_error_callback(move |e| {
            assert_eq!(e.kind(), io::ErrorKind::BrokenPipe);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        logger.log(&sample_entry());
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        logger.log(&sample_entry());
        assert_eq!(errors.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn write_errors_without_callback_are_swallowed() {
        let logger = NcsaLogger::new(FailingWriter);
        logger.log(&sample_entry());
    }

    /// Writes each line in two halves to widen any interleaving window.
    struct SplitWriter(Vec<u8>);

    impl Write for SplitWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let half = (buf.len() / 2).max(1);
            self.0.extend_from_slice(&buf[..half]);
            std::thread::yield_now();
            Ok(half)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn concurrent_logging_never_interleaves() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 50;

        let logger = Arc::new(NcsaLogger::new(SplitWriter(Vec::new())));
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let logger = logger.clone();
                std::thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        let mut entry = sample_entry();
                        entry.request_url = format!("/t{t}/r{i}");
                        logger.log(&entry);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let logger = Arc::try_unwrap(logger).ok().unwrap();
        let out = String::from_utf8(logger.into_inner().0).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), THREADS * PER_THREAD);
        for line in lines {
            assert!(line.starts_with("203.0.113.5 - - [02/Jan/2006:15:04:05 -0700] \"GET /t"));
            assert!(line.ends_with(" HTTP/1.1\" 200 123 \"-\" \"curl/8.0\""));
        }
    }
}
