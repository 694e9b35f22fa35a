//! Request value type (spec.md §4.A).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Body size limit APNs enforces (spec.md §6).
pub const MAX_NOTIFICATION_PAYLOAD_SIZE: usize = 5120;

/// An immutable description of what to send. Built with [`Request::new`],
/// never mutated after.
#[derive(Debug, Clone)]
pub struct Request {
    /// Header fields in transmission order, not yet including `:authority`.
    pub(crate) header: Vec<(String, String)>,
    /// JSON-encoded payload, UTF-8, `<= MAX_NOTIFICATION_PAYLOAD_SIZE` bytes.
    pub(crate) body: Vec<u8>,
    /// Absolute deadline in seconds since `UNIX_EPOCH`-like monotonic origin;
    /// `f64::INFINITY` means none.
    pub(crate) deadline: f64,
}

/// Error constructing a [`Request`]: both `timeout` and `deadline` were
/// given, or the path didn't start with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Both `timeout` and `deadline` were specified; exactly one is allowed.
    AmbiguousDeadline,
    /// `path` did not start with `/`.
    InvalidPath,
    /// The JSON-encoded body exceeded [`MAX_NOTIFICATION_PAYLOAD_SIZE`].
    PayloadTooLarge,
    /// `data` failed to JSON-encode (e.g. a `NaN`/infinite float, or a
    /// custom `Serialize` impl that errored). Carries the encoder's message
    /// rather than the `serde_json::Error` itself, so `RequestError` stays
    /// `Clone + PartialEq` like its other variants.
    SerializationFailed(String),
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestError::AmbiguousDeadline => {
                write!(f, "specify timeout or deadline, but not both")
            }
            RequestError::InvalidPath => write!(f, "path must start with '/'"),
            RequestError::PayloadTooLarge => write!(
                f,
                "body exceeds MAX_NOTIFICATION_PAYLOAD_SIZE ({MAX_NOTIFICATION_PAYLOAD_SIZE} bytes)"
            ),
            RequestError::SerializationFailed(msg) => {
                write!(f, "payload failed to JSON-encode: {msg}")
            }
        }
    }
}

impl std::error::Error for RequestError {}

/// Returns the current time as seconds since a fixed monotonic-comparable
/// origin. Deadlines are absolute: a retry reusing the same `Request` does
/// not get a fresh window (spec.md §5).
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

impl Request {
    /// Builds a `POST` request to `path` carrying `data` JSON-encoded.
    ///
    /// Exactly one of `timeout`/`deadline` may be `Some`; `path` must begin
    /// with `/`.
    pub fn new<T: Serialize>(
        path: &str,
        header: Option<Vec<(String, String)>>,
        data: &T,
        timeout: Option<Duration>,
        deadline: Option<f64>,
    ) -> Result<Request, RequestError> {
        if timeout.is_some() && deadline.is_some() {
            return Err(RequestError::AmbiguousDeadline);
        }
        if !path.starts_with('/') {
            return Err(RequestError::InvalidPath);
        }

        let deadline = match (timeout, deadline) {
            (Some(t), None) => now() + t.as_secs_f64(),
            (None, Some(d)) => d,
            (None, None) => f64::INFINITY,
            (Some(_), Some(_)) => unreachable!(),
        };

        let mut fields = vec![
            (":method".to_owned(), "POST".to_owned()),
            (":scheme".to_owned(), "https".to_owned()),
            (":path".to_owned(), path.to_owned()),
        ];
        fields.extend(header.unwrap_or_default());

        // `ensure_ascii=False` in the Python original: serde_json already
        // preserves non-ASCII literally (UTF-8 output), nothing to configure.
        let body = serde_json::to_vec(data)
            .map_err(|e| RequestError::SerializationFailed(e.to_string()))?;
        if body.len() > MAX_NOTIFICATION_PAYLOAD_SIZE {
            return Err(RequestError::PayloadTooLarge);
        }

        Ok(Request {
            header: fields,
            body,
            deadline,
        })
    }

    /// The request body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The absolute deadline, in the same units as [`now`].
    pub fn deadline(&self) -> f64 {
        self.deadline
    }

    /// Header fields with the `:authority` pseudo-header prepended.
    pub(crate) fn header_with(&self, host: &str, port: u16) -> Vec<(String, String)> {
        let mut out = Vec::with_capacity(self.header.len() + 1);
        out.push((":authority".to_owned(), format!("{host}:{port}")));
        out.extend(self.header.iter().cloned());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_both_timeout_and_deadline() {
        let err = Request::new(
            "/3/device/abc",
            None,
            &json!({}),
            Some(Duration::from_secs(1)),
            Some(1.0),
        )
        .unwrap_err();
        assert_eq!(err, RequestError::AmbiguousDeadline);
    }

    #[test]
    fn rejects_path_without_leading_slash() {
        let err = Request::new("3/device/abc", None, &json!({}), None, None).unwrap_err();
        assert_eq!(err, RequestError::InvalidPath);
    }

    #[test]
    fn neither_timeout_nor_deadline_means_no_deadline() {
        let req = Request::new("/3/device/abc", None, &json!({}), None, None).unwrap();
        assert_eq!(req.deadline(), f64::INFINITY);
    }

    #[test]
    fn pseudo_headers_come_first_in_order() {
        let req = Request::new(
            "/3/device/abc",
            Some(vec![("apns-topic".into(), "com.example.app".into())]),
            &json!({"aps": {"alert": "hi"}}),
            None,
            None,
        )
        .unwrap();
        let with_authority = req.header_with("api.push.apple.com", 443);
        assert_eq!(
            with_authority[0],
            (":authority".to_owned(), "api.push.apple.com:443".to_owned())
        );
        assert_eq!(with_authority[1], (":method".to_owned(), "POST".to_owned()));
        assert_eq!(with_authority[2], (":scheme".to_owned(), "https".to_owned()));
        assert_eq!(with_authority[3].0, ":path");
        assert_eq!(
            with_authority[4],
            ("apns-topic".to_owned(), "com.example.app".to_owned())
        );
    }

    #[test]
    fn rejects_oversized_body_at_construction() {
        let huge = "x".repeat(MAX_NOTIFICATION_PAYLOAD_SIZE);
        let err = Request::new("/3/device/abc", None, &json!({ "pad": huge }), None, None)
            .unwrap_err();
        assert_eq!(err, RequestError::PayloadTooLarge);
    }

    struct AlwaysFailsToSerialize;

    impl Serialize for AlwaysFailsToSerialize {
        fn serialize<S>(&self, _serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            Err(serde::ser::Error::custom("boom"))
        }
    }

    #[test]
    fn propagates_serialization_failure_instead_of_panicking() {
        let err = Request::new("/3/device/abc", None, &AlwaysFailsToSerialize, None, None)
            .unwrap_err();
        match err {
            RequestError::SerializationFailed(msg) => assert!(msg.contains("boom")),
            other => panic!("expected SerializationFailed, got {other:?}"),
        }
    }

    #[test]
    fn body_preserves_non_ascii_literally() {
        let req = Request::new(
            "/3/device/abc",
            None,
            &json!({"aps": {"alert": "caf\u{e9}"}}),
            None,
            None,
        )
        .unwrap();
        let s = std::str::from_utf8(req.body()).unwrap();
        assert!(s.contains('\u{e9}'));
    }
}
