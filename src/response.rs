//! Response value type (spec.md §4.A).

use crate::error::Error;

/// Server response to a [`crate::Request`].
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Numeric status parsed from `:status`; `0` if the header was absent.
    pub code: u16,
    /// Remaining headers, `:status` removed.
    pub header: Vec<(String, String)>,
    /// Decoded JSON body; `None` when the body was empty.
    pub data: Option<serde_json::Value>,
}

impl Response {
    /// Assembles a `Response` from the collected header map and body bytes.
    ///
    /// A non-empty body that fails to parse as JSON raises
    /// [`Error::FormatError`] carrying the first 20 bytes.
    pub(crate) fn new(mut header: Vec<(String, String)>, body: &[u8]) -> Result<Response, Error> {
        let code = header
            .iter()
            .position(|(k, _)| k == ":status")
            .map(|i| header.remove(i).1)
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(0);

        let data = if body.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(body).map_err(|_| Error::format_error(body))?)
        };

        Ok(Response { code, header, data })
    }

    /// The `apns-id` response header, if present.
    pub fn apns_id(&self) -> Option<&str> {
        self.header
            .iter()
            .find(|(k, _)| k == "apns-id")
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_status_and_strips_it_from_headers() {
        let resp = Response::new(
            vec![
                (":status".into(), "200".into()),
                ("apns-id".into(), "UUID-1".into()),
            ],
            b"",
        )
        .unwrap();
        assert_eq!(resp.code, 200);
        assert_eq!(resp.data, None);
        assert_eq!(resp.apns_id(), Some("UUID-1"));
        assert!(resp.header.iter().all(|(k, _)| k != ":status"));
    }

    #[test]
    fn decodes_json_body() {
        let resp = Response::new(vec![(":status".into(), "400".into())], br#"{"reason":"BadDeviceToken"}"#)
            .unwrap();
        assert_eq!(resp.code, 400);
        assert_eq!(resp.data, Some(json!({"reason": "BadDeviceToken"})));
    }

    #[test]
    fn missing_status_defaults_to_zero() {
        let resp = Response::new(vec![], b"").unwrap();
        assert_eq!(resp.code, 0);
    }

    #[test]
    fn malformed_json_raises_format_error() {
        let err = Response::new(vec![(":status".into(), "200".into())], b"not json").unwrap_err();
        match err {
            Error::FormatError(prefix) => assert_eq!(&prefix, b"not json"),
            other => panic!("expected FormatError, got {other:?}"),
        }
    }

    #[test]
    fn round_trips_arbitrary_json_value() {
        let obj = json!({"aps": {"alert": "hi", "badge": 3}, "list": [1, 2, 3]});
        let body = serde_json::to_vec(&obj).unwrap();
        let resp = Response::new(vec![(":status".into(), "200".into())], &body).unwrap();
        assert_eq!(resp.data, Some(obj));
    }
}
