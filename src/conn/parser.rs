use http::{Response, StatusCode, Version};

use crate::Error;

/// Max number of headers to parse from an HTTP response
pub(crate) const MAX_RESPONSE_HEADERS: usize = 100;

/// Try to parse a response head from `input`.
///
/// Returns `None` until the input holds the complete head. On success the
/// `usize` is the amount of input consumed.
pub(crate) fn try_parse_response<const N: usize>(
    input: &[u8],
) -> Result<Option<(usize, Response<()>)>, Error> {
    let mut headers = [httparse::EMPTY_HEADER; N];
    let mut res = httparse::Response::new(&mut headers);

    let input_used = match res.parse(input) {
        Ok(httparse::Status::Complete(v)) => v,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(httparse::Error::TooManyHeaders) => return Err(Error::HttpParseTooManyHeaders),
        Err(e) => return Err(e.into()),
    };

    let version = match res.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        _ => return Err(Error::UnsupportedVersion),
    };

    let status = res
        .code
        .and_then(|v| StatusCode::from_u16(v).ok())
        .ok_or_else(|| Error::HttpParseFail("invalid status code".to_string()))?;

    let mut builder = Response::builder().version(version).status(status);
    for h in res.headers.iter() {
        builder = builder.header(h.name, h.value);
    }

    let response = builder
        .body(())
        .map_err(|e| Error::BadHeader(e.to_string()))?;

    Ok(Some((input_used, response)))
}
