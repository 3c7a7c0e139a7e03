//! The connection handle behind an outcall.
//!
//! A [`Connection`] accumulates request configuration until it connects. The
//! socket is opened when the request body is first accessed, and the request is
//! sent when the response is first accessed. Once connected, configuration is
//! rejected.

use std::fmt;
use std::io::{self, Read, Write};
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use http::uri::Scheme;
use http::{
    header, HeaderMap, HeaderName, HeaderValue, Method, Response, StatusCode, Uri, Version,
};
use rustls::ClientConfig;

use self::body::{BodyReader, RequestBody, ResponseBody};
use self::parser::{try_parse_response, MAX_RESPONSE_HEADERS};
use self::stream::Stream;
use crate::{tls, Error};

pub(crate) mod body;
mod parser;
mod stream;

const USER_AGENT: &str = concat!("outcall/", env!("CARGO_PKG_VERSION"));

/// Max number of redirects followed for one exchange.
pub(crate) const MAX_REDIRECTS: u32 = 20;

/// How the server certificate is verified for https.
#[derive(Debug)]
pub(crate) enum Trust {
    /// Against the webpki root certificates.
    WebPki,
    /// With a preconfigured client config.
    Custom(Arc<ClientConfig>),
    /// The TLS config could not be built. Connecting fails with this reason.
    Unavailable(String),
}

enum Phase {
    Unconnected,
    Writing {
        stream: Stream,
        body: RequestBody,
    },
    Reading {
        response: Response<()>,
        body: ResponseBody,
    },
    Failed(String),
}

impl Phase {
    fn request_body(&mut self) -> Result<&mut RequestBody, Error> {
        match self {
            Phase::Unconnected => Err(Error::ExchangeFailed("not connected".to_string())),
            Phase::Writing { body, .. } => Ok(body),
            Phase::Reading { .. } => Err(Error::OutputAfterInput),
            Phase::Failed(reason) => Err(Error::ExchangeFailed(reason.clone())),
        }
    }
}

pub(crate) struct Connection {
    uri: Uri,
    method: Method,
    headers: HeaderMap,
    connect_timeout: u32,
    read_timeout: u32,
    trust: Trust,
    phase: Phase,
}

impl Connection {
    /// Open a connection handle for the uri. Does no network I/O.
    pub fn open(uri: Uri) -> Result<Self, Error> {
        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            Some(v) => return Err(Error::UnsupportedScheme(v.to_string())),
            None => return Err(Error::BadUri(format!("missing scheme: {}", uri))),
        }

        if uri.host().map(|h| h.is_empty()).unwrap_or(true) {
            return Err(Error::BadUri(format!("missing host: {}", uri)));
        }

        Ok(Connection {
            uri,
            method: Method::GET,
            headers: HeaderMap::new(),
            connect_timeout: 0,
            read_timeout: 0,
            trust: Trust::WebPki,
            phase: Phase::Unconnected,
        })
    }

    pub fn is_https(&self) -> bool {
        self.uri.scheme() == Some(&Scheme::HTTPS)
    }

    fn is_unconnected(&self) -> bool {
        matches!(self.phase, Phase::Unconnected)
    }

    pub fn set_request_method(&mut self, method: Method) -> Result<(), Error> {
        if !self.is_unconnected() {
            return Err(Error::AlreadyConnected);
        }
        self.method = method;
        Ok(())
    }

    /// Set a request header, replacing any previous value.
    pub fn set_request_property<K, V>(&mut self, name: K, value: V) -> Result<(), Error>
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        if !self.is_unconnected() {
            return Err(Error::AlreadyConnected);
        }

        let name =
            HeaderName::try_from(name).map_err(|e| Error::BadHeader(e.into().to_string()))?;
        let value =
            HeaderValue::try_from(value).map_err(|e| Error::BadHeader(e.into().to_string()))?;

        self.headers.insert(name, value);
        Ok(())
    }

    pub fn set_connect_timeout(&mut self, millis: u32) {
        if !self.is_unconnected() {
            warn!("Connect timeout changed after connecting has no effect");
        }
        self.connect_timeout = millis;
    }

    pub fn set_read_timeout(&mut self, millis: u32) {
        self.read_timeout = millis;

        let timeout = to_timeout(millis);
        let result = match &self.phase {
            Phase::Writing { stream, .. } => stream.set_read_timeout(timeout),
            Phase::Reading { body, .. } => body.set_read_timeout(timeout),
            _ => Ok(()),
        };

        if let Err(e) = result {
            warn!("Failed to apply read timeout to socket: {}", e);
        }
    }

    pub fn set_trust(&mut self, trust: Trust) {
        if !self.is_unconnected() {
            warn!("TLS trust changed after connecting has no effect");
        }
        self.trust = trust;
    }

    /// Request body, connecting if needed.
    ///
    /// A GET request turns into POST when its body is accessed.
    pub fn output_stream(&mut self) -> Result<&mut RequestBody, Error> {
        if self.is_unconnected() {
            if self.method == Method::GET {
                debug!("Request body accessed, switch GET to POST");
                self.method = Method::POST;
            }
            let stream = self.connect()?;
            self.phase = Phase::Writing {
                stream,
                body: RequestBody::default(),
            };
        }

        self.phase.request_body()
    }

    /// Send the request and read the response head, if not done already.
    ///
    /// Fails with [`Error::HttpStatus`] when the server responded with an
    /// error status. The response is kept and can still be inspected.
    pub fn open_input(&mut self) -> Result<(), Error> {
        self.ensure_exchanged()?;

        match self.response_code() {
            Some(v) if v.is_client_error() || v.is_server_error() => Err(Error::HttpStatus(v)),
            _ => Ok(()),
        }
    }

    pub fn input_stream(&mut self) -> Result<&mut ResponseBody, Error> {
        self.open_input()?;

        match &mut self.phase {
            Phase::Reading { body, .. } => Ok(body),
            _ => Err(Error::ExchangeFailed("no response".to_string())),
        }
    }

    /// The response body of an error status, if there is one.
    pub fn error_stream(&mut self) -> Option<&mut ResponseBody> {
        match &mut self.phase {
            Phase::Reading { response, body }
                if (response.status().is_client_error() || response.status().is_server_error())
                    && body.has_content() =>
            {
                Some(body)
            }
            _ => None,
        }
    }

    pub fn response_code(&self) -> Option<StatusCode> {
        match &self.phase {
            Phase::Reading { response, .. } => Some(response.status()),
            _ => None,
        }
    }

    /// Last value of a response header.
    ///
    /// Performs the exchange if needed. Failures are logged and read as an
    /// absent header.
    pub fn header_field(&mut self, name: &str) -> Option<&str> {
        if let Err(e) = self.ensure_exchanged() {
            debug!("No response header {}: {}", name, e);
            return None;
        }

        match &self.phase {
            Phase::Reading { response, .. } => response
                .headers()
                .get_all(name)
                .iter()
                .last()
                .and_then(|v| v.to_str().ok()),
            _ => None,
        }
    }

    fn ensure_exchanged(&mut self) -> Result<(), Error> {
        let placeholder = Phase::Failed("exchange interrupted".to_string());

        let result = match mem::replace(&mut self.phase, placeholder) {
            reading @ Phase::Reading { .. } => {
                self.phase = reading;
                return Ok(());
            }
            Phase::Failed(reason) => {
                self.phase = Phase::Failed(reason.clone());
                return Err(Error::ExchangeFailed(reason));
            }
            Phase::Unconnected => self
                .connect()
                .and_then(|stream| self.exchange(stream, None)),
            Phase::Writing { stream, body } => self.exchange(stream, Some(body)),
        };

        match result {
            Ok((response, body)) => {
                self.phase = Phase::Reading { response, body };
                Ok(())
            }
            Err(e) => {
                debug!("Exchange with {} failed: {}", self.uri, e);
                self.phase = Phase::Failed(e.to_string());
                Err(e)
            }
        }
    }

    fn connect(&self) -> Result<Stream, Error> {
        let tls = if self.is_https() {
            let config = match &self.trust {
                Trust::WebPki => tls::webpki_config().map_err(|e| Error::Tls(e.to_string()))?,
                Trust::Custom(v) => v.clone(),
                Trust::Unavailable(reason) => return Err(Error::Tls(reason.clone())),
            };
            Some(config)
        } else {
            None
        };

        let host = self.uri.host().unwrap_or_default();
        // IPv6 literals are bracketed in the uri.
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port = self.uri.port_u16().unwrap_or_else(|| default_port(&self.uri));

        debug!("Connect {}:{} for {}", host, port, self.uri);

        Stream::connect(
            host,
            port,
            to_timeout(self.connect_timeout),
            to_timeout(self.read_timeout),
            tls,
        )
    }

    /// Send the request and follow redirects to the final response.
    ///
    /// 301, 302 and 303 turn the request into GET (HEAD stays HEAD) and drop
    /// the body. 307 and 308 resend method and body. Redirects to another
    /// scheme are not followed. Authorization and cookies are dropped when the
    /// host changes.
    fn exchange(
        &mut self,
        mut stream: Stream,
        mut body: Option<RequestBody>,
    ) -> Result<(Response<()>, ResponseBody), Error> {
        let mut redirects = 0;

        loop {
            let (response, reader) = self.send_and_receive(stream, body.as_ref())?;

            let Some(next) = self.redirect_target(&response)? else {
                return Ok((response, reader));
            };

            if redirects == MAX_REDIRECTS {
                return Err(Error::TooManyRedirects(MAX_REDIRECTS));
            }
            redirects += 1;

            // One exchange per connection.
            drop(reader);

            let status = response.status();
            let retains_method = status == StatusCode::TEMPORARY_REDIRECT
                || status == StatusCode::PERMANENT_REDIRECT;

            if !retains_method && self.method != Method::HEAD {
                if self.method != Method::GET {
                    debug!("Redirect {} changes {} to GET", status, self.method);
                    self.headers.remove(header::CONTENT_TYPE);
                }
                self.method = Method::GET;
                body = None;
            }

            if self.uri.host() != next.host() || self.uri.port_u16() != next.port_u16() {
                self.headers.remove(header::AUTHORIZATION);
                self.headers.remove(header::COOKIE);
            }

            debug!("Follow redirect {} to {}", status, next);
            self.uri = next;

            stream = self.connect()?;
        }
    }

    /// Where a redirect response points, if it is to be followed.
    fn redirect_target(&self, response: &Response<()>) -> Result<Option<Uri>, Error> {
        let status = response.status();
        let is_redirect = matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308);
        if !is_redirect {
            return Ok(None);
        }

        let Some(header) = response.headers().get(header::LOCATION) else {
            debug!("Redirect {} without location header", status);
            return Ok(None);
        };

        let bad_location =
            || Error::BadLocationHeader(String::from_utf8_lossy(header.as_bytes()).to_string());

        let location = header.to_str().map_err(|_| bad_location())?;
        let next = resolve_location(&self.uri, location).ok_or_else(bad_location)?;

        if next.scheme() != self.uri.scheme() {
            debug!("Not following redirect {} to other scheme: {}", status, next);
            return Ok(None);
        }

        Ok(Some(next))
    }

    fn send_and_receive(
        &self,
        mut stream: Stream,
        body: Option<&RequestBody>,
    ) -> Result<(Response<()>, ResponseBody), Error> {
        let head = self.request_head(body.map(|b| b.len()))?;
        trace!("{}", String::from_utf8_lossy(&head));

        stream.write_all(&head)?;
        if let Some(body) = body {
            stream.write_all(body.as_bytes())?;
        }
        stream.flush()?;

        let (response, leftover) = read_response(&mut stream)?;
        let reader =
            BodyReader::for_response(&self.method, response.status(), response.headers())?;

        debug!("Response {} {:?} body: {:?}", self.uri, response.status(), reader);

        Ok((response, ResponseBody::new(leftover, stream, reader)))
    }

    /// Serialize the request line and headers.
    pub(crate) fn request_head(&self, body_len: Option<usize>) -> Result<Vec<u8>, Error> {
        let mut headers = HeaderMap::new();

        if let Some(host) = self.uri.host() {
            headers.insert(header::HOST, maybe_with_port(host, &self.uri)?);
        }
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        // One exchange per connection.
        headers.insert(header::CONNECTION, HeaderValue::from_static("close"));

        for (k, v) in &self.headers {
            headers.insert(k.clone(), v.clone());
        }

        let body_len = match body_len {
            Some(v) => Some(v),
            None if self.method == Method::POST => Some(0),
            None => None,
        };
        if let Some(v) = body_len {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(v));
        }

        let target = self
            .uri
            .path_and_query()
            .map(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .unwrap_or("/");

        let mut w = Vec::new();
        write!(w, "{} {} {:?}\r\n", self.method, target, Version::HTTP_11)?;
        for (k, v) in &headers {
            write!(w, "{}: ", k)?;
            w.write_all(v.as_bytes())?;
            write!(w, "\r\n")?;
        }
        write!(w, "\r\n")?;

        Ok(w)
    }

    #[cfg(test)]
    pub(crate) fn method(&self) -> &Method {
        &self.method
    }

    #[cfg(test)]
    pub(crate) fn request_headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[cfg(test)]
    pub(crate) fn trust(&self) -> &Trust {
        &self.trust
    }

    #[cfg(test)]
    pub(crate) fn timeouts(&self) -> (u32, u32) {
        (self.connect_timeout, self.read_timeout)
    }
}

/// Read until a final response head is parsed. Returns the input read past it.
fn read_response(stream: &mut impl Read) -> Result<(Response<()>, Vec<u8>), Error> {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 4096];

    loop {
        while let Some((input_used, response)) =
            try_parse_response::<MAX_RESPONSE_HEADERS>(&buf)?
        {
            buf.drain(..input_used);

            let status = response.status();
            if status.is_informational() && status != StatusCode::SWITCHING_PROTOCOLS {
                debug!("Skip interim response {}", status);
                continue;
            }

            return Ok((response, buf));
        }

        let n = stream.read(&mut chunk)?;
        if n == 0 {
            let err = io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before response",
            );
            return Err(err.into());
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Resolve a location header, possibly relative, against the request uri.
fn resolve_location(base: &Uri, location: &str) -> Option<Uri> {
    let base = url::Url::parse(&base.to_string()).ok()?;
    let mut next = base.join(location).ok()?;
    next.set_fragment(None);

    let next = Uri::try_from(next.as_str()).ok()?;
    next.host()?;

    Some(next)
}

fn default_port(uri: &Uri) -> u16 {
    if uri.scheme() == Some(&Scheme::HTTPS) {
        443
    } else {
        80
    }
}

fn maybe_with_port(host: &str, uri: &Uri) -> Result<HeaderValue, Error> {
    fn from_str(src: &str) -> Result<HeaderValue, Error> {
        HeaderValue::from_str(src).map_err(|e| Error::BadHeader(e.to_string()))
    }

    if let Some(port) = uri.port_u16() {
        if port != default_port(uri) {
            return from_str(&format!("{}:{}", host, port));
        }
    }

    from_str(host)
}

/// Zero means no timeout.
fn to_timeout(millis: u32) -> Option<Duration> {
    if millis == 0 {
        None
    } else {
        Some(Duration::from_millis(millis as u64))
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self.phase {
            Phase::Unconnected => "Unconnected",
            Phase::Writing { .. } => "Writing",
            Phase::Reading { .. } => "Reading",
            Phase::Failed(_) => "Failed",
        };
        write!(f, "Connection<{}>({} {})", phase, self.method, self.uri)
    }
}
