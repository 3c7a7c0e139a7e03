//! The outcall: one HTTP(S) request and its response.

use std::fmt;
use std::io::{Read, Write};

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use http::{header, HeaderName, HeaderValue, Method, StatusCode, Uri};

use crate::charset::{detect_content_encoding, Charset, ContentEncoding};
use crate::conn::body::{RequestBody, ResponseBody};
use crate::conn::{Connection, Trust};
use crate::form::{encode_form, MachineString};
use crate::{tls, Error};

#[cfg(test)]
mod test;

/// Default connect timeout in milliseconds (5 minutes).
pub const DEFAULT_CONNECT_TIMEOUT: u32 = 5 * 60 * 1000;

/// Default read timeout in milliseconds (5 minutes).
pub const DEFAULT_READ_TIMEOUT: u32 = 5 * 60 * 1000;

// Advertised regardless of the charset the form is encoded with.
const CONTENT_TYPE_FORM_URLENCODED: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// A single call to an URL, sending and receiving data.
///
/// The outcall owns its connection for its whole lifetime. It is configured
/// first, then optionally written to, then read from. Configuration is
/// rejected once the connection is established, and the request body cannot
/// be written once the response has been read.
///
/// There is no retry and no connection reuse. Dropping the outcall closes the
/// connection.
pub struct Outcall {
    connection: Connection,
    charset: Charset,
}

impl Outcall {
    /// Create a new outcall to the given URL.
    ///
    /// No network I/O happens until the body or the response is accessed.
    /// Only `http` and `https` URLs are supported.
    pub fn new<U>(url: U) -> Result<Self, Error>
    where
        Uri: TryFrom<U>,
        <Uri as TryFrom<U>>::Error: Into<http::Error>,
    {
        let uri = Uri::try_from(url).map_err(|e| Error::BadUri(e.into().to_string()))?;

        let mut connection = Connection::open(uri)?;
        connection.set_connect_timeout(DEFAULT_CONNECT_TIMEOUT);
        connection.set_read_timeout(DEFAULT_READ_TIMEOUT);

        let outcall = Outcall {
            connection,
            charset: Charset::UTF_8,
        };

        debug!("{:?}", outcall);

        Ok(outcall)
    }

    /// Send the parameters as form encoded POST.
    ///
    /// The pairs are encoded in iteration order with `charset`, which also
    /// becomes the charset of this outcall. The `Content-Type` header always
    /// says `charset=utf-8`, whichever charset is used.
    pub fn post_data<I, K, V>(&mut self, params: I, charset: Charset) -> Result<&mut Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: MachineString,
    {
        self.mark_as_post_request()?;
        self.connection
            .set_request_property(header::CONTENT_TYPE, CONTENT_TYPE_FORM_URLENCODED)?;
        self.charset = charset;

        let form = encode_form(params, charset)?;
        trace!("Post data: {}", form);

        let output = self.output()?;
        output.write_all(&charset.encode(&form)?)?;
        output.flush()?;

        Ok(self)
    }

    /// Mark the request as POST.
    ///
    /// Fails if the connection is already established.
    pub fn mark_as_post_request(&mut self) -> Result<&mut Self, Error> {
        self.connection.set_request_method(Method::POST)?;
        Ok(self)
    }

    /// The response body.
    ///
    /// The first call sends the request. For error statuses the body of the
    /// error response is returned, if the server sent one.
    pub fn input(&mut self) -> Result<&mut ResponseBody, Error> {
        let err = match self.connection.open_input() {
            Ok(()) => return self.connection.input_stream(),
            Err(e) => e,
        };

        let status = match self.connection.response_code() {
            Some(v) => v,
            None => return Err(err),
        };

        if status != StatusCode::OK {
            if let Some(body) = self.connection.error_stream() {
                debug!("Read error body of status {}", status);
                return Ok(body);
            }
        }

        Err(err)
    }

    /// The request body.
    ///
    /// The first call connects. Data written is sent once the response is
    /// requested.
    pub fn output(&mut self) -> Result<&mut RequestBody, Error> {
        self.connection.output_stream()
    }

    /// Set a request header, replacing any previous value.
    pub fn set_request_property<K, V>(&mut self, name: K, value: V) -> Result<&mut Self, Error>
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        self.connection.set_request_property(name, value)?;
        Ok(self)
    }

    /// Set the `Authorization` header for HTTP basic auth.
    ///
    /// Does nothing if `user` is blank. The credentials are encoded with the
    /// charset of this outcall.
    pub fn set_auth_params(&mut self, user: &str, password: &str) -> Result<&mut Self, Error> {
        if user.trim().is_empty() {
            return Ok(self);
        }

        let credentials = format!("{}:{}", user, password);
        let encoded = BASE64_STANDARD.encode(self.charset.encode(&credentials)?);

        self.set_request_property(header::AUTHORIZATION, format!("Basic {}", encoded))
    }

    /// Trust self-signed certificates, and only those.
    ///
    /// A server is trusted if it presents exactly one certificate. Has no
    /// effect for `http` URLs.
    ///
    /// A failure to set up TLS is logged, and reported when connecting.
    pub fn trust_self_signed_certificates(&mut self) -> &mut Self {
        if !self.connection.is_https() {
            return self;
        }

        match tls::self_signed_config() {
            Ok(v) => self.connection.set_trust(Trust::Custom(v)),
            Err(e) => {
                error!("Failed to set up TLS for self-signed certificates: {}", e);
                self.connection.set_trust(Trust::Unavailable(e.to_string()));
            }
        }

        self
    }

    /// Set the connect timeout in milliseconds. Zero means no timeout.
    pub fn set_connect_timeout(&mut self, millis: u32) -> &mut Self {
        self.connection.set_connect_timeout(millis);
        self
    }

    /// Set the read timeout in milliseconds. Zero means no timeout.
    pub fn set_read_timeout(&mut self, millis: u32) -> &mut Self {
        self.connection.set_read_timeout(millis);
        self
    }

    /// The complete response body as string.
    ///
    /// Decoded with [`Outcall::content_encoding`].
    pub fn data(&mut self) -> Result<String, Error> {
        let mut bytes = Vec::new();
        self.input()?.read_to_end(&mut bytes)?;

        let charset = self.content_encoding();
        Ok(charset.decode(&bytes).into_owned())
    }

    /// The response header with the given name.
    ///
    /// `None` if the server did not send it.
    pub fn header_field(&mut self, name: &str) -> Option<&str> {
        self.connection.header_field(name)
    }

    /// The charset of the response body.
    ///
    /// Taken from the `charset` parameter of the response `Content-Type`. If
    /// there is no such parameter, the charset of this outcall. If the
    /// parameter names an unknown charset, UTF-8.
    pub fn content_encoding(&mut self) -> Charset {
        let content_type = self.connection.header_field(header::CONTENT_TYPE.as_str());
        let detected = detect_content_encoding(content_type);

        if let ContentEncoding::UnresolvableFallback(label) = &detected {
            debug!("Ignore unknown charset {:?}, use UTF-8", label);
        }

        detected.resolve(self.charset)
    }

    /// Set a cookie.
    ///
    /// Does nothing if `name` or `value` is blank.
    pub fn set_cookie(&mut self, name: &str, value: &str) -> Result<&mut Self, Error> {
        if name.trim().is_empty() || value.trim().is_empty() {
            return Ok(self);
        }

        self.set_request_property(header::COOKIE, format!("{}={}", name, value))
    }

    /// The charset of this outcall.
    ///
    /// UTF-8 unless changed by [`Outcall::post_data`].
    pub fn charset(&self) -> Charset {
        self.charset
    }
}

impl fmt::Debug for Outcall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outcall")
            .field("connection", &self.connection)
            .field("charset", &self.charset)
            .finish()
    }
}
