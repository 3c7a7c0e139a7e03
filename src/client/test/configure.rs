use http::{header, Method};

use crate::client::{Outcall, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
use crate::conn::Trust;
use crate::{Charset, Error};

fn outcall() -> Outcall {
    Outcall::new("http://example.test/path").unwrap()
}

fn header_value<'a>(call: &'a Outcall, name: header::HeaderName) -> Option<&'a str> {
    call.connection
        .request_headers()
        .get(name)
        .map(|v| v.to_str().unwrap())
}

#[test]
fn new_defaults() {
    let call = outcall();

    assert_eq!(
        call.connection.timeouts(),
        (DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT)
    );
    assert_eq!(call.connection.timeouts(), (300_000, 300_000));
    assert_eq!(call.connection.method(), Method::GET);
    assert_eq!(call.charset(), Charset::UTF_8);
    assert!(call.connection.request_headers().is_empty());
}

#[test]
fn new_rejects_bad_urls() {
    let err = Outcall::new("").unwrap_err();
    assert!(matches!(err, Error::BadUri(_)));

    let err = Outcall::new("ftp://example.test/file").unwrap_err();
    assert!(matches!(err, Error::UnsupportedScheme(_)));

    let err = Outcall::new("http://exa mple.test/").unwrap_err();
    assert!(matches!(err, Error::BadUri(_)));
}

#[test]
fn new_accepts_owned_url() {
    let url = String::from("https://example.test:8443/a?b=c");
    assert!(Outcall::new(url).is_ok());
}

#[test]
fn mark_as_post() {
    let mut call = outcall();
    call.mark_as_post_request().unwrap();
    assert_eq!(call.connection.method(), Method::POST);
}

#[test]
fn request_property_overwrites() {
    let mut call = outcall();
    call.set_request_property("X-Trace", "a")
        .unwrap()
        .set_request_property("x-trace", "b")
        .unwrap();

    let values: Vec<_> = call
        .connection
        .request_headers()
        .get_all("x-trace")
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(values, ["b"]);
}

#[test]
fn basic_auth_known_vector() {
    let mut call = outcall();
    call.set_auth_params("alice", "wonderland").unwrap();

    assert_eq!(
        header_value(&call, header::AUTHORIZATION),
        Some("Basic YWxpY2U6d29uZGVybGFuZA==")
    );
}

#[test]
fn basic_auth_blank_user() {
    let mut call = outcall();
    call.set_auth_params("", "secret").unwrap();
    call.set_auth_params("   ", "secret").unwrap();

    assert!(call.connection.request_headers().is_empty());
}

#[test]
fn basic_auth_empty_password() {
    let mut call = outcall();
    call.set_auth_params("alice", "").unwrap();

    // base64("alice:")
    assert_eq!(
        header_value(&call, header::AUTHORIZATION),
        Some("Basic YWxpY2U6")
    );
}

#[test]
fn basic_auth_uses_charset() {
    let mut call = outcall();
    call.set_auth_params("jürgen", "pw").unwrap();
    assert_eq!(
        header_value(&call, header::AUTHORIZATION),
        Some("Basic asO8cmdlbjpwdw==")
    );

    let mut call = outcall();
    call.charset = Charset::for_label("ISO-8859-1").unwrap();
    call.set_auth_params("jürgen", "pw").unwrap();
    assert_eq!(
        header_value(&call, header::AUTHORIZATION),
        Some("Basic avxyZ2VuOnB3")
    );

    let err = call.set_auth_params("日本", "pw").unwrap_err();
    assert!(matches!(err, Error::UnmappableCharacter(_)));
}

#[test]
fn basic_auth_utf16() {
    let mut call = outcall();
    call.charset = Charset::for_label("UTF-16LE").unwrap();
    call.set_auth_params("a", "b").unwrap();

    assert_eq!(
        header_value(&call, header::AUTHORIZATION),
        Some("Basic YQA6AGIA")
    );
}

#[test]
fn basic_auth_is_repeatable() {
    let mut call = outcall();
    call.set_auth_params("alice", "wonderland").unwrap();
    call.set_auth_params("alice", "wonderland").unwrap();

    assert_eq!(call.connection.request_headers().len(), 1);
    assert_eq!(
        header_value(&call, header::AUTHORIZATION),
        Some("Basic YWxpY2U6d29uZGVybGFuZA==")
    );
}

#[test]
fn cookie_set() {
    let mut call = outcall();
    call.set_cookie("session", "abc").unwrap();

    assert_eq!(header_value(&call, header::COOKIE), Some("session=abc"));
    assert_eq!(call.connection.request_headers().len(), 1);
}

#[test]
fn cookie_blank_is_skipped() {
    let mut call = outcall();
    call.set_cookie("", "abc").unwrap();
    call.set_cookie("session", "").unwrap();
    call.set_cookie(" ", "abc").unwrap();

    assert!(call.connection.request_headers().is_empty());
}

#[test]
fn cookie_overwrites() {
    let mut call = outcall();
    call.set_cookie("a", "1").unwrap().set_cookie("b", "2").unwrap();

    assert_eq!(header_value(&call, header::COOKIE), Some("b=2"));
}

#[test]
fn timeouts() {
    let mut call = outcall();
    call.set_connect_timeout(1_000).set_read_timeout(0);

    assert_eq!(call.connection.timeouts(), (1_000, 0));
}

#[test]
fn trust_self_signed_ignored_for_http() {
    let mut call = outcall();
    call.trust_self_signed_certificates();

    assert!(matches!(call.connection.trust(), Trust::WebPki));
}

#[test]
fn trust_self_signed_for_https() {
    let mut call = Outcall::new("https://example.test/").unwrap();
    call.trust_self_signed_certificates();

    assert!(matches!(call.connection.trust(), Trust::Custom(_)));
}

#[test]
fn unavailable_trust_fails_on_connect() {
    let mut call = Outcall::new("https://example.test/").unwrap();
    call.connection
        .set_trust(Trust::Unavailable("no provider".to_string()));

    let err = call.output().unwrap_err();
    assert!(matches!(err, Error::Tls(v) if v == "no provider"));
}
