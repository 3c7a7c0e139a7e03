#![no_main]

use libfuzzer_sys::fuzz_target;
use outcall::{detect_content_encoding, Charset, ContentEncoding};

// First byte splits the input into a content-type header and a body.
fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let split = (split as usize).min(rest.len());
    let (header, body) = rest.split_at(split);

    let header = String::from_utf8_lossy(header);
    let detected = detect_content_encoding(Some(&header));

    if let ContentEncoding::Explicit(charset) = &detected {
        assert!(!charset.name().is_empty());
    }

    let charset = detected.resolve(Charset::UTF_8);
    let _ = charset.decode(body);
});
