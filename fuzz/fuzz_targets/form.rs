#![no_main]

use libfuzzer_sys::fuzz_target;
use outcall::{encode_form, Charset};

// Pairs are separated by NUL, key and value by the first '='.
fuzz_target!(|data: &str| {
    let params: Vec<(&str, &str)> = data
        .split('\0')
        .map(|p| p.split_once('=').unwrap_or((p, "")))
        .collect();

    let Ok(body) = encode_form(params.iter().copied(), Charset::UTF_8) else {
        panic!("utf-8 can encode any string");
    };

    assert!(body.is_ascii());
    assert_eq!(body.split('&').count(), params.len());

    if let Some(latin1) = Charset::for_label("ISO-8859-1") {
        let _ = encode_form(params, latin1);
    }
});
