#![no_main]
use libfuzzer_sys::fuzz_target;
use mongo_operators::{QueryParams, Translator};

fuzz_target!(|data: &[u8]| {
    if data.len() > 8192 { return; }
    if let Ok(s) = std::str::from_utf8(data) {
        // Parsing and translating arbitrary query strings should never panic
        let params = QueryParams::from_query_string(s, true);
        let _ = Translator::default().translate(&params, None);
    }
});
