#![no_main]
use libfuzzer_sys::fuzz_target;
use mongo_operators::{FindQuery, MemoryCollection, QueryParams, map_operators};

fuzz_target!(|data: &[u8]| {
    if data.len() > 8192 { return; }
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(params) = QueryParams::from_json_str(s) {
            let col = MemoryCollection::new("fuzz");
            col.create_text_index(["name"]);
            col.insert_many([
                bson::doc!{"a": 1, "b": 2, "name": "x"},
                bson::doc!{"a": 10, "b": -5, "name": "y z", "nested": {"z": 3}},
                bson::doc!{"active": true, "tags": ["p", "q"]}
            ]);
            // Bad filters must surface as errors, not panics
            let _ = map_operators(&col, &params, None).exec();
        }
    }
});
