//! Fuzz target: label file parser
//!
//! Feeds arbitrary UTF-8 to `LabelMap::parse` and verifies:
//! - No panics on any input
//! - Every stored label is non-empty and trimmed
//! - `class_count` covers every labelled id
//!
//! cargo fuzz run fuzz_label_file

#![no_main]

use edgetrigger::adapters::labels::{LabelMap, LabelRef};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    let map = LabelMap::parse(text);

    assert!(map.len() <= text.lines().count());
    let mut named = 0;
    for id in 0..map.class_count() {
        let Ok(id) = u16::try_from(id) else { break };
        if let LabelRef::Named(name) = map.get(id) {
            assert!(!name.is_empty(), "empty label for id {id}");
            assert_eq!(name, name.trim(), "untrimmed label for id {id}");
            named += 1;
        }
    }
    assert_eq!(named, map.len(), "labelled ids beyond class_count");
});
