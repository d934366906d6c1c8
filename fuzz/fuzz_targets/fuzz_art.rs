#![no_main]

use libfuzzer_sys::fuzz_target;
use tern::index::art::{Art, TokenOrdering};

fuzz_target!(|data: &[u8]| {
    // Interpret the input as a series of newline-separated tokens and
    // exercise insert, exact lookup, fuzzy lookup, and delete
    let mut art = Art::new();
    let tokens: Vec<&[u8]> = data
        .split(|&b| b == b'\n')
        .filter(|t| !t.is_empty() && !t.contains(&0))
        .take(64)
        .collect();

    for (i, token) in tokens.iter().enumerate() {
        art.upsert(token, i as u32, &[0], 1);
    }

    for token in &tokens {
        assert!(art.get(token).is_some());
        let _ = art.fuzzy_search(token, 0, 2, 10, TokenOrdering::Frequency, false);
        let _ = art.fuzzy_search(token, 0, 1, 10, TokenOrdering::MaxScore, true);
    }

    for (i, token) in tokens.iter().enumerate() {
        art.remove_doc(token, i as u32);
    }
});
