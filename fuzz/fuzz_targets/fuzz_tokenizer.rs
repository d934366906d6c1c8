#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Fuzz tokenization with arbitrary bytes
    // This tests separator handling and UTF-8 byte pass-through
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = tern::utils::Tokenizer::new(text).tokenize();
        let _ = tern::utils::Tokenizer::verbatim(text).tokenize();
    }
});
