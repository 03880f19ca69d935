#![no_main]

use libfuzzer_sys::fuzz_target;
use veil_core::frame;

fuzz_target!(|data: [u8; 4]| {
    // Header validation must never panic, whatever the announced length.
    let _ = frame::decode_header(data, 4096);
    let _ = frame::decode_header(data, u32::MAX);
});
