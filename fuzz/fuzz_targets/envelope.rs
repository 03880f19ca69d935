#![no_main]

use libfuzzer_sys::fuzz_target;
use veil_crypto::Envelope;

fuzz_target!(|data: &[u8]| {
    // Opening arbitrary bytes must never panic; at worst it fails to
    // authenticate or is rejected as malformed.
    let envelope = Envelope::new(&[0u8; 16]);
    let _ = envelope.open(data);
});
