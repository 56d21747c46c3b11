#![no_main]

use libfuzzer_sys::fuzz_target;
use tinypress::codec::decoder::decode_oriented;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    let _ = decode_oriented(data);
});
