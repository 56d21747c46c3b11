#![no_main]

use libfuzzer_sys::fuzz_target;
use tinypress::loader::{display_dimensions, probe_dimensions};

fuzz_target!(|data: &[u8]| {
    let _ = probe_dimensions(data);
    let _ = display_dimensions(data);
});
