#![no_main]

//! EXIF orientation lookup on arbitrary data.

use libfuzzer_sys::fuzz_target;
use tinypress::loader::detect_exif_orientation;

fuzz_target!(|data: &[u8]| {
    if let Some(orientation) = detect_exif_orientation(data) {
        assert!((1..=8).contains(&orientation));
    }
});
