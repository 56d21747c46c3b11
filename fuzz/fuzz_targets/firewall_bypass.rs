#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tinypress::loader::firewall::{check_dimensions, AdmissionFirewall};
use tinypress::{FileLike, PipelineConfig};

#[derive(Arbitrary, Debug)]
struct Input {
    max_file_size: u64,
    claimed_size: u64,
    mime_type: String,
    width: u32,
    height: u32,
}

fuzz_target!(|data: Input| {
    let config = PipelineConfig::default().with_max_file_size(data.max_file_size.max(1));
    let firewall = AdmissionFirewall::from_config(&config);

    let mut file = FileLike::from_bytes("fuzz", data.mime_type, Vec::<u8>::new());
    file.size = data.claimed_size;
    if firewall.check(&file).is_ok() {
        assert!(file.size <= config.max_file_size);
        assert!(config.is_supported_type(&file.mime_type));
    }
    let _ = check_dimensions(data.width, data.height);
});
