#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tinypress::codec::resize::fit_within;
use tinypress::CropArea;

#[derive(Arbitrary, Debug)]
struct Input {
    width: u32,
    height: u32,
    max_width: Option<u32>,
    max_height: Option<u32>,
    crop: (f64, f64, f64, f64),
}

fuzz_target!(|data: Input| {
    let width = data.width.clamp(1, 100_000);
    let height = data.height.clamp(1, 100_000);

    let (w, h) = fit_within(width, height, data.max_width, data.max_height);
    assert!(w >= 1 && h >= 1 && w <= width && h <= height);

    let (x, y, cw, ch) = CropArea::new(data.crop.0, data.crop.1, data.crop.2, data.crop.3)
        .to_pixels(width, height);
    assert!(cw >= 1 && ch >= 1);
    assert!(x + cw <= width && y + ch <= height);
});
