#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(image) = pedis::load_image(data) else {
        return;
    };
    let source = data.to_vec();
    let decoder = pedis::IcedDecoder::new(image.bitness());
    let outcome = pedis::run_scan(&image, &source, &decoder);
    let mut sink = std::io::sink();
    let options = pedis::ListingOptions { exhaustive: data.len() % 2 == 1 };
    let _ = pedis::print_report(&image, &source, &decoder, &outcome.code_map, options, &mut sink);
});
