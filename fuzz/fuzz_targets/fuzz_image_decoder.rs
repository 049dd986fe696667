//! Fuzz target: image decoding and input resizing
//!
//! Drives `decode_image` and `resize_to` with arbitrary bytes and
//! verifies:
//! - No panics (corrupt containers, truncated rasters, huge dimensions)
//! - A decoded frame is non-empty and holds width × height × 3 bytes
//! - Resizing always yields the model input geometry
//!
//! cargo fuzz run fuzz_image_decoder

#![no_main]

use edgetrigger::adapters::engine::{InputShape, decode_image, resize_to};
use libfuzzer_sys::fuzz_target;

const SHAPE: InputShape = InputShape {
    width: 8,
    height: 8,
    channels: 3,
};

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = decode_image(data, SHAPE) else {
        return;
    };
    let (w, h) = frame.dimensions();
    assert!(w > 0 && h > 0);
    assert_eq!(frame.as_raw().len(), w as usize * h as usize * 3);

    let out = resize_to(&frame, SHAPE).expect("8x8 fits u32");
    assert_eq!(out.into_raw().len(), SHAPE.len());
});
