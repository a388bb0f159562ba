//! Fuzz target for Frame::decode
//!
//! Arbitrary bytes must never panic the decoder. Anything that decodes must
//! re-encode to the same bytes it was read from.

#![no_main]

use libfuzzer_sys::fuzz_target;
use roomline_proto::Frame;

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = Frame::decode(data) else {
        return;
    };

    let mut encoded = Vec::with_capacity(frame.encoded_len());
    if frame.encode(&mut encoded).is_ok() {
        assert_eq!(&encoded[..], &data[..encoded.len()]);
    }
});
