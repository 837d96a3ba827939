//! Fuzz target for Frame::decode
//!
//! This fuzzer tests STOMP frame decoding with arbitrary byte sequences to
//! find:
//! - Parser crashes or panics
//! - Out-of-range slicing around EOLs, NULs and `content-length`
//! - Header escapes that decode to something the encoder cannot reproduce
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.
//! Every frame that decodes and re-encodes must decode to itself.

#![no_main]

use chatty_proto::Frame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(Some(frame)) = Frame::decode(data) else {
        return;
    };

    if let Ok(encoded) = frame.encode() {
        let again = Frame::decode(encoded.as_bytes());
        assert_eq!(again, Ok(Some(frame)), "re-encoded frame must decode to itself");
    }
});
