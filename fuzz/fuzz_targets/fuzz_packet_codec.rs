//! Fuzz target for inference packet decoding.
//!
//! Arbitrary bytes must never panic the decoder, and any frame it accepts
//! must survive a re-encode unchanged.

#![no_main]

use libfuzzer_sys::fuzz_target;
use smartnic_agent::agent::codec::{self, Frame};

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = codec::decode(data) else {
        return;
    };
    let mut out = Vec::new();
    let encoded = match frame {
        Frame::Request { correlation_id, max_tokens, text } => {
            codec::encode_request(&mut out, correlation_id, max_tokens, text, usize::MAX)
        }
        Frame::Response { correlation_id, status, text } => {
            codec::encode_response(&mut out, correlation_id, status, text, usize::MAX)
        }
    };
    if encoded.is_ok() {
        assert_eq!(codec::decode(&out), Ok(frame));
    }
});
