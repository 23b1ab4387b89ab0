//! Fuzz target for stream frame decoding
//!
//! Feeds arbitrary bytes to the frame reader. It must only ever return
//! frames within the size limit, a clean end, or an error.

#![no_main]

use futures::executor::block_on;
use futures::io::Cursor;
use libfuzzer_sys::fuzz_target;
use shellchat_core::wire::{MAX_FRAME_LEN, encode_frame, read_frame};

fuzz_target!(|data: &[u8]| {
    let mut reader = Cursor::new(data);
    while let Ok(Some(frame)) = block_on(read_frame(&mut reader)) {
        assert!(frame.len() <= MAX_FRAME_LEN);

        // A decoded frame re-encodes to the bytes it came from
        let encoded = encode_frame(&frame).unwrap();
        assert_eq!(encoded.len(), frame.len() + 4);
    }
});
