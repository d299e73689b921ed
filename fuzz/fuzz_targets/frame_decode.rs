//! Fuzz target for `Frame::decode` and `WireMessage::from_frame`
//!
//! Arbitrary bytes must never panic the reader. Anything that does decode
//! must survive a re-encode unchanged.

#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use tokentree_proto::{Frame, WireMessage};

fuzz_target!(|data: &[u8]| {
    let Ok((frame, consumed)) = Frame::decode(data) else {
        return;
    };
    assert!(consumed <= data.len());

    let Ok(message) = WireMessage::from_frame(&frame) else {
        return;
    };

    let reencoded = message.clone().into_frame().expect("decoded message must re-encode");
    let mut buf = BytesMut::new();
    reencoded.encode(&mut buf).expect("re-encoded frame within size limit");

    let (again, used) = Frame::decode(&buf).expect("own encoding decodes");
    assert_eq!(used, buf.len());
    assert_eq!(WireMessage::from_frame(&again).ok(), Some(message));
});
