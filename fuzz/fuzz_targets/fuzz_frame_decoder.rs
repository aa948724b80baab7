//! Fuzz target: `codec::decode`
//!
//! Decodes arbitrary bytes as one housekeeping frame and checks that a
//! frame which does decode survives a re-encode unchanged.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use surfhskd::hsk::codec::{decode, encode};
use surfhskd::hsk::packet::MAX_DATA;

fuzz_target!(|data: &[u8]| {
    let Ok(pkt) = decode(data) else {
        return;
    };
    assert!(pkt.data.len() <= MAX_DATA);
    assert_eq!(decode(&encode(&pkt)), Ok(pkt));
});
