#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use skiff_core::buffer::ReadBuffer;
use skiff_nats::codec::{Decoder, Operation};
use skiff_nats::{ClientOp, ServerOp};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // First byte picks where the input is split, to exercise frames that
    // straddle reads.
    let split = 1 + usize::from(data[0]) % data.len();
    let (head, tail) = data[1..].split_at((split - 1).min(data.len() - 1));

    drain::<ServerOp>(head, tail);
    drain::<ClientOp>(head, tail);
});

fn drain<Op: Operation>(head: &[u8], tail: &[u8]) {
    let mut decoder = Decoder::<Op>::new(4096);
    let mut buf = ReadBuffer::new();

    for chunk in [head, tail] {
        buf.push(Bytes::copy_from_slice(chunk));
        loop {
            match decoder.decode(&mut buf) {
                Ok(Some(op)) => {
                    // Whatever decodes must encode without panicking.
                    let mut out = Vec::new();
                    op.encode(&mut out);
                }
                Ok(None) => break,
                Err(_) => return,
            }
        }
    }
}
