#![no_main]
use libfuzzer_sys::fuzz_target;
use parity_log::{CaptureRecord, ObjectStream};
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must never panic the reader or the record extraction
    let stream = ObjectStream::new(Cursor::new(data));
    for object in stream.flatten().take(1000) {
        if let Ok(record) = CaptureRecord::from_object(object) {
            let _ = record.into_descriptor();
        }
    }
});
