#![no_main]

use libfuzzer_sys::fuzz_target;
use ucdbg::event::{deserialize, serialize, EVENT_SIZE};
use ucdbg::reader::EventReader;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must never panic
    if let Ok(event) = deserialize(data) {
        // Anything that decodes re-encodes to the same header and payload
        let bytes = serialize(&event);
        assert_eq!(&bytes[..18], &data[..18]);
        assert_eq!(bytes[20], data[20]);
    }

    let mut reader = EventReader::new(data);
    let _ = reader.read_all();
    let stats = reader.stats();
    assert_eq!(stats.trailing_bytes, data.len() % EVENT_SIZE);
});
