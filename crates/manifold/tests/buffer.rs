//! Property tests for the byte-buffer/pool substrate.

use std::sync::Arc;

use manifold::{BufferPool, ByteBuf, PoolOptions};
use quickcheck_macros::quickcheck;

#[quickcheck]
fn utf8_roundtrip(text: String) -> bool {
    let mut buf = ByteBuf::new();
    buf.push_str(&text);
    buf.to_str() == text && buf.as_bytes() == text.as_bytes()
}

#[quickcheck]
fn char_append_matches_str_append(text: String) -> bool {
    let mut by_str = ByteBuf::new();
    by_str.push_str(&text);
    let mut by_char = ByteBuf::new();
    for ch in text.chars() {
        by_char.push_char(ch);
    }
    by_str == by_char
}

#[quickcheck]
fn utf16_reencode_matches_std(text: String) -> bool {
    let units: Vec<u16> = text.encode_utf16().collect();
    let mut buf = ByteBuf::new();
    buf.push_utf16(&units);
    buf.as_bytes() == text.as_bytes()
}

#[quickcheck]
fn equal_content_implies_equal_hash(data: Vec<u8>, pad: u8) -> bool {
    let a = ByteBuf::from(&data[..]);
    // Build b along a different growth path so capacities differ.
    let mut b = ByteBuf::with_capacity(data.len() + usize::from(pad) + 1);
    b.extend_from_slice(&data);
    a == b && a.hash_code() == b.hash_code()
}

#[quickcheck]
fn hash_cache_survives_mutation_cycles(data: Vec<u8>) -> bool {
    let mut buf = ByteBuf::from(&data[..]);
    let before = buf.hash_code();
    buf.push(7);
    buf.truncate(data.len());
    // The cache was invalidated twice; same content, same hash.
    buf.hash_code() == before
}

#[quickcheck]
fn ordering_matches_slice_ordering(a: Vec<u8>, b: Vec<u8>) -> bool {
    let x = ByteBuf::from(&a[..]);
    let y = ByteBuf::from(&b[..]);
    x.cmp(&y) == a.as_slice().cmp(b.as_slice())
}

#[quickcheck]
fn slices_are_faithful_copies(data: Vec<u8>) -> bool {
    let buf = ByteBuf::from(&data[..]);
    let mid = data.len() / 2;
    buf.slice(0..mid).as_bytes() == &data[..mid]
        && buf.slice(mid..data.len()).as_bytes() == &data[mid..]
}

#[quickcheck]
fn pool_acquire_meets_minimum_and_preserves_prefix(live: Vec<u8>, extra: u16) -> bool {
    let pool = BufferPool::new(PoolOptions::default());
    let mut array = pool.take(live.len().max(1)).unwrap();
    array[..live.len()].copy_from_slice(&live);
    let min = live.len() + usize::from(extra);
    pool.acquire(&mut array, live.len(), min).unwrap();
    array.len() >= min && &array[..live.len()] == live.as_slice()
}

#[quickcheck]
fn pooled_reset_keeps_capacity_usable(chunks: Vec<Vec<u8>>) -> bool {
    let pool = Arc::new(BufferPool::new(PoolOptions::default()));
    let mut buf = ByteBuf::pooled(pool);
    for chunk in &chunks {
        buf.extend_from_slice(chunk);
        let had = buf.capacity();
        buf.clear();
        if buf.len() != 0 {
            return false;
        }
        // A small scratch keeps its array outright; a large one may be
        // exchanged, but appending must still work without issue.
        if had <= 1024 && buf.capacity() < had {
            return false;
        }
        buf.push(b'x');
        if buf.as_bytes() != b"x" {
            return false;
        }
        buf.clear();
    }
    true
}

#[test]
fn pool_is_shared_safely_across_threads() {
    let pool = Arc::new(BufferPool::new(PoolOptions::default()));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                let mut buf = ByteBuf::pooled(pool);
                for i in 0..500usize {
                    let byte = (t * 31 + i) as u8;
                    for _ in 0..(i % 97) {
                        buf.push(byte);
                    }
                    if !buf.as_bytes().iter().all(|&b| b == byte) {
                        panic!("scratch content corrupted");
                    }
                    buf.clear();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}
