//! LSB-first bit vector helpers.

pub(crate) fn get(buf: &[u8], bit: usize) -> bool {
    (buf[bit / 8] >> (bit % 8)) & 1 != 0
}

/// Index of the first set bit in `from..to`.
pub(crate) fn next_set(buf: &[u8], from: usize, to: usize) -> Option<usize> {
    let mut bit = from;
    while bit < to {
        if bit % 8 == 0 && bit + 8 <= to && buf[bit / 8] == 0 {
            bit += 8;
            continue;
        }
        if get(buf, bit) {
            return Some(bit);
        }
        bit += 1;
    }
    None
}

/// Reads up to 8 bits starting at `start` into the low bits of a byte.
pub(crate) fn gather(buf: &[u8], start: usize, count: usize) -> u8 {
    debug_assert!(count <= 8);
    if start % 8 == 0 && count == 8 {
        return buf[start / 8];
    }
    (0..count).fold(0, |byte, k| byte | (u8::from(get(buf, start + k)) << k))
}

/// Appends `count` whole bytes read from the bit cursor `start`.
pub(crate) fn extend_bytes(dst: &mut Vec<u8>, buf: &[u8], start: usize, count: usize) {
    let first = start / 8;
    let shift = start % 8;
    if shift == 0 {
        dst.extend_from_slice(&buf[first..first + count]);
    } else {
        dst.extend(
            buf[first..first + count + 1]
                .windows(2)
                .map(|pair| (pair[0] >> shift) | (pair[1] << (8 - shift))),
        );
    }
}

/// ORs the low `count` bits of `value` into `buf` starting at bit `start`.
pub(crate) fn put(buf: &mut [u8], start: usize, value: u8, count: usize) {
    debug_assert!(count <= 8);
    if start % 8 == 0 && count == 8 {
        buf[start / 8] |= value;
        return;
    }
    for k in 0..count {
        if (value >> k) & 1 != 0 {
            let bit = start + k;
            buf[bit / 8] |= 1 << (bit % 8);
        }
    }
}
