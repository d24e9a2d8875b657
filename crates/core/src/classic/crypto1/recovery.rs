//! Cipher state recovery from 32 bits of keystream
//!
//! The odd and even halves each drive every other keystream bit through
//! the filter, so both halves are grown separately from the bits they
//! explain and then joined where their feedback contributions agree.

use super::{Crypto1, LF_POLY_EVEN, LF_POLY_ODD, bebit, filter, parity, prng_successor};
use crate::keys::ClassicKey;

/// The PRNG repeats after this many steps
const PRNG_PERIOD: u32 = 1 << 16;

/// Every state that produces keystream `ks2` while `input` is fed in
///
/// The states are the ones reached after the 32 bits were clocked.
pub fn lfsr_recovery32(ks2: u32, input: u32) -> Vec<Crypto1> {
    let mut oks = 0;
    let mut eks = 0;
    for i in (1..32).step_by(2).rev() {
        oks = (oks << 1) | bebit(ks2, i);
    }
    for i in (0..31).step_by(2).rev() {
        eks = (eks << 1) | bebit(ks2, i);
    }

    let mut odd = Vec::with_capacity(1 << 20);
    let mut even = Vec::with_capacity(1 << 20);
    for v in (0..=1u32 << 20).rev() {
        let f = filter(v);
        if f == oks & 1 {
            odd.push(v);
        }
        if f == eks & 1 {
            even.push(v);
        }
    }

    for _ in 0..4 {
        oks >>= 1;
        odd = extend_table_simple(&odd, oks & 1);
        eks >>= 1;
        even = extend_table_simple(&even, eks & 1);
    }

    let input = ((input >> 16) & 0xff) | (input << 16) | (input & 0xff00);
    let mut states = Vec::new();
    recover(odd, oks, even, eks, 11, input << 1, &mut states);
    states
}

/// Keys that could have encrypted nonce `nt` into keystream `ks`
pub fn recover_keys(uid: u32, nt: u32, ks: u32) -> Vec<ClassicKey> {
    lfsr_recovery32(ks, uid ^ nt)
        .into_iter()
        .map(|mut state| {
            state.rollback_word(uid ^ nt, false);
            state.key()
        })
        .collect()
}

/// PRNG steps from nonce `from` to nonce `to`
pub const fn nonce_distance(from: u32, to: u32) -> Option<u32> {
    let mut nonce = from;
    let mut steps = 0;
    while steps < PRNG_PERIOD {
        if nonce == to {
            return Some(steps);
        }
        nonce = prng_successor(nonce, 1);
        steps += 1;
    }
    None
}

fn extend_table_simple(table: &[u32], bit: u32) -> Vec<u32> {
    let mut extended = Vec::with_capacity(table.len());
    for &v in table {
        let v = v << 1;
        let (f0, f1) = (filter(v), filter(v | 1));
        if f0 != f1 {
            extended.push(v | (f0 ^ bit));
        } else if f0 == bit {
            extended.push(v);
            extended.push(v | 1);
        }
    }
    extended
}

// The top byte of each entry carries its feedback contribution
fn extend_table(table: &[u32], bit: u32, m1: u32, m2: u32, input: u32) -> Vec<u32> {
    let input = input << 24;
    let mut extended = Vec::with_capacity(table.len());
    for &v in table {
        let v = v << 1;
        let (f0, f1) = (filter(v), filter(v | 1));
        if f0 != f1 {
            extended.push(contribution(v | (f0 ^ bit), m1, m2) ^ input);
        } else if f0 == bit {
            extended.push(contribution(v, m1, m2) ^ input);
            extended.push(contribution(v | 1, m1, m2) ^ input);
        }
    }
    extended
}

const fn contribution(item: u32, m1: u32, m2: u32) -> u32 {
    let mut p = item >> 25;
    p = (p << 1) | parity(item & m1);
    p = (p << 1) | parity(item & m2);
    (p << 24) | (item & 0xFF_FFFF)
}

fn recover(
    mut odd: Vec<u32>,
    mut oks: u32,
    mut even: Vec<u32>,
    mut eks: u32,
    mut rem: i32,
    mut input: u32,
    states: &mut Vec<Crypto1>,
) {
    if odd.is_empty() || even.is_empty() {
        return;
    }

    if rem == -1 {
        for e in even {
            let e = (e << 1) ^ parity(e & LF_POLY_EVEN) ^ u32::from(input & 4 != 0);
            for &o in &odd {
                states.push(Crypto1::from_halves(e ^ parity(o & LF_POLY_ODD), o));
            }
        }
        return;
    }

    for _ in 0..4 {
        if rem == 0 {
            rem = -1;
            break;
        }
        rem -= 1;

        oks >>= 1;
        eks >>= 1;
        input >>= 2;
        odd = extend_table(&odd, oks & 1, (LF_POLY_EVEN << 1) | 1, LF_POLY_ODD << 1, 0);
        if odd.is_empty() {
            return;
        }
        even = extend_table(&even, eks & 1, LF_POLY_ODD, (LF_POLY_EVEN << 1) | 1, input & 3);
        if even.is_empty() {
            return;
        }
    }

    // Only entries with the same contribution byte can pair up
    odd.sort_unstable_by_key(|v| v >> 24);
    even.sort_unstable_by_key(|v| v >> 24);
    let mut even_buckets = even.chunk_by(|a, b| a >> 24 == b >> 24).peekable();
    for odd_bucket in odd.chunk_by(|a, b| a >> 24 == b >> 24) {
        let contribution = odd_bucket[0] >> 24;
        while even_buckets.next_if(|bucket| bucket[0] >> 24 < contribution).is_some() {}
        if let Some(even_bucket) = even_buckets.next_if(|bucket| bucket[0] >> 24 == contribution) {
            recover(odd_bucket.to_vec(), oks, even_bucket.to_vec(), eks, rem, input, states);
        }
    }
}
