//! String hashing used for cache keys.
//!
//! Mirrors the murmurhash2 variant the JavaScript tooling uses so cache keys
//! stay stable across the Babel and SWC implementations. Output is base36.

pub fn hash(input: &str, seed: u32) -> String {
  let units: Vec<u16> = input.encode_utf16().collect();
  to_base36(murmur2(&units, seed))
}

fn murmur2(units: &[u16], seed: u32) -> u32 {
  let mut remaining = units.len();
  let mut h = seed ^ (remaining as u32);
  let mut index = 0usize;

  while remaining >= 4 {
    let mut k = (units[index] as u32 & 0xff)
      | (((units[index + 1] as u32) & 0xff) << 8)
      | (((units[index + 2] as u32) & 0xff) << 16)
      | (((units[index + 3] as u32) & 0xff) << 24);

    k = scramble(k);
    h = multiply(h) ^ k;

    index += 4;
    remaining -= 4;
  }

  if remaining >= 3 {
    h ^= ((units[index + 2] as u32) & 0xff) << 16;
  }
  if remaining >= 2 {
    h ^= ((units[index + 1] as u32) & 0xff) << 8;
  }
  if remaining >= 1 {
    h ^= (units[index] as u32) & 0xff;
    h = multiply(h);
  }

  h ^= h >> 13;
  h = multiply(h);
  h ^ (h >> 15)
}

#[inline]
fn scramble(value: u32) -> u32 {
  let mut v = multiply(value);
  v ^= v >> 24;
  multiply(v)
}

// 16-bit split multiplication by the murmur2 constant, matching the
// overflow behaviour of the JavaScript implementation.
#[inline]
fn multiply(value: u32) -> u32 {
  let low = (value & 0xffff).wrapping_mul(0x5bd1e995);
  let high = ((value >> 16) & 0xffff).wrapping_mul(0x5bd1e995);
  low.wrapping_add(high << 16)
}

fn to_base36(mut value: u32) -> String {
  const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

  if value == 0 {
    return "0".to_string();
  }

  let mut buf = [0u8; 8];
  let mut idx = buf.len();
  while value > 0 {
    idx -= 1;
    buf[idx] = DIGITS[(value % 36) as usize];
    value /= 36;
  }

  String::from_utf8(buf[idx..].to_vec()).expect("base36 digits are ASCII")
}
