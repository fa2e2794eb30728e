// Licensed under the Apache-2.0 license

use zerocopy::FromBytes;

use crate::error::RecordFault;

/// Payload length constraint attached to a record tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LengthRule {
    Any,
    Exact(usize),
    Range(usize, usize),
}

impl LengthRule {
    pub(crate) fn check(self, tag: u32, actual: usize) -> Result<(), RecordFault> {
        match self {
            LengthRule::Any => Ok(()),
            LengthRule::Exact(expected) if actual != expected => {
                Err(RecordFault::LengthMismatch {
                    tag,
                    expected,
                    actual,
                })
            }
            LengthRule::Range(min, max) if actual < min || actual > max => {
                Err(RecordFault::LengthOutOfRange {
                    tag,
                    min,
                    max,
                    actual,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Returns `len` bytes starting at `offset`, or `None` if they run past the buffer.
pub(crate) fn slice_at(buffer: &[u8], offset: usize, len: usize) -> Option<&[u8]> {
    buffer.get(offset..offset.checked_add(len)?)
}

/// Reads a fixed-layout prefix of a record payload, handing back the rest.
pub(crate) fn read_fixed<T: FromBytes>(tag: u32, payload: &[u8]) -> Result<(T, &[u8]), RecordFault> {
    T::read_from_prefix(payload).map_err(|_| RecordFault::LengthTooSmall {
        tag,
        min: core::mem::size_of::<T>(),
        actual: payload.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::byteorder::{BigEndian, U32};
    use zerocopy::{Immutable, KnownLayout};

    #[repr(C)]
    #[derive(Debug, FromBytes, Immutable, KnownLayout)]
    struct Word {
        value: U32<BigEndian>,
    }

    #[test]
    fn test_length_rules() {
        assert!(LengthRule::Any.check(1, 0).is_ok());
        assert!(LengthRule::Exact(4).check(1, 4).is_ok());
        assert_eq!(
            LengthRule::Exact(4).check(0xfc04, 5),
            Err(RecordFault::LengthMismatch {
                tag: 0xfc04,
                expected: 4,
                actual: 5
            })
        );
        assert!(LengthRule::Range(1, 65534).check(1, 65534).is_ok());
        assert_eq!(
            LengthRule::Range(1, 65534).check(0xf608, 65535),
            Err(RecordFault::LengthOutOfRange {
                tag: 0xf608,
                min: 1,
                max: 65534,
                actual: 65535
            })
        );
    }

    #[test]
    fn test_slice_at_bounds() {
        let data = [0u8, 1, 2, 3];
        assert_eq!(slice_at(&data, 1, 3), Some(&data[1..4]));
        assert_eq!(slice_at(&data, 1, 4), None);
        assert_eq!(slice_at(&data, usize::MAX, 2), None);
    }

    #[test]
    fn test_read_fixed() {
        let (word, rest) = read_fixed::<Word>(7, &[0x12, 0x34, 0x56, 0x78, 0xaa]).unwrap();
        assert_eq!(word.value.get(), 0x1234_5678);
        assert_eq!(rest, &[0xaa]);

        assert_eq!(
            read_fixed::<Word>(7, &[0x12, 0x34]).unwrap_err(),
            RecordFault::LengthTooSmall {
                tag: 7,
                min: 4,
                actual: 2
            }
        );
    }
}
