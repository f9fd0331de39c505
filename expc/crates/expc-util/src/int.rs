//! Range predicates for the sized integer types of the source language.
//!
//! Codegen and constant evaluation must check that a 64-bit working value
//! actually fits the type it is about to be stamped with. Every predicate
//! takes the widest signed representation.

pub fn fits_i8(value: i64) -> bool {
    i8::try_from(value).is_ok()
}

pub fn fits_i16(value: i64) -> bool {
    i16::try_from(value).is_ok()
}

pub fn fits_i32(value: i64) -> bool {
    i32::try_from(value).is_ok()
}

pub fn fits_i64(_value: i64) -> bool {
    true
}

pub fn fits_u8(value: i64) -> bool {
    u8::try_from(value).is_ok()
}

pub fn fits_u16(value: i64) -> bool {
    u16::try_from(value).is_ok()
}

pub fn fits_u32(value: i64) -> bool {
    u32::try_from(value).is_ok()
}

pub fn fits_u64(value: i64) -> bool {
    value >= 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_boundaries() {
        assert!(fits_i8(127) && !fits_i8(128));
        assert!(fits_i8(-128) && !fits_i8(-129));
        assert!(fits_i16(32767) && !fits_i16(32768));
        assert!(fits_i32(2147483647) && !fits_i32(2147483648));
        assert!(fits_u8(255) && !fits_u8(256));
        assert!(!fits_u8(-1) && !fits_u64(-1));
        assert!(fits_u32(4294967295) && !fits_u32(4294967296));
    }

    #[quickcheck]
    fn prop_in_range_values_fit(value: i64) -> bool {
        let i8_ok = !(i8::MIN as i64..=i8::MAX as i64).contains(&value) || fits_i8(value);
        let i16_ok = !(i16::MIN as i64..=i16::MAX as i64).contains(&value) || fits_i16(value);
        let i32_ok = !(i32::MIN as i64..=i32::MAX as i64).contains(&value) || fits_i32(value);
        let u8_ok = !(0..=u8::MAX as i64).contains(&value) || fits_u8(value);
        let u16_ok = !(0..=u16::MAX as i64).contains(&value) || fits_u16(value);
        let u32_ok = !(0..=u32::MAX as i64).contains(&value) || fits_u32(value);
        let u64_ok = value < 0 || fits_u64(value);
        i8_ok && i16_ok && i32_ok && u8_ok && u16_ok && u32_ok && u64_ok && fits_i64(value)
    }
}
