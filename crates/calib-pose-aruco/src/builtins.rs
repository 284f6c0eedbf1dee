//! Built-in dictionaries compiled into the binary.
//!
//! OpenCV's `DICT_4X4_50`, `_100` and `_250` are prefixes of
//! `DICT_4X4_1000`, so all four share one code table.

#![allow(clippy::unreadable_literal)]

use crate::Dictionary;
use std::borrow::Cow;

/// OpenCV `DICT_4X4_1000` codes, bit `y * 4 + x` set for a white cell.
#[rustfmt::skip]
pub const DICT_4X4_1000_CODES: [u64; 1000] = [
    0x4cad, 0x59f0, 0xb4cc, 0x6299, 0x792a, 0xb39e, 0x7479, 0x4f23,
    0x5b7f, 0x6af3, 0x899f, 0xe588, 0xed70, 0xf054, 0x8d24, 0x7c64,
    0xa662, 0x0066, 0x7a36, 0xf56e, 0xd161, 0xd40d, 0xab33, 0x41bb,
    0xe27f, 0x8e29, 0x2735, 0x2aa5, 0xc484, 0xf62c, 0xa822, 0x4dea,
    0xf379, 0xd30f, 0x7510, 0x9490, 0xae18, 0xff20, 0x6fb0, 0x5a38,
    0x18e8, 0x1454, 0x314c, 0x4d1c, 0x1724, 0xd774, 0xfcb4, 0x26d2,
    0x740a, 0xc80a, 0x298a, 0x16aa, 0x82ba, 0xe9fa, 0x8016, 0xe616,
    0x2486, 0x9786, 0x48d6, 0xa7f6, 0xfbe6, 0xd87e, 0x0501, 0x22c1,
    0x45d1, 0x5ec9, 0x3621, 0x54a1, 0x39a1, 0x9139, 0x85f9, 0x3edd,
    0x203d, 0xda6d, 0x13fd, 0xd5ed, 0xf853, 0x4693, 0x1a9b, 0xabcb,
    0x1933, 0x05e3, 0xeca3, 0xba97, 0xa49f, 0xdddf, 0x5477, 0xb2ef,
    0xaeac, 0xb551, 0xe86e, 0xf350, 0xd260, 0x83b4, 0x1b92, 0x2fc2,
    0x6cf2, 0xcbf2, 0x2796, 0xe30e, 0x765e, 0x572d, 0xf2b7, 0xe73f,
    0x657f, 0xa400, 0xc200, 0x1150, 0x6150, 0xf640, 0x3800, 0xe900,
    0xec10, 0x8c50, 0x6390, 0x80d0, 0xdf90, 0x1ad0, 0x4108, 0xb418,
    0x1e08, 0xce08, 0x2e48, 0x8d48, 0x9f58, 0x60c8, 0x7030, 0x8f30,
    0xcc20, 0xf930, 0x4f70, 0xbf70, 0x32e0, 0x25f0, 0xf4e0, 0xada0,
    0x89f0, 0xdbe0, 0x2778, 0x9c28, 0x01b8, 0x13a8, 0xd1f8, 0x5da8,
    0x8db8, 0x0104, 0x9714, 0x4544, 0xca14, 0x0f54, 0xef44, 0x0294,
    0x6284, 0x9d94, 0x39d4, 0x4dd4, 0x531c, 0x741c, 0xe00c, 0xe71c,
    0x925c, 0xa65c, 0xba4c, 0x11dc, 0xb89c, 0xcbdc, 0xe264, 0x01e4,
    0x55f4, 0x28b4, 0x7ba4, 0xcaa4, 0xeef4, 0x122c, 0x153c, 0x823c,
    0xb02c, 0xdf2c, 0x596c, 0x07bc, 0x56ac, 0x90bc, 0xb7bc, 0x23fc,
    0x36fc, 0x73ec, 0x3abc, 0x6ebc, 0x0dec, 0xe8fc, 0xfffc, 0xa712,
    0x1642, 0xb452, 0x0682, 0x8a92, 0xbb82, 0xfbd2, 0xf21a, 0x125a,
    0x681a, 0xba0a, 0x5f5a, 0xad5a, 0xc48a, 0x51da, 0x989a, 0xac8a,
    0x9632, 0x8362, 0xd072, 0xfa22, 0x9a72, 0xc1b2, 0xbeb2, 0x1be2,
    0xcee2, 0xa13a, 0x227a, 0xd46a, 0xdd3a, 0xc3aa, 0x76fa, 0xd7fa,
    0x48ba, 0x7aaa, 0x0e46, 0xa846, 0x4386, 0x04d6, 0xa2c6, 0x3ad6,
    0xdad6, 0x301e, 0xf35e, 0xfe1e, 0x019e, 0xa78e, 0x2e8e, 0x6d9e,
    0xcb8e, 0xccde, 0x5626, 0x1566, 0xe576, 0x8976, 0x44a6, 0xd3b6,
    0xb1e6, 0x8cb6, 0x017e, 0x477e, 0xb17e, 0x4b2e, 0x4c3e, 0xac7e,
    0xd5ae, 0xa0ee, 0xd4fe, 0x5bbe, 0x49fe, 0xae01, 0xcf01, 0x6581,
    0xb791, 0x3f81, 0x6519, 0x0459, 0xc289, 0x9f99, 0xc989, 0x2bd9,
    0x9021, 0xd621, 0x2361, 0x2671, 0x5861, 0x72a1, 0xd3b1, 0xe6a1,
    0xf5a1, 0xeba1, 0xcde1, 0x8739, 0x4f39, 0xe829, 0x00a9, 0x45a9,
    0xc4b9, 0x46f9, 0x4ab9, 0x5ba9, 0xa305, 0xb355, 0x1b45, 0xea45,
    0xbc95, 0xea95, 0x4ad5, 0x6cc5, 0x9ac5, 0x2f0d, 0x481d, 0xfd0d,
    0xb94d, 0xb7dd, 0x4e9d, 0x699d, 0xc325, 0x4b35, 0x8d75, 0x41a5,
    0xa6f5, 0xdea5, 0x5ff5, 0x262d, 0x463d, 0x812d, 0x056d, 0x777d,
    0xb07d, 0x9b3d, 0x1f7d, 0x14ad, 0x90ed, 0x4bed, 0x5703, 0x9803,
    0xbf03, 0xcb13, 0x5a53, 0xb283, 0x2d93, 0xea83, 0x19c3, 0xb8c3,
    0x011b, 0xf71b, 0xd45b, 0x780b, 0xa08b, 0xb5cb, 0xe5db, 0x9323,
    0x1e33, 0xa2b3, 0xd0a3, 0xf3f3, 0x353b, 0x402b, 0xc63b, 0xe42b,
    0xaf2b, 0x1e6b, 0x1d7b, 0x67bb, 0xbaab, 0xbdbb, 0xb8fb, 0x5347,
    0xd657, 0x2d07, 0x1c47, 0x2b47, 0x44c7, 0x1b87, 0xc00f, 0x334f,
    0x6f1f, 0x928f, 0x57cf, 0x398f, 0xaf9f, 0xdc8f, 0xb137, 0x9377,
    0xf067, 0xef27, 0x06e7, 0x17f7, 0x4db7, 0xa8a7, 0x8bf7, 0x612f,
    0x803f, 0xc36f, 0x3e2f, 0xc93f, 0x42af, 0x19bf, 0xbcaf, 0xbd40,
    0x8700, 0x4740, 0x7540, 0x1e10, 0x2e00, 0x7910, 0x8b10, 0xbe10,
    0x4c50, 0x7b50, 0x8a40, 0x4580, 0x01c0, 0xc1d0, 0xd2d0, 0xe4d0,
    0xf7d0, 0x6d90, 0x9a90, 0xc990, 0x1fd0, 0x9bc0, 0x8fc0, 0x2308,
    0xd518, 0x0558, 0x2058, 0x3658, 0x7558, 0x9148, 0xe808, 0xcf58,
    0x0298, 0x4088, 0xd488, 0xf388, 0x44d8, 0x74c8, 0xa888, 0xddc8,
    0x0430, 0x9330, 0x3b30, 0x6c30, 0x2860, 0x4e60, 0x86b0, 0xb0a0,
    0xf1b0, 0x07f0, 0x92f0, 0xa1e0, 0x09a0, 0xccb0, 0x69f0, 0x6ef0,
    0x0628, 0xb138, 0x5b28, 0xce38, 0x2978, 0x5d78, 0x9b68, 0xbc78,
    0xdf68, 0x97b8, 0x7fb8, 0xf9f8, 0xd114, 0xf504, 0x7044, 0x9544,
    0xb154, 0xc554, 0xf754, 0x0914, 0xdc14, 0x1a54, 0xcc44, 0x0584,
    0x4084, 0xa584, 0xe384, 0xc0d4, 0xe6c4, 0x0c94, 0x4b94, 0x98d4,
    0xd9d4, 0xe9d4, 0x141c, 0xa51c, 0x615c, 0x804c, 0xf91c, 0x4b4c,
    0x995c, 0xab5c, 0x179c, 0x83dc, 0xc2cc, 0xe7dc, 0x598c, 0x09cc,
    0x79dc, 0x2324, 0x5234, 0xb534, 0xf334, 0xe634, 0x5764, 0xa774,
    0x0e34, 0x4874, 0x8b74, 0x9c74, 0x26a4, 0xe7a4, 0x33f4, 0x3db4,
    0x8eb4, 0xaba4, 0xd9a4, 0x08e4, 0x3ef4, 0x4fe4, 0x5ce4, 0x6df4,
    0xcbe4, 0xcdf4, 0xf8e4, 0xd23c, 0x036c, 0x776c, 0x977c, 0x1d2c,
    0x283c, 0x4a3c, 0x4e2c, 0x7e2c, 0xfd2c, 0x8e7c, 0xca7c, 0x31bc,
    0x45ac, 0x74ac, 0xb4ac, 0x35ec, 0x0eac, 0x5fec, 0x8ffc, 0xdbfc,
    0x2312, 0x9712, 0x4352, 0x8252, 0xd742, 0xc812, 0x1b52, 0xbf42,
    0xe852, 0xc692, 0x76c2, 0x5c82, 0x8d92, 0xbc82, 0x49d2, 0xd9d2,
    0xfcc2, 0x441a, 0x550a, 0xe41a, 0x134a, 0x214a, 0x504a, 0xf05a,
    0x191a, 0x3a1a, 0xdb0a, 0xef0a, 0x2f5a, 0x378a, 0x428a, 0xb08a,
    0xc0da, 0xd7ca, 0x6e8a, 0x8e9a, 0xc98a, 0x9fca, 0xcdda, 0xe9ca,
    0x3232, 0xd222, 0xc432, 0x3162, 0xe472, 0x0962, 0x2b72, 0x73a2,
    0xa7a2, 0xe4a2, 0x83f2, 0xa0e2, 0x2ca2, 0x4ea2, 0x133a, 0x703a,
    0xd72a, 0x916a, 0xc26a, 0xe77a, 0x0e3a, 0x4d2a, 0x9e7a, 0xcf6a,
    0xc5ba, 0x4fba, 0xb8aa, 0xb9ba, 0x3fea, 0x4bea, 0xcefa, 0xb416,
    0xc316, 0xe116, 0x5256, 0x9646, 0x9d06, 0xff16, 0x3b56, 0x5b56,
    0x7c56, 0x8a56, 0x8c56, 0xeb46, 0x3386, 0x41d6, 0xc7d6, 0x5c96,
    0x7986, 0xa986, 0xae86, 0xfa96, 0xec96, 0x5bc6, 0x400e, 0xc61e,
    0xf20e, 0x534e, 0xb55e, 0xde0e, 0x285e, 0x9f5e, 0xcb5e, 0xdd5e,
    0x479e, 0x948e, 0xe6de, 0x0b8e, 0x9c9e, 0x0cce, 0x9dce, 0xcace,
    0xffce, 0x1136, 0x9026, 0xc236, 0x6066, 0xc166, 0x0d26, 0x5b26,
    0xf976, 0x13e6, 0x77f6, 0xdcb6, 0x4bf6, 0x012e, 0xd53e, 0x167e,
    0x407e, 0x393e, 0x6c2e, 0x883e, 0x7b7e, 0x6d7e, 0xdb6e, 0x23be,
    0x51be, 0xb6ae, 0x11ee, 0x04ee, 0x82ee, 0x1cae, 0x7dae, 0xd9be,
    0xeaee, 0x1411, 0x3501, 0xb011, 0xe611, 0x7241, 0x8551, 0xd441,
    0x1801, 0x9f11, 0xb901, 0x3951, 0x8c41, 0xae51, 0xe941, 0x9081,
    0xd781, 0xe081, 0x14d1, 0x35d1, 0x74c1, 0xa7c1, 0x0a81, 0x4c91,
    0x5ed1, 0x69d1, 0xbec1, 0xe109, 0x3f59, 0xaf49, 0x5589, 0x82c9,
    0xa4c9, 0xd7d9, 0x2c99, 0xef89, 0x5bd9, 0x6ac9, 0x4221, 0x8131,
    0xf231, 0x1261, 0x6561, 0xc071, 0xc761, 0xf661, 0xf571, 0x7a21,
    0xee21, 0x5f61, 0x7871, 0xec71, 0x50e1, 0x51f1, 0x64f1, 0x84e1,
    0xb0e1, 0x4ea1, 0x7ce1, 0xc239, 0x8679, 0x1a29, 0x1f29, 0x4c39,
    0x6e29, 0x8d29, 0xbb29, 0xd929, 0xdb39, 0x3979, 0x4b79, 0x9869,
    0x8d79, 0x96a9, 0xb6f9, 0xd4e9, 0x6da9, 0x9da9, 0xbcb9, 0xeab9,
    0x3715, 0xa415, 0x3545, 0x4045, 0x6655, 0xf155, 0xe755, 0x0c15,
    0x5e15, 0x6f15, 0xc915, 0x2845, 0x2c55, 0x4e45, 0x4f55, 0x8f45,
    0x0285, 0x5095, 0x6485, 0xa395, 0xf395, 0x2c85, 0x4895, 0x5f85,
    0x19d5, 0xefc5, 0x600d, 0xa20d, 0xb11d, 0x214d, 0x0f1d, 0xaa1d,
    0x6e4d, 0x895d, 0x8e4d, 0x039d, 0x429d, 0x549d, 0x31cd, 0x53cd,
    0x66dd, 0xf0cd, 0x5b8d, 0x28dd, 0x6fdd, 0xc8cd, 0x1625, 0x3435,
    0x8535, 0xd735, 0xe335, 0xe625, 0x0365, 0x0775, 0xc465, 0x17b5,
    0x33a5, 0x37e5, 0x3eb5, 0x58a5, 0x89a5, 0x98b5, 0xe9a5, 0xb62d,
    0xd37d, 0x5c3d, 0xaf3d, 0xbd7d, 0xcf7d, 0xa4ad, 0xf1ad, 0x16ed,
    0x27fd, 0x7fbd, 0xb9bd, 0xafad, 0xcfad, 0x0dfd, 0x5aed, 0x7cfd,
    0x9ced, 0xabfd, 0xb8ed, 0xacfd, 0xfeed, 0x8013, 0xa503, 0x4143,
    0xbd13, 0x3f43, 0x8953, 0xda43, 0x2293, 0x5483, 0x03c3, 0x5e93,
    0x9d83, 0xae93, 0xef83, 0x8dd3, 0x360b, 0xe11b, 0xf50b, 0x235b,
    0x304b, 0x905b, 0x0c0b, 0x291b, 0x5c0b, 0x6d0b, 0xae0b, 0x6e4b,
    0xba5b, 0xac5b, 0xe84b, 0x409b, 0x17cb, 0xa7cb, 0x598b, 0x6f8b,
    0x8a8b, 0x28db, 0x7ccb, 0xcbcb, 0x0623, 0xe533, 0x4263, 0xe263,
    0xe773, 0x3a23, 0xb833, 0xac33, 0x3d63, 0x15b3, 0x30a3, 0x27a3,
    0x43a3, 0xb4b3, 0x9ab3, 0xa9b3, 0xc9a3, 0xfae3, 0xa32b, 0x117b,
    0x246b, 0x377b, 0x476b, 0x637b, 0xc47b, 0x3b3b, 0x583b, 0x882b,
    0x2a7b, 0x296b, 0xb97b, 0x81bb, 0xa5ab, 0x35eb, 0x66eb, 0x95fb,
    0x3bab, 0xf8bb, 0x0ffb, 0x1247, 0x1747, 0xe047, 0xba07, 0xaf57,
    0x64d7, 0xb7d7, 0x4a87, 0x7e87, 0xdb97, 0x601f, 0x770f, 0x851f,
    0x005f, 0x435f, 0xd90f, 0x2f5f, 0x3c5f, 0x3f4f, 0xbd4f, 0xc94f,
    0x068f, 0x379f, 0x628f, 0x879f, 0x12cf, 0x75cf, 0x83cf, 0xd1cf,
    0xe5cf, 0xce8f, 0xe98f, 0x2fcf, 0x4cdf, 0xe027, 0xb267, 0xaa37,
    0x03b7, 0xa1b7, 0x45f7, 0x72e7, 0xaba7, 0x0af7, 0x442f, 0x912f,
    0x942f, 0x566f, 0xd07f, 0xf67f, 0xa92f, 0xac2f, 0xf82f, 0x0d6f,
    0x17af, 0xa3af, 0xc4bf, 0x03ff, 0x33ef, 0x97ef, 0x3daf, 0x6fbf,
    0x9baf, 0xe9bf, 0xfcbf, 0x39ff, 0x5aff, 0x7fef, 0x88ff, 0xfdef,
];

const CODES_4X4: &[u64] = &DICT_4X4_1000_CODES;

const fn dict_4x4(name: &'static str, len: usize, max_correction_bits: u8) -> Dictionary {
    Dictionary {
        name: Cow::Borrowed(name),
        marker_size: 4,
        max_correction_bits,
        codes: Cow::Borrowed(CODES_4X4.split_at(len).0),
    }
}

pub const DICT_4X4_50: Dictionary = dict_4x4("DICT_4X4_50", 50, 1);
pub const DICT_4X4_100: Dictionary = dict_4x4("DICT_4X4_100", 100, 1);
pub const DICT_4X4_250: Dictionary = dict_4x4("DICT_4X4_250", 250, 1);
pub const DICT_4X4_1000: Dictionary = dict_4x4("DICT_4X4_1000", 1000, 0);

/// Names accepted by [`builtin_dictionary`].
pub const BUILTIN_DICTIONARY_NAMES: &[&str] =
    &["DICT_4X4_50", "DICT_4X4_100", "DICT_4X4_250", "DICT_4X4_1000"];

/// Look up a built-in dictionary; the `DICT_` prefix and case are optional.
pub fn builtin_dictionary(name: &str) -> Option<Dictionary> {
    let upper = name.trim().to_ascii_uppercase();
    let key = upper.strip_prefix("DICT_").unwrap_or(&upper);
    match key {
        "4X4_50" => Some(DICT_4X4_50),
        "4X4_100" => Some(DICT_4X4_100),
        "4X4_250" => Some(DICT_4X4_250),
        "4X4_1000" => Some(DICT_4X4_1000),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotate_code_u64;

    #[test]
    fn lookup_is_lenient_about_prefix_and_case() {
        assert_eq!(builtin_dictionary("DICT_4X4_50"), Some(DICT_4X4_50));
        assert_eq!(builtin_dictionary("4x4_250"), Some(DICT_4X4_250));
        assert_eq!(builtin_dictionary("dict_4x4_1000"), Some(DICT_4X4_1000));
        assert_eq!(builtin_dictionary("DICT_5X5_100"), None);
        for name in BUILTIN_DICTIONARY_NAMES {
            let dict = builtin_dictionary(name).expect("listed name resolves");
            assert_eq!(dict.name, *name);
            assert!(dict.validate().is_ok(), "{name}");
        }
    }

    #[test]
    fn smaller_dictionaries_are_prefixes() {
        assert_eq!(DICT_4X4_50.len(), 50);
        assert_eq!(DICT_4X4_100.len(), 100);
        assert_eq!(DICT_4X4_250.len(), 250);
        assert_eq!(DICT_4X4_1000.len(), 1000);
        assert_eq!(DICT_4X4_250.codes[..50], DICT_4X4_50.codes[..]);
        assert_eq!(DICT_4X4_250.code(249), Some(DICT_4X4_1000_CODES[249]));
        assert_eq!(DICT_4X4_250.code(250), None);
    }

    #[test]
    fn first_code_matches_opencv_bytes() {
        // OpenCV stores id 0 as bytes 181, 50 (MSB first).
        let bytes = [181u8, 50u8];
        let mut code = 0u64;
        for bit in 0..16 {
            if (bytes[bit / 8] >> (7 - bit % 8)) & 1 == 1 {
                code |= 1 << bit;
            }
        }
        assert_eq!(code, DICT_4X4_1000_CODES[0]);
    }

    #[test]
    fn codes_are_separated_under_rotation() {
        let codes = &DICT_4X4_250.codes[..];
        for (i, &a) in codes.iter().enumerate().step_by(25) {
            for (j, &b) in codes.iter().enumerate() {
                for rot in 0..4 {
                    if i == j && rot == 0 {
                        continue;
                    }
                    let d = (a ^ rotate_code_u64(b, 4, rot)).count_ones();
                    assert!(d >= 3, "ids {i}/{j} rot {rot} distance {d}");
                }
            }
        }
    }
}
