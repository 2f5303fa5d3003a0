use crate::upload::{MAX_PARTS, choose_part_size};

const MIB: u64 = 1024 * 1024;

fn assert_smallest_valid(file_size: u64, base: u64) {
    let p = choose_part_size(file_size, base);
    assert!(file_size.div_ceil(p) <= MAX_PARTS, "size={file_size} base={base} p={p}");
    assert_eq!(p % base, 0);
    assert!((p / base).is_power_of_two(), "{p} is not base * 2^k");
    if p > base {
        assert!(
            file_size.div_ceil(p / 2) > MAX_PARTS,
            "p/2 would also fit: size={file_size} base={base} p={p}"
        );
    }
}

#[test]
fn small_files_keep_the_base() {
    assert_eq!(choose_part_size(0, MIB), MIB);
    assert_eq!(choose_part_size(1, MIB), MIB);
    assert_eq!(choose_part_size(2 * MIB, MIB), MIB);
}

#[test]
fn exact_part_limit_keeps_the_base() {
    assert_eq!(choose_part_size(MAX_PARTS * MIB, MIB), MIB);
}

#[test]
fn one_byte_over_the_limit_doubles() {
    assert_eq!(choose_part_size(MAX_PARTS * MIB + 1, MIB), 2 * MIB);
}

#[test]
fn large_files_double_repeatedly() {
    // 100 GiB at 1 MiB base needs 16 MiB parts (6400 parts).
    assert_eq!(choose_part_size(100 * 1024 * MIB, MIB), 16 * MIB);
}

#[test]
fn result_is_always_the_smallest_valid_power_of_two_multiple() {
    let bases = [1, 3, 1000, MIB, 4 * MIB];
    let sizes = [
        0,
        1,
        9_999,
        10_000,
        10_001,
        MAX_PARTS * MIB - 1,
        MAX_PARTS * MIB,
        MAX_PARTS * MIB + 1,
        37 * 1024 * MIB + 12_345,
        u64::MAX / 3,
    ];
    for base in bases {
        for size in sizes {
            assert_smallest_valid(size, base);
        }
    }
}
