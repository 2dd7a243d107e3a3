//! Tests for BlockAllocator
//!
//! These tests verify:
//! - First-fit search over gaps
//! - Append when no gap is wide enough
//! - Idempotent mark/free
//! - Runs crossing 64-block word boundaries

use atlasstore::allocator::BlockAllocator;

// =============================================================================
// Search Tests
// =============================================================================

#[test]
fn test_empty_allocator_starts_at_zero() {
    let allocator = BlockAllocator::new();

    assert_eq!(allocator.find_free_region(1), 0);
    assert_eq!(allocator.find_free_region(1000), 0);
    assert_eq!(allocator.end(), 0);
}

#[test]
fn test_zero_blocks_treated_as_one() {
    let mut allocator = BlockAllocator::new();
    allocator.mark_used(0, 1);

    assert_eq!(allocator.find_free_region(0), 1);
}

#[test]
fn test_appends_after_last_used_block() {
    let mut allocator = BlockAllocator::new();
    allocator.mark_used(0, 3);

    assert_eq!(allocator.find_free_region(1), 3);
    assert_eq!(allocator.find_free_region(50), 3);
}

#[test]
fn test_first_fit_picks_lowest_wide_enough_gap() {
    let mut allocator = BlockAllocator::new();
    // used: [0,2) gap [2,3) used [3,5) gap [5,9) used [9,10)
    allocator.mark_used(0, 2);
    allocator.mark_used(3, 2);
    allocator.mark_used(9, 1);

    assert_eq!(allocator.find_free_region(1), 2);
    assert_eq!(allocator.find_free_region(2), 5);
    assert_eq!(allocator.find_free_region(4), 5);
    assert_eq!(allocator.find_free_region(5), 10);
}

#[test]
fn test_gap_spanning_word_boundary() {
    let mut allocator = BlockAllocator::new();
    allocator.mark_used(0, 60);
    allocator.mark_used(70, 1);

    // Gap [60, 70) crosses the 64-block word boundary
    assert_eq!(allocator.find_free_region(10), 60);
    assert_eq!(allocator.find_free_region(11), 71);
}

#[test]
fn test_skips_full_words() {
    let mut allocator = BlockAllocator::new();
    allocator.mark_used(0, 128);
    allocator.mark_used(130, 2);

    assert_eq!(allocator.find_free_region(2), 128);
    assert_eq!(allocator.find_free_region(3), 132);
}

#[test]
fn test_free_word_in_the_middle() {
    let mut allocator = BlockAllocator::new();
    allocator.mark_used(0, 64);
    allocator.mark_used(192, 1);

    assert_eq!(allocator.find_free_region(128), 64);
    assert_eq!(allocator.find_free_region(129), 193);
}

// =============================================================================
// Mark / Free Tests
// =============================================================================

#[test]
fn test_mark_used_is_idempotent() {
    let mut allocator = BlockAllocator::new();
    allocator.mark_used(5, 3);
    allocator.mark_used(5, 3);
    allocator.mark_used(6, 1);

    assert_eq!(allocator.used_blocks(), 3);
    assert!(allocator.is_used(5));
    assert!(allocator.is_used(7));
    assert!(!allocator.is_used(8));
}

#[test]
fn test_mark_free_is_idempotent() {
    let mut allocator = BlockAllocator::new();
    allocator.mark_used(0, 4);
    allocator.mark_free(1, 2);
    allocator.mark_free(1, 2);
    allocator.mark_free(100, 10);

    assert_eq!(allocator.used_blocks(), 2);
    assert!(allocator.is_used(0));
    assert!(!allocator.is_used(1));
    assert!(!allocator.is_used(2));
    assert!(allocator.is_used(3));
}

#[test]
fn test_freed_gap_is_reused() {
    let mut allocator = BlockAllocator::new();
    allocator.mark_used(0, 10);
    allocator.mark_free(2, 3);

    assert_eq!(allocator.find_free_region(3), 2);
    assert_eq!(allocator.find_free_region(4), 10);
}

#[test]
fn test_end_tracks_highest_used_block() {
    let mut allocator = BlockAllocator::new();
    allocator.mark_used(0, 1);
    allocator.mark_used(200, 3);
    assert_eq!(allocator.end(), 203);

    allocator.mark_free(200, 3);
    assert_eq!(allocator.end(), 1);

    allocator.mark_free(0, 1);
    assert_eq!(allocator.end(), 0);
    assert_eq!(allocator.find_free_region(7), 0);
}

#[test]
fn test_is_range_free() {
    let mut allocator = BlockAllocator::new();
    allocator.mark_used(10, 5);

    assert!(allocator.is_range_free(0, 10));
    assert!(!allocator.is_range_free(5, 6));
    assert!(!allocator.is_range_free(14, 1));
    assert!(allocator.is_range_free(15, 1000));
}

#[test]
fn test_reset_clears_everything() {
    let mut allocator = BlockAllocator::new();
    allocator.mark_used(0, 100);
    allocator.reset();

    assert_eq!(allocator.used_blocks(), 0);
    assert_eq!(allocator.end(), 0);
    assert_eq!(allocator.find_free_region(1), 0);
}
