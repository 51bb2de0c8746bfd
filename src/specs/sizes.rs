/// Garment size ladder used to order the size selector.
pub const SIZE_LADDER: [&str; 7] = ["XS", "S", "M", "L", "XL", "XXL", "3XL"];

fn ladder_rank(size: &str) -> Option<usize> {
    let normalized = size.trim().to_uppercase();
    let canonical = match normalized.as_str() {
        "2XL" => "XXL",
        "XXXL" => "3XL",
        other => other,
    };
    SIZE_LADDER.iter().position(|rung| *rung == canonical)
}

/// Sorts sizes by the ladder. Sizes off the ladder keep their incoming order
/// and go after every ladder size.
pub fn sort_by_ladder(sizes: &mut [String]) {
    sizes.sort_by_key(|size| ladder_rank(size).unwrap_or(usize::MAX));
}
