/// Keeps the last `visible` characters of a sensitive value for logging.
pub fn mask(value: &str, visible: usize) -> String {
    let count = value.chars().count();
    if count <= visible {
        return "*".repeat(count);
    }
    let tail: String = value.chars().skip(count - visible).collect();
    format!("{}{}", "*".repeat(count - visible), tail)
}

pub fn mask_account(number: &str) -> String {
    mask(number, 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_all_but_tail() {
        assert_eq!(mask_account("12345678"), "****5678");
        assert_eq!(mask("abc", 4), "***");
        assert_eq!(mask("seller@example.com", 3), "***************com");
    }
}
