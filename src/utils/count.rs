//! Counted nouns for log and report lines.

/// `3 instances`, `1 change`, `0 errors`.
pub fn plural_count(count: usize, noun: &str) -> String {
    match count {
        1 => format!("1 {noun}"),
        n => format!("{n} {noun}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::plural_count;

    #[test]
    fn test_plural_count() {
        assert_eq!(plural_count(0, "error"), "0 errors");
        assert_eq!(plural_count(1, "instance"), "1 instance");
        assert_eq!(plural_count(12, "change"), "12 changes");
    }
}
