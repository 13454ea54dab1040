//! Validation of the operator's menu choices.

/// Converts a 1-based menu answer into an index into a list of `count` items.
///
/// Returns `None` for anything outside `[1, count]`, including input that is
/// not a number at all.
pub fn parse_choice(input: &str, count: usize) -> Option<usize> {
    let choice: usize = input.trim().parse().ok()?;
    (1..=count).contains(&choice).then(|| choice - 1)
}

/// The device and image the operator confirmed.
#[derive(Clone, Debug)]
pub struct Selection {
    pub device: crate::device::Device,
    pub image: crate::image::ImageFile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_choice_bounds() {
        assert_eq!(parse_choice("1", 2), Some(0));
        assert_eq!(parse_choice("2", 2), Some(1));
        assert_eq!(parse_choice("0", 2), None);
        assert_eq!(parse_choice("3", 2), None);
    }

    #[test]
    fn test_parse_choice_rejects_garbage() {
        assert_eq!(parse_choice("-1", 2), None);
        assert_eq!(parse_choice("two", 2), None);
        assert_eq!(parse_choice("", 2), None);
        assert_eq!(parse_choice("1", 0), None);
    }

    #[test]
    fn test_parse_choice_trims_whitespace() {
        assert_eq!(parse_choice(" 2\n", 3), Some(1));
    }
}
