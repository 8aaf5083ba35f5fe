//! Letter/digit confusion repair for OCR output.

/// Glyph pairs the OCR engine mixes up, `(letter, digit)`.
const CONFUSABLE: [(char, char); 9] = [
    ('O', '0'),
    ('I', '1'),
    ('Z', '2'),
    ('J', '3'),
    ('A', '4'),
    ('S', '5'),
    ('G', '6'),
    ('T', '7'),
    ('B', '8'),
];

fn letter_for(c: char) -> Option<char> {
    CONFUSABLE
        .iter()
        .find(|(_, digit)| *digit == c)
        .map(|(letter, _)| *letter)
}

fn digit_for(c: char) -> Option<char> {
    CONFUSABLE
        .iter()
        .find(|(letter, _)| *letter == c)
        .map(|(_, digit)| *digit)
}

/// Replace every confusable digit with its letter
pub fn correct_to_letters(s: &str) -> String {
    s.chars().map(|c| letter_for(c).unwrap_or(c)).collect()
}

/// Replace every confusable letter with its digit
pub fn correct_to_digits(s: &str) -> String {
    s.chars().map(|c| digit_for(c).unwrap_or(c)).collect()
}

pub fn has_digit(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_digit())
}

pub fn has_letter(s: &str) -> bool {
    s.chars().any(char::is_alphabetic)
}

/// Repair a segment that should hold letters, touching it only when a digit slipped in
pub fn repair_letters(segment: &str) -> String {
    if has_digit(segment) {
        correct_to_letters(segment)
    } else {
        segment.to_string()
    }
}

/// Repair a segment that should hold digits, touching it only when a letter slipped in
pub fn repair_digits(segment: &str) -> String {
    if has_letter(segment) {
        correct_to_digits(segment)
    } else {
        segment.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_a_bijection() {
        for (letter, digit) in CONFUSABLE {
            assert_eq!(digit_for(letter), Some(digit));
            assert_eq!(letter_for(digit), Some(letter));
        }
        assert_eq!(letter_for('9'), None);
        assert_eq!(digit_for('X'), None);
    }

    #[test]
    fn test_correct_to_letters() {
        assert_eq!(correct_to_letters("A8C"), "ABC");
        assert_eq!(correct_to_letters("0123456789"), "OIZJASGTB9");
        assert_eq!(correct_to_letters("XY-"), "XY-");
    }

    #[test]
    fn test_correct_to_digits() {
        assert_eq!(correct_to_digits("1O3"), "103");
        assert_eq!(correct_to_digits("OIZJASGTB"), "012345678");
        assert_eq!(correct_to_digits("KX9"), "KX9");
    }

    #[test]
    fn test_corrections_are_idempotent() {
        for input in ["A8C123", "0O1I", "ZZ22 BB88", "", "plate 7"] {
            let letters = correct_to_letters(input);
            assert_eq!(correct_to_letters(&letters), letters);

            let digits = correct_to_digits(input);
            assert_eq!(correct_to_digits(&digits), digits);
        }
    }

    #[test]
    fn test_corrections_idempotent_over_alphanumerics() {
        let alphabet: Vec<char> = ('A'..='Z').chain('a'..='z').chain('0'..='9').collect();
        let singles = alphabet.iter().map(|c| c.to_string());
        let pairs = alphabet
            .iter()
            .flat_map(|a| alphabet.iter().map(move |b| format!("{a}{b}")));

        for input in singles.chain(pairs) {
            let letters = correct_to_letters(&input);
            assert_eq!(correct_to_letters(&letters), letters, "{input:?}");
            assert!(letters.chars().all(|c| letter_for(c).is_none()), "{input:?}");

            let digits = correct_to_digits(&input);
            assert_eq!(correct_to_digits(&digits), digits, "{input:?}");
            assert!(digits.chars().all(|c| digit_for(c).is_none()), "{input:?}");
        }
    }

    #[test]
    fn test_repair_only_when_mixed() {
        assert_eq!(repair_letters("ABC"), "ABC");
        assert_eq!(repair_letters("A8C"), "ABC");
        assert_eq!(repair_digits("123"), "123");
        assert_eq!(repair_digits("1Z3"), "123");
        // a segment with no digit is left alone even if a digit reading exists
        assert_eq!(repair_letters("OIS"), "OIS");
    }
}
