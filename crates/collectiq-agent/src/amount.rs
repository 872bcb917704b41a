//! Spoken-word rendering of money amounts.

const ONES: [&str; 20] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];

const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

const SCALES: [(u64, &str); 4] = [
    (1_000_000_000_000, "trillion"),
    (1_000_000_000, "billion"),
    (1_000_000, "million"),
    (1_000, "thousand"),
];

/// Words for 1..=999.
fn below_thousand(n: u64, out: &mut Vec<String>) {
    let hundreds = n / 100;
    let rest = n % 100;
    if hundreds > 0 {
        out.push(ONES[hundreds as usize].to_string());
        out.push("hundred".to_string());
    }
    if rest >= 20 {
        out.push(TENS[(rest / 10) as usize].to_string());
        if rest % 10 > 0 {
            out.push(ONES[(rest % 10) as usize].to_string());
        }
    } else if rest > 0 {
        out.push(ONES[rest as usize].to_string());
    }
}

/// English words for a whole number, e.g. `85000` → "eighty five thousand".
pub fn number_to_words(n: u64) -> String {
    if n == 0 {
        return ONES[0].to_string();
    }

    let mut words = Vec::new();
    let mut remaining = n;
    for (scale, name) in SCALES {
        let count = remaining / scale;
        if count == 0 {
            continue;
        }
        if count >= 1000 {
            words.push(number_to_words(count));
        } else {
            below_thousand(count, &mut words);
        }
        words.push(name.to_string());
        remaining %= scale;
    }
    if remaining > 0 {
        below_thousand(remaining, &mut words);
    }
    words.join(" ")
}

/// Singular and plural names for the currencies we speak by name.
fn currency_names(code: &str) -> Option<(&'static str, &'static str)> {
    let names = match code.to_ascii_uppercase().as_str() {
        "USD" => ("dollar", "dollars"),
        "CAD" => ("Canadian dollar", "Canadian dollars"),
        "AUD" => ("Australian dollar", "Australian dollars"),
        "SGD" => ("Singapore dollar", "Singapore dollars"),
        "EUR" => ("euro", "euros"),
        "GBP" => ("pound", "pounds"),
        "INR" => ("rupee", "rupees"),
        "JPY" => ("yen", "yen"),
        "CNY" => ("yuan", "yuan"),
        "CHF" => ("franc", "francs"),
        "AED" => ("dirham", "dirhams"),
        _ => return None,
    };
    Some(names)
}

/// Speak an amount with its currency, e.g. `(85000, "USD")` → "eighty five thousand dollars".
///
/// The amount is rounded to whole units. Unknown currency codes are spoken
/// as the raw code; an empty code yields the number alone.
pub fn verbalize(amount: f64, currency_code: &str) -> String {
    let whole = if amount.is_finite() && amount > 0.0 {
        amount.round() as u64
    } else {
        0
    };
    let number = number_to_words(whole);

    let code = currency_code.trim();
    if code.is_empty() {
        return number;
    }
    match currency_names(code) {
        Some((singular, plural)) => {
            let unit = if whole == 1 { singular } else { plural };
            format!("{number} {unit}")
        }
        None => format!("{number} {}", code.to_ascii_uppercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_examples() {
        assert_eq!(verbalize(85000.0, "USD"), "eighty five thousand dollars");
        assert_eq!(verbalize(0.0, "USD"), "zero dollars");
        assert_eq!(
            verbalize(1_200_000.0, "INR"),
            "one million two hundred thousand rupees"
        );
    }

    #[test]
    fn test_number_words() {
        assert_eq!(number_to_words(7), "seven");
        assert_eq!(number_to_words(13), "thirteen");
        assert_eq!(number_to_words(40), "forty");
        assert_eq!(number_to_words(105), "one hundred five");
        assert_eq!(number_to_words(999), "nine hundred ninety nine");
        assert_eq!(number_to_words(1_000), "one thousand");
        assert_eq!(
            number_to_words(2_500_017),
            "two million five hundred thousand seventeen"
        );
        assert_eq!(number_to_words(3_000_000_000), "three billion");
    }

    #[test]
    fn test_singular_and_rounding() {
        assert_eq!(verbalize(1.0, "usd"), "one dollar");
        assert_eq!(verbalize(1.4, "EUR"), "one euro");
        assert_eq!(verbalize(1249.6, "GBP"), "one thousand two hundred fifty pounds");
        assert_eq!(verbalize(-5.0, "USD"), "zero dollars");
        assert_eq!(verbalize(f64::NAN, "USD"), "zero dollars");
    }

    #[test]
    fn test_unknown_and_missing_currency() {
        assert_eq!(verbalize(500.0, "xyz"), "five hundred XYZ");
        assert_eq!(verbalize(500.0, ""), "five hundred");
        assert_eq!(verbalize(2.0, "JPY"), "two yen");
    }
}
