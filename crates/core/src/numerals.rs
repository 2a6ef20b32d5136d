//! Number spelling used by label placeholders (`{season_number_cardinal}`,
//! `{episode_number_ordinal}`, `{season_number_roman}`).

const ONES: [&str; 20] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];

const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

/// English cardinal, e.g. `42 -> "forty-two"`. Magnitudes above 9999 fall
/// back to digits.
pub fn cardinal(n: i64) -> String {
    if n < 0 {
        return match n.checked_neg() {
            Some(positive) => format!("minus {}", cardinal(positive)),
            None => n.to_string(),
        };
    }
    match n {
        0..=19 => ONES[n as usize].to_string(),
        20..=99 => {
            let (tens, ones) = (n / 10, n % 10);
            if ones == 0 {
                TENS[tens as usize].to_string()
            } else {
                format!("{}-{}", TENS[tens as usize], ONES[ones as usize])
            }
        }
        100..=999 => {
            let (hundreds, rest) = (n / 100, n % 100);
            if rest == 0 {
                format!("{} hundred", ONES[hundreds as usize])
            } else {
                format!("{} hundred {}", ONES[hundreds as usize], cardinal(rest))
            }
        }
        1000..=9999 => {
            let (thousands, rest) = (n / 1000, n % 1000);
            if rest == 0 {
                format!("{} thousand", ONES[thousands as usize])
            } else {
                format!("{} thousand {}", ONES[thousands as usize], cardinal(rest))
            }
        }
        _ => n.to_string(),
    }
}

/// English ordinal, e.g. `42 -> "forty-second"`.
pub fn ordinal(n: i64) -> String {
    let words = cardinal(n);
    if words.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        return format!("{n}{}", ordinal_suffix(n));
    }
    // Only the final word changes: "forty-two" -> "forty-second".
    let split_at = words
        .rfind(['-', ' '])
        .map(|i| i + 1)
        .unwrap_or(0);
    let (head, last) = words.split_at(split_at);
    let last = match last {
        "one" => "first".to_string(),
        "two" => "second".to_string(),
        "three" => "third".to_string(),
        "five" => "fifth".to_string(),
        "eight" => "eighth".to_string(),
        "nine" => "ninth".to_string(),
        "twelve" => "twelfth".to_string(),
        w if w.ends_with('y') => format!("{}ieth", &w[..w.len() - 1]),
        w => format!("{w}th"),
    };
    format!("{head}{last}")
}

fn ordinal_suffix(n: i64) -> &'static str {
    match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

/// Upper-case Roman numeral for `1..=3999`; other values stay as digits.
pub fn roman(n: i64) -> String {
    if !(1..=3999).contains(&n) {
        return n.to_string();
    }
    const TABLE: [(i64, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut remaining = n;
    let mut out = String::new();
    for (value, symbol) in TABLE {
        while remaining >= value {
            out.push_str(symbol);
            remaining -= value;
        }
    }
    out
}
