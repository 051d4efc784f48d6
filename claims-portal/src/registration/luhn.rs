use rand::Rng;

/// Check digit that makes `digits` followed by it pass the Luhn test.
/// Returns `None` if `digits` contains anything but ASCII digits.
pub fn check_digit(digits: &str) -> Option<u8> {
    let mut sum = 0u32;
    for (i, c) in digits.chars().rev().enumerate() {
        let mut d = c.to_digit(10)?;
        // Doubling starts with the rightmost payload digit, since the check digit will follow it
        if i % 2 == 0 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    Some(((10 - sum % 10) % 10) as u8)
}

pub fn is_valid(number: &str) -> bool {
    if number.len() < 2 {
        return false;
    }
    let (payload, check) = number.split_at(number.len() - 1);
    match (check_digit(payload), check.chars().next().and_then(|c| c.to_digit(10))) {
        (Some(expected), Some(actual)) => expected as u32 == actual,
        _ => false,
    }
}

/// `prefix` + `random_digits` random digits + check digit
pub fn generate(prefix: &str, random_digits: usize) -> Option<String> {
    let mut rng = rand::rng();
    let mut payload = String::with_capacity(prefix.len() + random_digits + 1);
    payload.push_str(prefix);
    for _ in 0..random_digits {
        payload.push(char::from(b'0' + rng.random_range(0..10u8)));
    }
    let check = check_digit(&payload)?;
    payload.push(char::from(b'0' + check));
    Some(payload)
}
