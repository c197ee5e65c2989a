//! Field-specific masking helpers.
//!
//! These operate on bare strings and work even when whole-object
//! sanitization is disabled.

/// Mask an email address, keeping the shape recognizable:
/// `john.doe@company.com` → `j***e@c***.com`.
pub fn sanitize_email(email: &str) -> String {
    let Some((local, domain)) = email.split_once('@') else {
        return "***".to_string();
    };
    let masked_local = mask_segment(local);
    let Some((stem, tld)) = domain.rsplit_once('.') else {
        return format!("{masked_local}@***");
    };
    let masked_stem = match stem.chars().next() {
        Some(first) => format!("{first}***"),
        None => "***".to_string(),
    };
    format!("{masked_local}@{masked_stem}.{tld}")
}

/// Mask a phone number, keeping the last four digits:
/// `+1 (555) 123-4567` → `***-***-4567`.
pub fn sanitize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() >= 4 {
        format!("***-***-{}", &digits[digits.len() - 4..])
    } else {
        "***-***".to_string()
    }
}

/// Mask a credit card number, keeping the last four digits:
/// `4111 1111 1111 1111` → `****-****-****-1111`.
pub fn sanitize_credit_card(card: &str) -> String {
    let digits: String = card.chars().filter(char::is_ascii_digit).collect();
    if digits.len() >= 4 {
        format!("****-****-****-{}", &digits[digits.len() - 4..])
    } else {
        "****".to_string()
    }
}

/// First char + `***` + last char for segments longer than two
/// characters, `***` otherwise.
fn mask_segment(segment: &str) -> String {
    let chars: Vec<char> = segment.chars().collect();
    if chars.len() > 2 {
        format!("{}***{}", chars[0], chars[chars.len() - 1])
    } else {
        "***".to_string()
    }
}
