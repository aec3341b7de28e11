use regex::Regex;
use std::net::IpAddr;
use std::sync::LazyLock;

static UUID_V4: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
        .expect("uuid pattern is valid")
});

// Only the leading character is barred from being a hyphen; inner labels may start with one.
static DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9\-]{1,63}\.)+[A-Za-z]{2,}$").expect("domain pattern is valid")
});

/// Returns true for a hyphenated version-4 UUID (variant nibble 8, 9, a or b), any case.
pub fn is_valid_uuid(s: &str) -> bool {
    UUID_V4.is_match(s)
}

/// Syntactic domain check: dot-separated labels ending in an alphabetic TLD of two or more letters.
pub fn is_domain(s: &str) -> bool {
    !s.starts_with('-') && DOMAIN.is_match(s)
}

pub fn is_ip_address(s: &str) -> bool {
    s.parse::<IpAddr>().is_ok()
}
