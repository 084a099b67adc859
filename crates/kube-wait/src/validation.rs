//! Name validation

const DNS1123_SUBDOMAIN_MAX_LEN: usize = 253;

/// True if `name` is a valid DNS-1123 subdomain (the rule for most object names)
///
/// At most 253 characters of lowercase alphanumerics, '-' and '.', where each
/// dot-separated part starts and ends with an alphanumeric.
pub fn is_dns1123_subdomain(name: &str) -> bool {
    if name.is_empty() || name.len() > DNS1123_SUBDOMAIN_MAX_LEN {
        return false;
    }
    name.split('.').all(|label| {
        let bytes = label.as_bytes();
        match (bytes.first(), bytes.last()) {
            (Some(first), Some(last)) => {
                is_lower_alnum(*first)
                    && is_lower_alnum(*last)
                    && bytes.iter().all(|b| is_lower_alnum(*b) || *b == b'-')
            }
            _ => false,
        }
    })
}

fn is_lower_alnum(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit()
}
