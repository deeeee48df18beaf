use chrono::{SecondsFormat, Utc};
use rand::Rng;

const SUFFIX_LEN: usize = 6;
const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Session ids double as filenames: an ISO timestamp with `:` and `.`
/// replaced by `-`, plus a short random suffix. Lexicographic order follows
/// creation order.
pub fn generate_session_id() -> String {
    let stamp = Utc::now()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");

    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..SUFFIX_ALPHABET.len());
            SUFFIX_ALPHABET[idx] as char
        })
        .collect();

    format!("{stamp}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_url_safe() {
        let id = generate_session_id();
        assert!(!id.contains(':'));
        assert!(!id.contains('.'));
        assert!(id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == 'T' || c == 'Z'));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_ids_sort_by_creation() {
        let a = generate_session_id();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = generate_session_id();
        assert!(a < b);
    }
}
