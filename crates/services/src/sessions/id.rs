use chrono::{DateTime, Utc};
use rand::Rng;
use yle_core::model::SessionId;

const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 9;

/// `session_<unix millis>_<9 random base-36 chars>`.
pub(crate) fn generate_session_id<R: Rng + ?Sized>(now: DateTime<Utc>, rng: &mut R) -> SessionId {
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| char::from(SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())]))
        .collect();
    SessionId::from_parts(now.timestamp_millis(), &suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use yle_core::time::fixed_now;

    #[test]
    fn id_has_expected_shape() {
        let id = generate_session_id(fixed_now(), &mut rand::rng());
        let rest = id
            .as_str()
            .strip_prefix("session_1700000000000_")
            .expect("prefix");
        assert_eq!(rest.len(), SUFFIX_LEN);
        assert!(rest.bytes().all(|b| SUFFIX_ALPHABET.contains(&b)));
    }

    #[test]
    fn ids_differ_between_calls() {
        let mut rng = rand::rng();
        let a = generate_session_id(fixed_now(), &mut rng);
        let b = generate_session_id(fixed_now(), &mut rng);
        assert_ne!(a, b);
    }
}
